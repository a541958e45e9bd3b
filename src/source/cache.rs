use super::{RawDataSource, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;
use tokio::sync::OnceCell;

/// Payloads kept in memory before the least recently used one is dropped.
pub const DEFAULT_MEMORY_ENTRIES: usize = 64;

/// Read-through cache in front of another source.
///
/// While a key stays among the most recently used entries it is fetched at
/// most once. With a cache directory, payloads also persist as
/// `<sha256>.json`, so an evicted key is reread from disk instead of the inner
/// source. The key covers the bundle path, its modification time and the
/// reference id, so a rewritten bundle misses. Failed fetches are never cached.
pub struct CachedSource<S> {
    inner: S,
    cache_dir: Option<PathBuf>,
    entries: Mutex<Entries>,
}

struct Entries {
    capacity: usize,
    cells: HashMap<String, Arc<OnceCell<Value>>>,
    // Least recently used first.
    order: VecDeque<String>,
}

impl Entries {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            cells: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn cell(&mut self, key: &str) -> Arc<OnceCell<Value>> {
        if let Some(cell) = self.cells.get(key).cloned() {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                if let Some(k) = self.order.remove(pos) {
                    self.order.push_back(k);
                }
            }
            return cell;
        }

        while self.cells.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.cells.remove(&oldest);
        }

        let cell = Arc::new(OnceCell::new());
        self.cells.insert(key.to_string(), cell.clone());
        self.order.push_back(key.to_string());
        cell
    }
}

impl<S: RawDataSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache_dir: None,
            entries: Mutex::new(Entries::new(DEFAULT_MEMORY_ENTRIES)),
        }
    }

    /// Keep at most `entries` payloads in memory (minimum 1).
    pub fn with_memory_limit(mut self, entries: usize) -> Self {
        self.entries = Mutex::new(Entries::new(entries));
        self
    }

    /// Number of payloads currently held in memory.
    pub fn resident(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.cells.len())
            .unwrap_or_default()
    }

    pub fn with_cache_dir<P: AsRef<Path>>(inner: S, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.as_ref().to_path_buf()),
            ..Self::new(inner)
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<Value>> {
        match self.entries.lock() {
            Ok(mut entries) => entries.cell(key),
            // A poisoned map only loses memoization.
            Err(_) => Arc::new(OnceCell::new()),
        }
    }

    async fn cache_key(bundle_path: &str, reference_id: Option<&str>) -> String {
        let modified = tokio::fs::metadata(bundle_path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(bundle_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(modified.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(reference_id.unwrap_or("<root>").as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn read_disk(&self, key: &str) -> Option<Value> {
        let file = self.cache_dir.as_ref()?.join(format!("{}.json", key));
        let bytes = tokio::fs::read(&file).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!(file = %file.display(), "cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "ignoring corrupt cache entry");
                None
            }
        }
    }

    async fn write_disk(&self, key: &str, value: &Value) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        let file = dir.join(format!("{}.json", key));

        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            let bytes = serde_json::to_vec(value).map_err(std::io::Error::other)?;
            tokio::fs::write(&file, bytes).await
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(file = %file.display(), error = %e, "failed to write cache entry");
        }
    }
}

#[async_trait]
impl<S: RawDataSource> RawDataSource for CachedSource<S> {
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError> {
        let key = Self::cache_key(bundle_path, None).await;
        let cell = self.cell(&key);

        let value = cell
            .get_or_try_init(|| async {
                if let Some(value) = self.read_disk(&key).await {
                    return Ok(value);
                }
                let value = self.inner.get_data(bundle_path).await?;
                self.write_disk(&key, &value).await;
                Ok::<_, SourceError>(value)
            })
            .await?;
        Ok(value.clone())
    }

    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value> {
        let key = Self::cache_key(bundle_path, Some(reference_id)).await;
        let cell = self.cell(&key);

        let value = cell
            .get_or_try_init(|| async {
                if let Some(value) = self.read_disk(&key).await {
                    return Ok(value);
                }
                let value = self
                    .inner
                    .get_detail(bundle_path, reference_id)
                    .await
                    .ok_or(())?;
                self.write_disk(&key, &value).await;
                Ok::<_, ()>(value)
            })
            .await
            .ok()?;
        Some(value.clone())
    }
}
