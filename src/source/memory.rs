use super::{RawDataSource, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory payloads keyed by bundle path and reference id.
#[derive(Default)]
pub struct MemorySource {
    bundles: HashMap<String, Value>,
    details: HashMap<String, Value>,
    failing_details: HashSet<String>,
    data_calls: AtomicUsize,
    detail_calls: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(mut self, bundle_path: impl Into<String>, data: Value) -> Self {
        self.bundles.insert(bundle_path.into(), data);
        self
    }

    pub fn with_detail(mut self, reference_id: impl Into<String>, data: Value) -> Self {
        self.details.insert(reference_id.into(), data);
        self
    }

    /// Makes every fetch of `reference_id` fail.
    pub fn with_failing_detail(mut self, reference_id: impl Into<String>) -> Self {
        self.failing_details.insert(reference_id.into());
        self
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    /// Reference ids requested so far, in request order.
    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RawDataSource for MemorySource {
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        self.bundles
            .get(bundle_path)
            .cloned()
            .ok_or_else(|| SourceError::InvalidBundle(PathBuf::from(bundle_path)))
    }

    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value> {
        if let Ok(mut calls) = self.detail_calls.lock() {
            calls.push(reference_id.to_string());
        }

        if self.failing_details.contains(reference_id) {
            tracing::warn!(bundle = bundle_path, reference_id, "detail fetch failed");
            return None;
        }

        let detail = self.details.get(reference_id).cloned();
        if detail.is_none() {
            tracing::warn!(bundle = bundle_path, reference_id, "no detail registered");
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_bundle_is_invalid() {
        let source = MemorySource::new();
        let result = source.get_data("nope.xcresult").await;
        assert!(matches!(result, Err(SourceError::InvalidBundle(_))));
        assert_eq!(source.data_calls(), 1);
    }

    #[tokio::test]
    async fn test_details() {
        let source = MemorySource::new()
            .with_detail("a", json!({ "x": 1 }))
            .with_failing_detail("b");

        assert_eq!(source.get_detail("p", "a").await, Some(json!({ "x": 1 })));
        assert_eq!(source.get_detail("p", "b").await, None);
        assert_eq!(source.get_detail("p", "c").await, None);
        assert_eq!(source.detail_calls(), vec!["a", "b", "c"]);
    }
}
