use super::{RawDataSource, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reads pre-exported JSON from disk instead of running the tool.
///
/// The bundle path names the root JSON file. Detail payloads are looked up as
/// `<id>.json` inside the details directory, which defaults to
/// `<file stem>.details/` next to the root file.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    details_dir: Option<PathBuf>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_details_dir<P: AsRef<Path>>(path: P) -> Self {
        Self {
            details_dir: Some(path.as_ref().to_path_buf()),
        }
    }

    fn details_dir_for(&self, bundle_path: &Path) -> PathBuf {
        if let Some(dir) = &self.details_dir {
            return dir.clone();
        }
        let stem = bundle_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("fixture");
        bundle_path.with_file_name(format!("{}.details", stem))
    }

    fn detail_file_name(reference_id: &str) -> String {
        // Reference ids look like "0~AbC-_x=="; keep them filesystem safe.
        let safe: String = reference_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                other => other,
            })
            .collect();
        format!("{}.json", safe)
    }
}

#[async_trait]
impl RawDataSource for FixtureSource {
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError> {
        let path = Path::new(bundle_path);
        if !path.is_file() {
            return Err(SourceError::InvalidBundle(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value> {
        let file = self
            .details_dir_for(Path::new(bundle_path))
            .join(Self::detail_file_name(reference_id));

        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "failed to read fixture detail");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "invalid fixture detail JSON");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_root_and_default_details_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("run.json");
        std::fs::write(&root, r#"{"actions": {"_values": []}}"#).unwrap();
        std::fs::create_dir(dir.path().join("run.details")).unwrap();
        std::fs::write(
            dir.path().join("run.details").join("0~ref.json"),
            r#"{"ok": true}"#,
        )
        .unwrap();

        let source = FixtureSource::new();
        let root_str = root.to_str().unwrap();
        let data = source.get_data(root_str).await.unwrap();
        assert_eq!(data, json!({ "actions": { "_values": [] } }));

        let detail = source.get_detail(root_str, "0~ref").await;
        assert_eq!(detail, Some(json!({ "ok": true })));
        assert_eq!(source.get_detail(root_str, "missing").await, None);
    }

    #[tokio::test]
    async fn test_explicit_details_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("id.json"), "not json").unwrap();

        let source = FixtureSource::with_details_dir(dir.path());
        assert_eq!(source.get_detail("whatever.json", "id").await, None);
    }

    #[tokio::test]
    async fn test_missing_fixture_is_invalid_bundle() {
        let source = FixtureSource::new();
        let result = source.get_data("/nonexistent/fixture.json").await;
        assert!(matches!(result, Err(SourceError::InvalidBundle(_))));
    }

    #[tokio::test]
    async fn test_bad_json_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("bad.json");
        std::fs::write(&root, "{").unwrap();

        let source = FixtureSource::new();
        let result = source.get_data(root.to_str().unwrap()).await;
        assert!(matches!(result, Err(SourceError::Json(_))));
    }
}
