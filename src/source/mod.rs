//! Where raw `xcresulttool` JSON comes from.

mod cache;
mod fixture;
mod memory;
pub(crate) mod xcresulttool;

pub use cache::CachedSource;
pub use fixture::FixtureSource;
pub use memory::MemorySource;
pub use xcresulttool::{Capabilities, XcResultTool};

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Not a valid result bundle: {0}")]
    InvalidBundle(PathBuf),

    #[error("xcresulttool is unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Failed to fetch result data: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supplies raw JSON for a result bundle.
#[async_trait]
pub trait RawDataSource: Send + Sync {
    /// Full raw payload for `bundle_path`.
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError>;

    /// Detail payload for a reference id found inside the raw payload.
    ///
    /// Returns `None` when the detail cannot be fetched; implementations log
    /// the cause.
    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value>;
}

#[async_trait]
impl<S: RawDataSource + ?Sized> RawDataSource for std::sync::Arc<S> {
    async fn get_data(&self, bundle_path: &str) -> Result<Value, SourceError> {
        (**self).get_data(bundle_path).await
    }

    async fn get_detail(&self, bundle_path: &str, reference_id: &str) -> Option<Value> {
        (**self).get_detail(bundle_path, reference_id).await
    }
}
