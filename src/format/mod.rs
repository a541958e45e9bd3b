//! Versioned `xcresulttool` JSON formats and the registry that picks one.

mod actions;
mod legacy;
mod registry;
mod summary;
mod testable;
mod tree;

pub use actions::{ActionsInvocationParser, DEFAULT_DETAIL_CONCURRENCY, FailureDetail};
pub use legacy::LegacyTestableSummariesParser;
pub use registry::{ParseAttempt, ParserRegistry, RegistryError};
pub use summary::TestResultsSummaryParser;
pub use tree::TestResultsTreeParser;

use crate::report::Report;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unexpected data shape: {0}")]
    Malformed(String),
}

/// One JSON shape emitted by a generation of `xcresulttool`.
#[async_trait]
pub trait FormatParser: Send + Sync {
    /// Unique among registered parsers.
    fn name(&self) -> &'static str;

    /// Higher priorities are tried first. Unique among registered parsers.
    fn priority(&self) -> i32;

    /// Whether `raw` looks like this format. Never panics, whatever the input.
    fn can_parse(&self, raw: &Value) -> bool;

    /// Normalize `raw` into a report. Only called after `can_parse` accepted it.
    async fn parse(&self, bundle_path: &str, raw: &Value) -> Result<Report, FormatError>;
}
