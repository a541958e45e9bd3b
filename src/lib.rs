pub mod config;
pub mod format;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod server;
pub mod source;
pub mod value;

pub use format::{FormatError, FormatParser, ParserRegistry, RegistryError};
pub use pipeline::Pipeline;
pub use report::{Report, SuiteResult, TestResult, TestStatus};
pub use source::{RawDataSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Format(#[from] RegistryError),
}

/// Fetch the raw JSON for `bundle_path` and normalize it with the first
/// registered format that can.
pub async fn parse_bundle(
    registry: &ParserRegistry,
    source: &dyn RawDataSource,
    bundle_path: &str,
) -> Result<Report, Error> {
    let raw = source.get_data(bundle_path).await?;
    Ok(registry.parse(bundle_path, &raw).await?)
}
