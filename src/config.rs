use crate::format::DEFAULT_DETAIL_CONCURRENCY;
use crate::pipeline::Pipeline;
use crate::source::{CachedSource, FixtureSource, RawDataSource, XcResultTool};
use std::path::PathBuf;
use std::sync::Arc;

/// Where a pipeline reads raw JSON from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Run `xcresulttool` against a real bundle.
    Tool,
    /// Read pre-exported JSON files.
    Fixture { details_dir: Option<PathBuf> },
}

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub xcrun: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub validate_schema: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            xcrun: PathBuf::from("xcrun"),
            cache_dir: None,
            concurrency: DEFAULT_DETAIL_CONCURRENCY,
            validate_schema: false,
        }
    }
}

impl Settings {
    pub fn pipeline(&self, kind: &SourceKind) -> Pipeline {
        let base: Arc<dyn RawDataSource> = match kind {
            SourceKind::Tool => Arc::new(XcResultTool::with_path(&self.xcrun)),
            SourceKind::Fixture {
                details_dir: Some(dir),
            } => Arc::new(FixtureSource::with_details_dir(dir)),
            SourceKind::Fixture { details_dir: None } => Arc::new(FixtureSource::new()),
        };

        let source: Arc<dyn RawDataSource> = match &self.cache_dir {
            Some(dir) => Arc::new(CachedSource::with_cache_dir(base, dir)),
            None => Arc::new(CachedSource::new(base)),
        };

        let pipeline = Pipeline::new(source, self.concurrency.max(1));
        if self.validate_schema {
            pipeline.with_schema_validation(XcResultTool::with_path(&self.xcrun))
        } else {
            pipeline
        }
    }
}
