use crate::format::ParserRegistry;
use crate::report::Report;
use crate::schema::SchemaCheck;
use crate::source::{RawDataSource, XcResultTool};
use crate::{Error, parse_bundle};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A source and the registry reading from it, ready to turn bundle paths into
/// reports.
pub struct Pipeline {
    source: Arc<dyn RawDataSource>,
    registry: ParserRegistry,
    schema_tool: Option<XcResultTool>,
    schema: OnceCell<SchemaCheck>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn RawDataSource>, concurrency: usize) -> Self {
        let registry = ParserRegistry::with_default_parsers(source.clone(), concurrency);
        Self {
            source,
            registry,
            schema_tool: None,
            schema: OnceCell::new(),
        }
    }

    /// Check fetched `testNodes` payloads against the schema `tool` documents.
    /// The schema is fetched once per pipeline and mismatches are only logged.
    pub fn with_schema_validation(mut self, tool: XcResultTool) -> Self {
        self.schema_tool = Some(tool);
        self
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub async fn parse(&self, bundle_path: &str) -> Result<Report, Error> {
        let Some(tool) = &self.schema_tool else {
            return parse_bundle(&self.registry, self.source.as_ref(), bundle_path).await;
        };

        let raw = self.source.get_data(bundle_path).await?;
        if SchemaCheck::applies_to(&raw) {
            match self.schema_check(tool).await {
                Ok(check) => {
                    let mismatches = check.warn_on_mismatch(&raw);
                    tracing::debug!(mismatches, "schema check finished");
                }
                Err(e) => tracing::warn!(error = %e, "could not load xcresulttool schema"),
            }
        }
        Ok(self.registry.parse(bundle_path, &raw).await?)
    }

    /// Failures are retried on the next parse.
    async fn schema_check(&self, tool: &XcResultTool) -> Result<&SchemaCheck, String> {
        self.schema
            .get_or_try_init(|| async {
                let schema = tool.fetch_schema().await.map_err(|e| e.to_string())?;
                SchemaCheck::compile(&schema)
            })
            .await
    }
}
