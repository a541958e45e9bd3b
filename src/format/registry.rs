use super::{
    ActionsInvocationParser, FormatParser, LegacyTestableSummariesParser,
    TestResultsSummaryParser, TestResultsTreeParser,
};
use crate::report::Report;
use crate::source::RawDataSource;
use serde_json::Value;
use std::sync::Arc;

/// A parser that claimed the data but failed to transform it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAttempt {
    pub parser: String,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unrecognized result format. Registered parsers: {}", .registered.join(", "))]
    Unrecognized { registered: Vec<String> },

    #[error(
        "All matching parsers failed: {}. Registered parsers: {}",
        format_attempts(.attempts),
        .registered.join(", ")
    )]
    AllFailed {
        attempts: Vec<ParseAttempt>,
        registered: Vec<String>,
    },
}

fn format_attempts(attempts: &[ParseAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.parser, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Format parsers ordered by descending priority.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in format. `source` serves the detail
    /// payloads the object-graph format needs.
    pub fn with_default_parsers(source: Arc<dyn RawDataSource>, concurrency: usize) -> Self {
        let mut registry = Self::new();
        registry.register(TestResultsTreeParser);
        registry.register(ActionsInvocationParser::new(source).with_concurrency(concurrency));
        registry.register(LegacyTestableSummariesParser);
        registry.register(TestResultsSummaryParser);
        registry
    }

    /// Add a parser. Registering the same format twice is not detected.
    pub fn register(&mut self, parser: impl FormatParser + 'static) {
        self.parsers.push(Box::new(parser));
        // Stable, so equal priorities keep insertion order.
        self.parsers
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn parsers(&self) -> &[Box<dyn FormatParser>] {
        &self.parsers
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Hand `raw` to the highest-priority parser that claims it, falling back
    /// to the next claimant whenever a parse fails.
    pub async fn parse(&self, bundle_path: &str, raw: &Value) -> Result<Report, RegistryError> {
        let mut attempts = Vec::new();

        for parser in &self.parsers {
            if !parser.can_parse(raw) {
                continue;
            }

            tracing::debug!(parser = parser.name(), bundle = bundle_path, "trying parser");
            match parser.parse(bundle_path, raw).await {
                Ok(report) => {
                    tracing::info!(
                        parser = parser.name(),
                        suites = report.total_suites,
                        tests = report.total_tests,
                        "parsed result bundle"
                    );
                    return Ok(report);
                }
                Err(e) => {
                    tracing::warn!(parser = parser.name(), error = %e, "parser failed, trying next");
                    attempts.push(ParseAttempt {
                        parser: parser.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let registered = self
            .parser_names()
            .into_iter()
            .map(String::from)
            .collect();
        if attempts.is_empty() {
            Err(RegistryError::Unrecognized { registered })
        } else {
            Err(RegistryError::AllFailed {
                attempts,
                registered,
            })
        }
    }
}
