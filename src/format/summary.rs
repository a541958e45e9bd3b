use super::{FormatError, FormatParser};
use crate::report::{DEFAULT_FAILURE_MESSAGE, Report, SuiteResult, TestResult};
use crate::value::ValueExt;
use async_trait::async_trait;
use serde_json::Value;

/// Aggregate-only format (`xcresulttool get test-results summary`).
///
/// Only failures are listed individually, so `totalTests` comes from the
/// tool's own count rather than from the suites.
pub struct TestResultsSummaryParser;

impl TestResultsSummaryParser {
    pub const NAME: &'static str = "test-results-summary";
    pub const PRIORITY: i32 = 70;
}

#[async_trait]
impl FormatParser for TestResultsSummaryParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_parse(&self, raw: &Value) -> bool {
        raw.field("totalTestCount").is_some_and(Value::is_number)
            && matches!(raw.field("testFailures"), Some(Value::Array(_)))
    }

    async fn parse(&self, _bundle_path: &str, raw: &Value) -> Result<Report, FormatError> {
        let total = raw
            .field("totalTestCount")
            .and_then(Value::as_u64)
            .ok_or_else(|| FormatError::Malformed("totalTestCount is not a count".to_string()))?;
        let skipped = raw.field("skippedTests").and_then(Value::as_u64).unwrap_or(0);

        let mut suites: Vec<SuiteResult> = Vec::new();
        for failure in raw.list("testFailures") {
            let target = failure.str_at("targetName");
            let test = TestResult::failed(
                failure
                    .str_at("testName")
                    .or_else(|| failure.str_at("testIdentifierString")),
                0.0,
                Some(
                    failure
                        .str_at("failureText")
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                        .to_string(),
                ),
            );

            let name = SuiteResult::new(target).suite_name;
            match suites.iter_mut().find(|s| s.suite_name == name) {
                Some(suite) => suite.push(test),
                None => {
                    let mut suite = SuiteResult::new(target);
                    suite.push(test);
                    suites.push(suite);
                }
            }
        }

        let listed_failures: u64 = suites.iter().map(|s| s.failed.len() as u64).sum();
        let failed = raw
            .field("failedTests")
            .and_then(Value::as_u64)
            .unwrap_or(listed_failures);

        let duration = match (raw.f64_at("startTime"), raw.f64_at("finishTime")) {
            (Some(start), Some(finish)) => finish - start,
            _ => 0.0,
        };

        Ok(Report::from_aggregate(
            suites,
            total.saturating_sub(skipped),
            failed,
            duration,
        ))
    }
}
