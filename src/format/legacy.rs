use super::testable::testable_leaves;
use super::{FormatError, FormatParser};
use crate::report::{DEFAULT_FAILURE_MESSAGE, Report, SuiteResult, TestResult};
use crate::value::ValueExt;
use async_trait::async_trait;
use serde_json::Value;

/// Oldest format: testable summaries wrapped under `issues`, with no detail
/// payloads to resolve failure messages from.
pub struct LegacyTestableSummariesParser;

impl LegacyTestableSummariesParser {
    pub const NAME: &'static str = "legacy-testable-summaries";
    pub const PRIORITY: i32 = 80;
}

#[async_trait]
impl FormatParser for LegacyTestableSummariesParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_parse(&self, raw: &Value) -> bool {
        raw.field("issues")
            .is_some_and(|issues| issues.has_list("testableSummaries"))
    }

    async fn parse(&self, _bundle_path: &str, raw: &Value) -> Result<Report, FormatError> {
        let issues = raw
            .field("issues")
            .ok_or_else(|| FormatError::Malformed("missing issues".to_string()))?;

        let suites = issues
            .list("testableSummaries")
            .iter()
            .map(|testable| {
                let mut suite = SuiteResult::new(testable.str_at("name"));
                for leaf in testable_leaves(testable) {
                    suite.push(TestResult::new(
                        leaf.name,
                        leaf.status,
                        leaf.duration,
                        Some(DEFAULT_FAILURE_MESSAGE.to_string()),
                    ));
                }
                suite
            })
            .collect();

        Ok(Report::from_suites(suites, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TestStatus;
    use serde_json::json;

    fn legacy(status: &str) -> Value {
        json!({
            "issues": { "testableSummaries": { "_values": [
                { "name": { "_value": "S" },
                  "tests": { "_values": [
                      { "identifier": { "_value": "t1" },
                        "testStatus": { "_value": status },
                        "duration": { "_value": 0.1 } }
                  ] } }
            ] } }
        })
    }

    #[tokio::test]
    async fn test_single_passing_test() {
        let parser = LegacyTestableSummariesParser;
        let raw = legacy("Success");
        assert!(parser.can_parse(&raw));

        let report = parser.parse("run.xcresult", &raw).await.unwrap();
        assert_eq!(report.total_suites, 1);
        assert_eq!(report.total_tests, 1);
        assert_eq!(report.suites[0].suite_name, "S");
        assert_eq!(report.suites[0].passed.len(), 1);
        assert!(report.suites[0].failed.is_empty());

        let test = &report.suites[0].passed[0];
        assert_eq!(test.name, "t1");
        assert_eq!(test.status, TestStatus::Success);
        assert_eq!(test.duration, 0.1);
        assert!(test.failure_message.is_none());
    }

    #[tokio::test]
    async fn test_failure_uses_static_message() {
        let parser = LegacyTestableSummariesParser;
        let report = parser.parse("run.xcresult", &legacy("Failure")).await.unwrap();

        let test = &report.suites[0].failed[0];
        assert_eq!(test.status, TestStatus::Failure);
        assert_eq!(test.failure_message.as_deref(), Some("Test failed"));
    }

    #[tokio::test]
    async fn test_skipped_excluded() {
        let parser = LegacyTestableSummariesParser;
        let report = parser.parse("run.xcresult", &legacy("Skipped")).await.unwrap();
        assert_eq!(report.total_suites, 1);
        assert_eq!(report.total_tests, 0);
    }

    #[test]
    fn test_rejects_other_shapes() {
        let parser = LegacyTestableSummariesParser;
        assert!(!parser.can_parse(&json!({ "issues": {} })));
        assert!(!parser.can_parse(&json!({ "issues": { "testableSummaries": 3 } })));
        assert!(!parser.can_parse(&json!({ "testNodes": [] })));
    }
}
