use super::{FormatError, FormatParser};
use crate::report::{DEFAULT_FAILURE_MESSAGE, Report, SuiteResult, TestResult, TestStatus};
use crate::value::ValueExt;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

const NODE_TEST_SUITE: &str = "Test Suite";
const NODE_TEST_CASE: &str = "Test Case";
const NODE_FAILURE_MESSAGE: &str = "Failure Message";

/// Newest format (`xcresulttool get test-results tests`): a tree of typed
/// nodes under `testNodes`.
///
/// Every `Test Suite` becomes one suite holding all of its descendant test
/// cases; nested suites are folded into the outermost one. Test cases outside
/// any suite are grouped under their closest named container.
pub struct TestResultsTreeParser;

impl TestResultsTreeParser {
    pub const NAME: &'static str = "test-results-tree";
    pub const PRIORITY: i32 = 100;
}

#[async_trait]
impl FormatParser for TestResultsTreeParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_parse(&self, raw: &Value) -> bool {
        matches!(raw.field("testNodes"), Some(Value::Array(_)))
    }

    async fn parse(&self, _bundle_path: &str, raw: &Value) -> Result<Report, FormatError> {
        let Some(Value::Array(nodes)) = raw.field("testNodes") else {
            return Err(FormatError::Malformed("testNodes is not an array".to_string()));
        };

        let mut walk = TreeWalk {
            failures: raw.list("testFailures"),
            suites: Vec::new(),
            orphan_suites: HashMap::new(),
        };
        for node in nodes {
            walk.visit(node, None);
        }

        let action_duration: f64 = nodes.iter().filter_map(node_duration).sum();
        Ok(Report::from_suites(walk.suites, Some(action_duration)))
    }
}

struct TreeWalk<'a> {
    failures: &'a [Value],
    suites: Vec<SuiteResult>,
    orphan_suites: HashMap<Option<&'a str>, usize>,
}

impl<'a> TreeWalk<'a> {
    fn visit(&mut self, node: &'a Value, container: Option<&'a str>) {
        match node.str_at("nodeType") {
            Some(NODE_TEST_SUITE) => {
                let mut suite = SuiteResult::new(node.str_at("name"));
                self.collect_cases(node, &mut suite);
                self.suites.push(suite);
            }
            Some(NODE_TEST_CASE) => {
                let test = self.test_case(node);
                let index = match self.orphan_suites.get(&container) {
                    Some(&index) => index,
                    None => {
                        self.suites.push(SuiteResult::new(container));
                        self.orphan_suites.insert(container, self.suites.len() - 1);
                        self.suites.len() - 1
                    }
                };
                self.suites[index].push(test);
            }
            _ => {
                let name = node
                    .str_at("name")
                    .filter(|n| !n.trim().is_empty())
                    .or(container);
                for child in node.list("children") {
                    self.visit(child, name);
                }
            }
        }
    }

    fn collect_cases(&self, node: &Value, suite: &mut SuiteResult) {
        for child in node.list("children") {
            if child.str_at("nodeType") == Some(NODE_TEST_CASE) {
                suite.push(self.test_case(child));
            } else {
                self.collect_cases(child, suite);
            }
        }
    }

    fn test_case(&self, node: &Value) -> TestResult {
        let status = TestStatus::from_token(node.str_at("result"));
        let message = match status {
            TestStatus::Failure => Some(self.failure_message(node)),
            TestStatus::Success | TestStatus::Skipped => None,
        };
        TestResult::new(
            node.str_at("name"),
            status,
            node_duration(node).unwrap_or(0.0),
            message,
        )
    }

    fn failure_message(&self, node: &Value) -> String {
        if let Some(message) = first_failure_message(node) {
            return message.to_string();
        }

        let identifier = node.str_at("nodeIdentifier");
        identifier
            .and_then(|id| {
                self.failures
                    .iter()
                    .find(|f| f.str_at("testIdentifierString") == Some(id))
            })
            .and_then(|f| f.str_at("failureText"))
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
            .to_string()
    }
}

// Failure messages may sit below repetitions or argument nodes.
fn first_failure_message(node: &Value) -> Option<&str> {
    node.list("children").iter().find_map(|child| {
        if child.str_at("nodeType") == Some(NODE_FAILURE_MESSAGE) {
            child.str_at("name").filter(|m| !m.trim().is_empty())
        } else {
            first_failure_message(child)
        }
    })
}

fn node_duration(node: &Value) -> Option<f64> {
    node.f64_at("durationInSeconds")
        .or_else(|| node.f64_at("duration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suite_with_two_cases() -> Value {
        json!({
            "testNodes": [
                {
                    "nodeType": "Test Plan",
                    "name": "Plan",
                    "children": [
                        {
                            "nodeType": "Unit test bundle",
                            "name": "AppTests",
                            "children": [
                                {
                                    "nodeType": "Test Suite",
                                    "name": "LoginTests",
                                    "children": [
                                        { "nodeType": "Test Case", "name": "testOk()",
                                          "result": "Passed", "duration": 0.1 },
                                        { "nodeType": "Test Case", "name": "testBad()",
                                          "result": "Failed", "duration": 0.2 }
                                    ]
                                }
                            ]
                        }
                    ]
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_suite_with_two_cases() {
        let parser = TestResultsTreeParser;
        let raw = suite_with_two_cases();
        assert!(parser.can_parse(&raw));

        let report = parser.parse("run.xcresult", &raw).await.unwrap();
        assert_eq!(report.total_suites, 1);
        assert_eq!(report.total_tests, 2);
        assert!((report.total_duration - 0.3).abs() < 1e-9);

        let suite = &report.suites[0];
        assert_eq!(suite.suite_name, "LoginTests");
        assert_eq!(suite.passed.len(), 1);
        assert_eq!(suite.failed.len(), 1);
        assert_eq!(suite.passed[0].name, "testOk()");
        assert_eq!(suite.failed[0].status, TestStatus::Failure);
        assert_eq!(suite.failed[0].failure_message.as_deref(), Some("Test failed"));
    }

    #[tokio::test]
    async fn test_failure_message_node_wins() {
        let raw = json!({
            "testNodes": [
                { "nodeType": "Test Suite", "name": "S", "children": [
                    { "nodeType": "Test Case", "name": "t", "nodeIdentifier": "S/t",
                      "result": "Failed", "durationInSeconds": 0.5,
                      "children": [
                          { "nodeType": "Repetition", "name": "First Run", "children": [
                              { "nodeType": "Failure Message", "name": "S.swift:10: XCTAssertTrue failed" }
                          ] }
                      ] }
                ] }
            ],
            "testFailures": [
                { "testIdentifierString": "S/t", "failureText": "from summary" }
            ]
        });

        let report = TestResultsTreeParser.parse("b", &raw).await.unwrap();
        let test = &report.suites[0].failed[0];
        assert_eq!(
            test.failure_message.as_deref(),
            Some("S.swift:10: XCTAssertTrue failed")
        );
        assert_eq!(test.duration, 0.5);
    }

    #[tokio::test]
    async fn test_failure_text_lookup_by_identifier() {
        let raw = json!({
            "testNodes": [
                { "nodeType": "Test Suite", "name": "S", "children": [
                    { "nodeType": "Test Case", "name": "t", "nodeIdentifier": "S/t",
                      "result": "Failed", "duration": "1.5s" },
                    { "nodeType": "Test Case", "name": "u", "nodeIdentifier": "S/u",
                      "result": "Failed" }
                ] }
            ],
            "testFailures": [
                { "testIdentifierString": "S/u", "failureText": "u broke" },
                { "testIdentifierString": "S/t", "failureText": "t broke" }
            ]
        });

        let report = TestResultsTreeParser.parse("b", &raw).await.unwrap();
        let failed = &report.suites[0].failed;
        assert_eq!(failed[0].failure_message.as_deref(), Some("t broke"));
        assert_eq!(failed[0].duration, 1.5);
        assert_eq!(failed[1].failure_message.as_deref(), Some("u broke"));
    }

    #[tokio::test]
    async fn test_nested_suites_fold_into_outer() {
        let raw = json!({
            "testNodes": [
                { "nodeType": "Test Suite", "name": "Outer", "children": [
                    { "nodeType": "Test Case", "name": "a", "result": "Passed", "duration": 1.0 },
                    { "nodeType": "Test Suite", "name": "Inner", "children": [
                        { "nodeType": "Test Case", "name": "b", "result": "Passed", "duration": 2.0 }
                    ] }
                ] }
            ]
        });

        let report = TestResultsTreeParser.parse("b", &raw).await.unwrap();
        assert_eq!(report.total_suites, 1);
        assert_eq!(report.suites[0].passed.len(), 2);
        assert_eq!(report.suites[0].duration, 3.0);
    }

    #[tokio::test]
    async fn test_orphan_cases_grouped_by_container() {
        let raw = json!({
            "testNodes": [
                { "nodeType": "Unit test bundle", "name": "SwiftTestingTests", "children": [
                    { "nodeType": "Test Case", "name": "free()", "result": "Passed" },
                    { "nodeType": "Test Case", "name": "other()", "result": "Skipped" },
                    { "nodeType": "Test Case", "name": "third()", "result": "Mystery" }
                ] },
                { "nodeType": "Test Case", "result": "Passed" }
            ]
        });

        let report = TestResultsTreeParser.parse("b", &raw).await.unwrap();
        assert_eq!(report.total_suites, 2);
        assert_eq!(report.suites[0].suite_name, "SwiftTestingTests");
        assert_eq!(report.suites[0].passed.len(), 1);
        assert_eq!(report.suites[0].failed.len(), 1);
        assert_eq!(report.suites[1].suite_name, "Unknown Suite");
        assert_eq!(report.suites[1].passed[0].name, "Unknown Test");
        assert_eq!(report.total_tests, 3);
    }

    #[tokio::test]
    async fn test_action_duration_fallback() {
        let raw = json!({
            "testNodes": [
                { "nodeType": "Test Plan", "name": "Plan", "durationInSeconds": 4.0, "children": [] }
            ]
        });

        let report = TestResultsTreeParser.parse("b", &raw).await.unwrap();
        assert_eq!(report.total_suites, 0);
        assert_eq!(report.total_duration, 4.0);
    }

    #[test]
    fn test_can_parse_requires_node_array() {
        let parser = TestResultsTreeParser;
        assert!(parser.can_parse(&json!({ "testNodes": [] })));
        assert!(!parser.can_parse(&json!({ "testNodes": {} })));
        assert!(!parser.can_parse(&json!({ "testNodes": null })));
        assert!(!parser.can_parse(&json!([{ "testNodes": [] }])));
    }
}
