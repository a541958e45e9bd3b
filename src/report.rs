use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_SUITE: &str = "Unknown Suite";
pub const UNKNOWN_TEST: &str = "Unknown Test";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Test failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TestStatus {
    Success,
    Failure,
    Skipped,
}

impl TestStatus {
    /// Maps a tool-specific result token onto the canonical status.
    ///
    /// Unrecognized or missing tokens count as failures.
    pub fn from_token(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return TestStatus::Failure;
        };

        match token {
            "Passed" | "Success" | "Expected Failure" => TestStatus::Success,
            "Failed" | "Failure" => TestStatus::Failure,
            "Skipped" => TestStatus::Skipped,
            other => match other.trim().to_ascii_lowercase().as_str() {
                "passed" | "success" | "expected failure" | "expectedfailure" => {
                    TestStatus::Success
                }
                "skipped" => TestStatus::Skipped,
                _ => TestStatus::Failure,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl TestResult {
    pub fn passed(name: Option<&str>, duration: f64) -> Self {
        Self::new(name, TestStatus::Success, duration, None)
    }

    pub fn failed(name: Option<&str>, duration: f64, failure_message: Option<String>) -> Self {
        Self::new(name, TestStatus::Failure, duration, failure_message)
    }

    /// Builds a test record, normalizing the name placeholder, the duration
    /// and the failure message (only kept for non-empty failures).
    pub fn new(
        name: Option<&str>,
        status: TestStatus,
        duration: f64,
        failure_message: Option<String>,
    ) -> Self {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_TEST)
            .to_string();

        let failure_message = match status {
            TestStatus::Failure => failure_message.filter(|m| !m.trim().is_empty()),
            TestStatus::Success | TestStatus::Skipped => None,
        };

        Self {
            name,
            status,
            duration: clamp_duration(duration),
            failure_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResult {
    pub suite_name: String,
    pub duration: f64,
    pub failed: Vec<TestResult>,
    pub passed: Vec<TestResult>,
}

impl SuiteResult {
    pub fn new(name: Option<&str>) -> Self {
        let suite_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_SUITE)
            .to_string();

        Self {
            suite_name,
            duration: 0.0,
            failed: Vec::new(),
            passed: Vec::new(),
        }
    }

    /// Files a test into the bucket matching its status and adds its duration.
    ///
    /// Skipped tests are not part of either bucket and are dropped.
    pub fn push(&mut self, test: TestResult) {
        match test.status {
            TestStatus::Success => {
                self.duration += test.duration;
                self.passed.push(test);
            }
            TestStatus::Failure => {
                self.duration += test.duration;
                self.failed.push(test);
            }
            TestStatus::Skipped => {
                tracing::debug!(suite = %self.suite_name, test = %test.name, "skipping test");
            }
        }
    }

    pub fn test_count(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total_suites: u64,
    pub total_tests: u64,
    pub total_duration: f64,
    pub suites: Vec<SuiteResult>,
    /// Failure count reported by aggregate-only formats, when it exceeds the
    /// listed failures.
    #[serde(skip)]
    #[schemars(skip)]
    aggregate_failures: Option<u64>,
}

impl Report {
    /// Builds a report whose totals are derived from the suites. Total
    /// duration falls back to `fallback_duration` when the suites add up to 0.
    pub fn from_suites(suites: Vec<SuiteResult>, fallback_duration: Option<f64>) -> Self {
        let total_tests = suites.iter().map(|s| s.test_count() as u64).sum();
        let summed: f64 = suites.iter().map(|s| s.duration).sum();
        let total_duration = match fallback_duration {
            Some(fallback) if summed <= 0.0 => fallback,
            _ => summed,
        };

        Self {
            total_suites: suites.len() as u64,
            total_tests,
            total_duration: clamp_duration(total_duration),
            suites,
            aggregate_failures: None,
        }
    }

    /// Builds a report for formats that only expose aggregate counts.
    pub fn from_aggregate(
        suites: Vec<SuiteResult>,
        total_tests: u64,
        failed_tests: u64,
        total_duration: f64,
    ) -> Self {
        Self {
            total_suites: suites.len() as u64,
            total_tests,
            total_duration: clamp_duration(total_duration),
            suites,
            aggregate_failures: Some(failed_tests),
        }
    }

    pub fn empty(total_duration: f64) -> Self {
        Self::from_suites(Vec::new(), Some(total_duration))
    }

    pub fn failed_count(&self) -> u64 {
        let listed: u64 = self.suites.iter().map(|s| s.failed.len() as u64).sum();
        self.aggregate_failures.map_or(listed, |agg| agg.max(listed))
    }

    pub fn passed_count(&self) -> u64 {
        self.suites.iter().map(|s| s.passed.len() as u64).sum()
    }
}

pub(crate) fn clamp_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tokens() {
        assert_eq!(TestStatus::from_token(Some("Passed")), TestStatus::Success);
        assert_eq!(TestStatus::from_token(Some("Success")), TestStatus::Success);
        assert_eq!(
            TestStatus::from_token(Some("Expected Failure")),
            TestStatus::Success
        );
        assert_eq!(TestStatus::from_token(Some("Failed")), TestStatus::Failure);
        assert_eq!(TestStatus::from_token(Some("Failure")), TestStatus::Failure);
        assert_eq!(TestStatus::from_token(Some("Skipped")), TestStatus::Skipped);
        assert_eq!(TestStatus::from_token(Some("skipped")), TestStatus::Skipped);
    }

    #[test]
    fn test_unknown_status_is_failure() {
        assert_eq!(TestStatus::from_token(Some("Mixed")), TestStatus::Failure);
        assert_eq!(TestStatus::from_token(Some("")), TestStatus::Failure);
        assert_eq!(TestStatus::from_token(None), TestStatus::Failure);
    }

    #[test]
    fn test_placeholder_names() {
        let test = TestResult::passed(None, 0.1);
        assert_eq!(test.name, UNKNOWN_TEST);

        let test = TestResult::passed(Some("  "), 0.1);
        assert_eq!(test.name, UNKNOWN_TEST);

        let suite = SuiteResult::new(Some(""));
        assert_eq!(suite.suite_name, UNKNOWN_SUITE);
    }

    #[test]
    fn test_failure_message_only_on_failures() {
        let test = TestResult::new(
            Some("t"),
            TestStatus::Success,
            0.0,
            Some("boom".to_string()),
        );
        assert!(test.failure_message.is_none());

        let test = TestResult::new(
            Some("t"),
            TestStatus::Skipped,
            0.0,
            Some("boom".to_string()),
        );
        assert!(test.failure_message.is_none());

        let test = TestResult::failed(Some("t"), 0.0, Some(String::new()));
        assert!(test.failure_message.is_none());

        let test = TestResult::failed(Some("t"), 0.0, Some("boom".to_string()));
        assert_eq!(test.failure_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_negative_duration_clamped() {
        let test = TestResult::passed(Some("t"), -4.0);
        assert_eq!(test.duration, 0.0);

        let test = TestResult::passed(Some("t"), f64::NAN);
        assert_eq!(test.duration, 0.0);
    }

    #[test]
    fn test_suite_buckets() {
        let mut suite = SuiteResult::new(Some("S"));
        suite.push(TestResult::passed(Some("a"), 0.1));
        suite.push(TestResult::failed(Some("b"), 0.2, None));
        suite.push(TestResult::new(Some("c"), TestStatus::Skipped, 5.0, None));

        assert_eq!(suite.passed.len(), 1);
        assert_eq!(suite.failed.len(), 1);
        assert_eq!(suite.test_count(), 2);
        assert!((suite.duration - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_report_totals() {
        let mut first = SuiteResult::new(Some("A"));
        first.push(TestResult::passed(Some("a"), 1.0));
        let mut second = SuiteResult::new(Some("B"));
        second.push(TestResult::failed(Some("b"), 2.0, None));

        let report = Report::from_suites(vec![first, second], None);
        assert_eq!(report.total_suites, 2);
        assert_eq!(report.total_tests, 2);
        assert_eq!(report.total_duration, 3.0);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.passed_count(), 1);
    }

    #[test]
    fn test_report_fallback_duration() {
        let report = Report::from_suites(vec![SuiteResult::new(Some("A"))], Some(7.5));
        assert_eq!(report.total_duration, 7.5);

        let report = Report::empty(12.0);
        assert_eq!(report.total_suites, 0);
        assert_eq!(report.total_duration, 12.0);
    }

    #[test]
    fn test_aggregate_failures() {
        let report = Report::from_aggregate(Vec::new(), 10, 3, 1.0);
        assert_eq!(report.total_tests, 10);
        assert_eq!(report.failed_count(), 3);
    }

    #[test]
    fn test_report_serialization() {
        let mut suite = SuiteResult::new(Some("S"));
        suite.push(TestResult::passed(Some("ok"), 0.5));
        suite.push(TestResult::failed(Some("bad"), 0.25, Some("nope".to_string())));
        let report = Report::from_suites(vec![suite], None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalSuites"], 1);
        assert_eq!(json["totalTests"], 2);
        assert_eq!(json["totalDuration"], 0.75);
        assert_eq!(json["suites"][0]["suiteName"], "S");
        assert_eq!(json["suites"][0]["failed"][0]["status"], "Failure");
        assert_eq!(json["suites"][0]["failed"][0]["failureMessage"], "nope");
        assert_eq!(json["suites"][0]["passed"][0]["status"], "Success");
        assert!(json["suites"][0]["passed"][0].get("failureMessage").is_none());
        assert!(json.get("aggregateFailures").is_none());
    }
}
