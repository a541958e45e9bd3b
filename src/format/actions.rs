use super::testable::{LeafTest, testable_leaves};
use super::{FormatError, FormatParser};
use crate::report::{DEFAULT_FAILURE_MESSAGE, Report, SuiteResult, TestResult, TestStatus};
use crate::source::RawDataSource;
use crate::value::ValueExt;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_DETAIL_CONCURRENCY: usize = 8;

/// Outcome of resolving a failing test's message from its summary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    Message(String),
    /// The detail payload could not be fetched; the test carries no message.
    Unavailable,
}

impl FailureDetail {
    pub fn into_message(self) -> Option<String> {
        match self {
            FailureDetail::Message(message) => Some(message),
            FailureDetail::Unavailable => None,
        }
    }

    /// Picks the failure message out of an `ActionTestSummary` payload.
    pub fn from_summary(summary: &Value) -> Self {
        let non_empty = |text: &&str| !text.trim().is_empty();

        if let Some(message) = summary
            .list("failureSummaries")
            .first()
            .and_then(|f| f.str_at("message"))
            .filter(non_empty)
        {
            return FailureDetail::Message(message.to_string());
        }

        if let Some(message) = summary
            .list("summaries")
            .iter()
            .chain(summary.list("testFailureSummaries"))
            .find_map(|entry| {
                entry
                    .str_at("message")
                    .filter(non_empty)
                    .or_else(|| entry.str_at("title").filter(non_empty))
            })
        {
            return FailureDetail::Message(message.to_string());
        }

        if let Some(title) = summary
            .list("activitySummaries")
            .iter()
            .filter_map(|activity| activity.str_at("title"))
            .find(|title| title.contains("failed"))
        {
            return FailureDetail::Message(title.to_string());
        }

        FailureDetail::Message(DEFAULT_FAILURE_MESSAGE.to_string())
    }
}

/// Intermediate format: an `ActionsInvocationRecord` whose tests live in
/// separately fetched payloads referenced by id.
pub struct ActionsInvocationParser {
    source: Arc<dyn RawDataSource>,
    concurrency: usize,
}

impl ActionsInvocationParser {
    pub const NAME: &'static str = "actions-invocation";
    pub const PRIORITY: i32 = 90;

    pub fn new(source: Arc<dyn RawDataSource>) -> Self {
        Self {
            source,
            concurrency: DEFAULT_DETAIL_CONCURRENCY,
        }
    }

    /// Upper bound on detail fetches in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn testable_suite(&self, bundle_path: &str, testable: &Value) -> SuiteResult {
        let leaves = testable_leaves(testable);

        let pending: Vec<_> = leaves
            .iter()
            .map(|leaf| self.resolve_failure(bundle_path, leaf))
            .collect();
        // `buffered` yields in submission order, so traversal order survives.
        let details: Vec<Option<FailureDetail>> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut suite = SuiteResult::new(testable.str_at("name"));
        for (leaf, detail) in leaves.iter().zip(details) {
            suite.push(TestResult::new(
                leaf.name,
                leaf.status,
                leaf.duration,
                detail.and_then(FailureDetail::into_message),
            ));
        }
        suite
    }

    async fn resolve_failure(&self, bundle_path: &str, leaf: &LeafTest<'_>) -> Option<FailureDetail> {
        if leaf.status != TestStatus::Failure {
            return None;
        }

        let Some(summary_ref) = leaf.summary_ref else {
            return Some(FailureDetail::Message(DEFAULT_FAILURE_MESSAGE.to_string()));
        };

        match self.source.get_detail(bundle_path, summary_ref).await {
            Some(summary) => Some(FailureDetail::from_summary(&summary)),
            None => {
                tracing::warn!(
                    bundle = bundle_path,
                    test = leaf.name.unwrap_or_default(),
                    summary_ref,
                    "could not fetch test summary, leaving failure message empty"
                );
                Some(FailureDetail::Unavailable)
            }
        }
    }
}

#[async_trait]
impl FormatParser for ActionsInvocationParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_parse(&self, raw: &Value) -> bool {
        raw.field("actions")
            .and_then(|actions| actions.field("_values"))
            .is_some_and(Value::is_array)
    }

    async fn parse(&self, bundle_path: &str, raw: &Value) -> Result<Report, FormatError> {
        if !self.can_parse(raw) {
            return Err(FormatError::Malformed("missing actions list".to_string()));
        }

        let mut action_duration = 0.0;
        let mut suites = Vec::new();

        for action in raw.list("actions") {
            action_duration += duration_between(
                action.str_at("startedTime"),
                action.str_at("endedTime"),
            );

            let Some(tests_ref) = action
                .field("actionResult")
                .and_then(|result| result.reference_id("testsRef"))
            else {
                tracing::debug!(bundle = bundle_path, "action without tests reference");
                continue;
            };

            let Some(plan_summaries) = self.source.get_detail(bundle_path, tests_ref).await else {
                tracing::warn!(bundle = bundle_path, tests_ref, "could not fetch test plan summaries");
                continue;
            };

            for run in plan_summaries.list("summaries") {
                for testable in run.list("testableSummaries") {
                    suites.push(self.testable_suite(bundle_path, testable).await);
                }
            }
        }

        let mut report = Report::from_suites(suites, None);
        if action_duration > 0.0 {
            report.total_duration = action_duration;
        }
        Ok(report)
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// Seconds between two timestamps, 0 when either is missing or unparseable.
fn duration_between(start: Option<&str>, end: Option<&str>) -> f64 {
    let (Some(start), Some(end)) = (start.and_then(parse_timestamp), end.and_then(parse_timestamp))
    else {
        return 0.0;
    };
    let millis = (end - start).num_milliseconds();
    if millis > 0 { millis as f64 / 1000.0 } else { 0.0 }
}
