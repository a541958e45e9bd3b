//! Traversal shared by the object-graph formats: testable summaries holding
//! trees of tests nested under `subtests` and `children`.

use crate::report::TestStatus;
use crate::value::ValueExt;
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct LeafTest<'a> {
    pub name: Option<&'a str>,
    pub status: TestStatus,
    pub duration: f64,
    pub summary_ref: Option<&'a str>,
}

impl<'a> LeafTest<'a> {
    fn from_node(node: &'a Value) -> Self {
        let name = node
            .str_at("name")
            .filter(|n| !n.trim().is_empty())
            .or_else(|| node.str_at("identifier"));

        Self {
            name,
            status: TestStatus::from_token(node.str_at("testStatus")),
            duration: node.f64_at("duration").unwrap_or(0.0),
            summary_ref: node.reference_id("summaryRef"),
        }
    }
}

/// Leaf tests of one testable summary, in depth-first order.
pub(crate) fn testable_leaves(testable: &Value) -> Vec<LeafTest<'_>> {
    let mut leaves = Vec::new();
    collect_leaves(testable.list("tests"), &mut leaves);
    leaves
}

fn collect_leaves<'a>(nodes: &'a [Value], leaves: &mut Vec<LeafTest<'a>>) {
    for node in nodes {
        if !node.is_object() {
            continue;
        }

        let subtests = node.list("subtests");
        let children = node.list("children");
        if subtests.is_empty() && children.is_empty() {
            if is_group(node) {
                continue;
            }
            leaves.push(LeafTest::from_node(node));
        } else {
            collect_leaves(subtests, leaves);
            collect_leaves(children, leaves);
        }
    }
}

// An empty group is still a group, not a test.
fn is_group(node: &Value) -> bool {
    node.field("_type")
        .and_then(|t| t.str_at("_name"))
        .is_some_and(|name| name.ends_with("SummaryGroup"))
}
