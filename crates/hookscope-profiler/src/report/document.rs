// Copyright 2025 hookscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The serializable report shapes and the tree-to-report assembler.

use crate::tree::{CallTree, NodeId};
use hookscope_core::hook::CallerSite;
use hookscope_core::timer::TimerView;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One callback execution, flattened for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionView {
    /// Callable name, `"UNKNOWN"` when identity resolution failed.
    pub name: String,
    /// Defining (or registering) file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line within the file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Timing and memory of this execution.
    #[serde(flatten)]
    pub timer: TimerView,
}

/// One dispatch node in the report tree. Children embed recursively; there
/// are no upward references, so the shape serializes directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNode {
    /// Event name; absent on the root node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Where the dispatch was issued from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerSite>,
    /// Span of the dispatch.
    #[serde(flatten)]
    pub timer: TimerView,
    /// Callbacks that ran directly in this dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionView>,
    /// Nested dispatches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

/// Turns the arena tree into the nested report shape.
///
/// Open timers are rendered as if they stopped now, without mutating the
/// tree, so assembling twice from an unchanged tree yields equal output
/// modulo those still-open spans.
pub fn assemble(tree: &CallTree) -> ReportNode {
    assemble_node(tree, tree.root())
}

fn assemble_node(tree: &CallTree, id: NodeId) -> ReportNode {
    let node = tree.node(id);
    ReportNode {
        event: node.event.clone(),
        caller: node.caller.clone(),
        timer: node.timer.finalized_view(),
        functions: node
            .functions
            .iter()
            .map(|record| FunctionView {
                name: record.identity.name.clone(),
                file: record.identity.file.clone(),
                line: record.identity.line,
                timer: record.timer.finalized_view(),
            })
            .collect(),
        children: node
            .children()
            .iter()
            .map(|&child| assemble_node(tree, child))
            .collect(),
    }
}

/// The complete report written by a [`ReportSink`].
///
/// [`ReportSink`]: crate::report::ReportSink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    /// Host that served the profiled request, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Request URI (or a stand-in for non-web runs).
    pub url: String,
    /// Unix timestamp of report assembly, in seconds.
    pub timestamp: u64,
    /// Request method, uppercased.
    pub method: String,
    /// Referer header, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Whole-session wall time in seconds.
    pub total_time: f64,
    /// [`total_time`], formatted for humans.
    ///
    /// [`total_time`]: ReportDocument::total_time
    pub total_human_time: String,
    /// Bytes allocated over the session.
    pub memory_used: u64,
    /// Peak bytes held at once.
    pub peak_memory_used: u64,
    /// Whether the run was a scheduled job.
    pub is_cron: bool,
    /// Whether the run served an async browser call.
    pub is_ajax: bool,
    /// Whether the run came from a terminal, when detectable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_cli: Option<bool>,
    /// The CLI subcommand, for tool-driven runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_command: Option<String>,
    /// One section per enabled collector that had data.
    pub collectors: BTreeMap<String, Value>,
    /// Free-form annotations set on the session.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookscope_core::identity::CallableIdentity;

    #[test]
    fn assemble_strips_nothing_but_parents() {
        let mut tree = CallTree::new();
        tree.open_child("outer", None);
        tree.push_function(CallableIdentity::at("cb", "src/app.rs", 42));
        tree.close_last_open_function();
        tree.open_child("inner", None);
        tree.close_current();
        tree.close_root();

        let report = assemble(&tree);
        assert!(report.event.is_none());
        assert_eq!(report.children.len(), 1);
        let outer = &report.children[0];
        assert_eq!(outer.event.as_deref(), Some("outer"));
        assert_eq!(outer.functions.len(), 1);
        assert_eq!(outer.functions[0].name, "cb");
        assert_eq!(outer.functions[0].file.as_deref(), Some("src/app.rs"));
        assert_eq!(outer.children[0].event.as_deref(), Some("inner"));
    }

    #[test]
    fn assemble_is_idempotent_on_a_closed_tree() {
        let mut tree = CallTree::new();
        tree.open_child("evt", None);
        tree.close_current();
        tree.close_root();

        assert_eq!(assemble(&tree), assemble(&tree));
    }

    #[test]
    fn report_node_round_trips_through_json() {
        let mut tree = CallTree::new();
        tree.open_child("evt", None);
        tree.push_function(CallableIdentity::named("cb"));
        tree.close_last_open_function();
        tree.close_root();

        let report = assemble(&tree);
        let json = serde_json::to_string(&report).unwrap();
        let parsed: ReportNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn serialized_tree_has_no_parent_field() {
        let mut tree = CallTree::new();
        tree.open_child("evt", None);
        tree.close_root();

        let json = serde_json::to_string(&assemble(&tree)).unwrap();
        assert!(!json.contains("parent"));
    }
}
