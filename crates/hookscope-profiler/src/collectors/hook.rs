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

//! The dispatch tree collector.

use super::Collector;
use crate::instrument::{InstrumentedList, ProbeSink};
use crate::report::document::assemble;
use crate::session::RequestInfo;
use crate::tree::CallTree;
use hookscope_core::error::StructuralError;
use hookscope_core::hook::{CallerSite, DispatchObserver, HookRegistry};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Builds the dispatch call tree by observing every dispatch begin/end.
///
/// While disabled, dispatches pass through unrecorded; the collector keeps
/// a per-dispatch marker of whether it opened a node, so toggling it in the
/// middle of a dispatch never orphans or double-closes a tree node.
pub struct HookCollector {
    tree: Rc<RefCell<CallTree>>,
    enabled: Cell<bool>,
    // One flag per in-flight dispatch: did we open a node for it?
    opened: RefCell<Vec<bool>>,
    ignored: RefCell<HashSet<String>>,
    probe_sink: RefCell<Option<Rc<dyn ProbeSink>>>,
}

impl HookCollector {
    /// The name this collector reports under.
    pub const NAME: &'static str = "hook";

    /// Creates a collector recording into `tree`. Starts disabled.
    pub fn new(tree: Rc<RefCell<CallTree>>) -> Self {
        Self {
            tree,
            enabled: Cell::new(false),
            opened: RefCell::new(Vec::new()),
            ignored: RefCell::new(HashSet::new()),
            probe_sink: RefCell::new(None),
        }
    }

    /// Sets the sink whose probes get injected when an event first
    /// dispatches while this collector is enabled.
    pub fn set_probe_sink(&self, sink: Rc<dyn ProbeSink>) {
        *self.probe_sink.borrow_mut() = Some(sink);
    }

    /// Excludes `event` from tree recording and probe injection.
    pub fn ignore_event(&self, event: impl Into<String>) {
        self.ignored.borrow_mut().insert(event.into());
    }

    /// Removes `event` from the ignore list.
    pub fn unignore_event(&self, event: &str) {
        self.ignored.borrow_mut().remove(event);
    }

    /// Whether `event` is currently ignored.
    pub fn is_event_ignored(&self, event: &str) -> bool {
        self.ignored.borrow().contains(event)
    }
}

impl DispatchObserver for HookCollector {
    fn dispatch_began(&self, registry: &HookRegistry, event: &str, caller: &CallerSite) {
        let tracked = self.opened.borrow().len();
        // The dispatcher has already pushed this event onto its stack.
        if registry.depth() != tracked + 1 {
            log::error!(
                "{}",
                StructuralError::DepthMismatch {
                    dispatcher: registry.depth(),
                    tracked,
                }
            );
        }

        if self.enabled.get() && !self.is_event_ignored(event) {
            let sink = self.probe_sink.borrow().clone();
            if let Some(sink) = sink {
                registry.instrument(event, |list| {
                    Box::new(InstrumentedList::wrap(event, list, sink))
                });
            }
            self.tree
                .borrow_mut()
                .open_child(event, Some(caller.clone()));
            self.opened.borrow_mut().push(true);
        } else {
            self.opened.borrow_mut().push(false);
        }
    }

    fn dispatch_ended(&self, _registry: &HookRegistry, _event: &str) {
        let opened = self.opened.borrow_mut().pop();
        match opened {
            Some(true) => self.tree.borrow_mut().close_current(),
            Some(false) => {}
            None => log::error!(
                "{}",
                StructuralError::StopWithoutStart {
                    context: "dispatch end without a tracked begin",
                }
            ),
        }
    }
}

impl Collector for HookCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn filename_priority(&self) -> i32 {
        1
    }

    fn enable(&self) {
        self.enabled.set(true);
    }

    fn disable(&self) {
        self.enabled.set(false);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn collect(&self) -> Option<Value> {
        let report = assemble(&self.tree.borrow());
        match serde_json::to_value(&report) {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("failed to serialize the dispatch tree: {err}");
                None
            }
        }
    }

    fn filename_parts(&self, _request: &RequestInfo, mut parts: Vec<String>) -> Vec<String> {
        let tree = self.tree.borrow();
        let elapsed = tree
            .node(tree.root())
            .timer
            .finalized_view()
            .time
            .unwrap_or(0.0);
        parts.insert(0, format!("{elapsed:.6}"));
        parts
    }
}
