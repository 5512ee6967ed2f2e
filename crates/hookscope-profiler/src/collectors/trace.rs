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

//! Flat trace of dispatch call sites. Off by default; the list grows with
//! every dispatch, which is more than most reports need.

use super::Collector;
use hookscope_core::hook::{CallerSite, DispatchObserver, HookRegistry};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};

#[derive(Debug, Serialize)]
struct TraceEntry {
    event: String,
    depth: usize,
    #[serde(flatten)]
    caller: CallerSite,
}

/// Records where each dispatch was issued from, in dispatch order.
#[derive(Default)]
pub struct CallerTraceCollector {
    enabled: Cell<bool>,
    entries: RefCell<Vec<TraceEntry>>,
}

impl CallerTraceCollector {
    /// The name this collector reports under.
    pub const NAME: &'static str = "trace";

    /// Creates the collector, disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches recorded so far.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl DispatchObserver for CallerTraceCollector {
    fn dispatch_began(&self, registry: &HookRegistry, event: &str, caller: &CallerSite) {
        if !self.enabled.get() {
            return;
        }
        self.entries.borrow_mut().push(TraceEntry {
            event: event.to_string(),
            depth: registry.depth(),
            caller: caller.clone(),
        });
    }

    fn dispatch_ended(&self, _registry: &HookRegistry, _event: &str) {}
}

impl Collector for CallerTraceCollector {
    fn name(&self) -> &str {
        Self::NAME
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
        let entries = self.entries.borrow();
        if entries.is_empty() {
            return None;
        }
        match serde_json::to_value(&*entries) {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("failed to serialize the dispatch trace: {err}");
                None
            }
        }
    }
}
