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

//! Probe injection: a [`CallbackList`] wrapper that brackets every regular
//! callback with timing probes.

use hookscope_core::hook::{
    CallbackList, EntryKind, HookEntry, HookList, HookRegistry, HookValue,
};
use hookscope_core::identity::CallableIdentity;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Receives probe firings from instrumented lists.
pub trait ProbeSink {
    /// The start probe for `id` on `event` fired.
    fn function_started(&self, registry: &HookRegistry, event: &str, id: &str);

    /// The stop probe for `id` on `event` fired.
    fn function_finished(&self, registry: &HookRegistry, event: &str, id: &str);

    /// Whether `id` should run without probes around it.
    fn is_callback_ignored(&self, id: &str) -> bool;

    /// Whether probes should report at all right now.
    fn is_active(&self) -> bool;
}

/// A [`HookList`] wrapped so every regular callback gets a start probe in
/// front and a stop probe behind, at the same priority.
///
/// Probes pass the dispatched value through untouched. The wrapper keeps
/// the inner list's live iteration cursors, so instrumentation can land in
/// the middle of a dispatch without disturbing it.
pub struct InstrumentedList {
    event: String,
    inner: HookList,
    sink: Rc<dyn ProbeSink>,
    // (id, priority) -> the probe ids actually injected for it.
    probe_ids: HashMap<(String, i64), (String, String)>,
}

impl InstrumentedList {
    /// Wraps `list`, injecting probes around every existing regular entry.
    pub fn wrap(event: &str, mut list: HookList, sink: Rc<dyn ProbeSink>) -> Self {
        let mut used: HashSet<String> = list.entry_ids().into_iter().collect();
        let mut probe_ids = HashMap::new();

        {
            let sink = &sink;
            let event = event.to_string();
            list.wrap_entries(|priority, entry| {
                if entry.kind().is_probe() || sink.is_callback_ignored(entry.id()) {
                    return None;
                }
                let start_id = claim_probe_id(&mut used, entry.id(), "probe_start");
                let stop_id = claim_probe_id(&mut used, entry.id(), "probe_stop");
                let pair = probe_pair(&event, entry.id(), &start_id, &stop_id, sink);
                probe_ids.insert((entry.id().to_string(), priority), (start_id, stop_id));
                Some(pair)
            });
        }

        Self {
            event: event.to_string(),
            inner: list,
            sink,
            probe_ids,
        }
    }

    /// The event this list belongs to.
    pub fn event(&self) -> &str {
        &self.event
    }
}

fn claim_probe_id(used: &mut HashSet<String>, id: &str, suffix: &str) -> String {
    let mut candidate = format!("{id}::{suffix}");
    while used.contains(&candidate) {
        candidate.push_str("_0");
    }
    used.insert(candidate.clone());
    candidate
}

/// Builds the start/stop probe entries bracketing `id` on `event`.
fn probe_pair(
    event: &str,
    id: &str,
    start_id: &str,
    stop_id: &str,
    sink: &Rc<dyn ProbeSink>,
) -> (Vec<HookEntry>, Vec<HookEntry>) {
    let start = {
        let sink = sink.clone();
        let event = event.to_string();
        let id = id.to_string();
        HookEntry::probe(
            start_id,
            EntryKind::ProbeStart,
            Rc::new(move |registry: &HookRegistry, value: HookValue| {
                if sink.is_active() {
                    sink.function_started(registry, &event, &id);
                }
                value
            }),
        )
    };
    let stop = {
        let sink = sink.clone();
        let event = event.to_string();
        let id = id.to_string();
        HookEntry::probe(
            stop_id,
            EntryKind::ProbeStop,
            Rc::new(move |registry: &HookRegistry, value: HookValue| {
                if sink.is_active() {
                    sink.function_finished(registry, &event, &id);
                }
                value
            }),
        )
    };
    (vec![start], vec![stop])
}

impl CallbackList for InstrumentedList {
    fn insert(&mut self, priority: i64, entry: HookEntry) {
        if entry.kind().is_probe()
            || self.sink.is_callback_ignored(entry.id())
            || self.inner.has(entry.id(), priority)
        {
            // Probes, ignored callbacks, and in-place overwrites (whose
            // probes already exist) go in bare.
            self.inner.insert(priority, entry);
            return;
        }

        let mut used: HashSet<String> = self.inner.entry_ids().into_iter().collect();
        let start_id = claim_probe_id(&mut used, entry.id(), "probe_start");
        let stop_id = claim_probe_id(&mut used, entry.id(), "probe_stop");
        let (start, stop) = probe_pair(&self.event, entry.id(), &start_id, &stop_id, &self.sink);
        self.probe_ids
            .insert((entry.id().to_string(), priority), (start_id, stop_id));

        for probe in start {
            self.inner.insert(priority, probe);
        }
        self.inner.insert(priority, entry);
        for probe in stop {
            self.inner.insert(priority, probe);
        }
    }

    fn remove(&mut self, id: &str, priority: i64) -> bool {
        let removed = self.inner.remove(id, priority);
        if removed {
            if let Some((start_id, stop_id)) = self.probe_ids.remove(&(id.to_string(), priority)) {
                self.inner.remove(&start_id, priority);
                self.inner.remove(&stop_id, priority);
            }
        }
        removed
    }

    fn has(&self, id: &str, priority: i64) -> bool {
        self.inner.has(id, priority)
    }

    fn identity_of(&self, id: &str) -> Option<CallableIdentity> {
        self.inner.identity_of(id)
    }

    fn begin_iteration(&mut self) -> usize {
        self.inner.begin_iteration()
    }

    fn next_entry(&mut self, level: usize) -> Option<HookEntry> {
        self.inner.next_entry(level)
    }

    fn end_iteration(&mut self, level: usize) {
        self.inner.end_iteration(level)
    }

    fn callback_count(&self) -> usize {
        self.inner.callback_count()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn is_instrumented(&self) -> bool {
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for InstrumentedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedList")
            .field("event", &self.event)
            .field("callbacks", &self.inner.callback_count())
            .finish_non_exhaustive()
    }
}
