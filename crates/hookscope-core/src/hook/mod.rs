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

//! The prioritized hook dispatcher.
//!
//! [`HookList`] is the priority-ordered callback collection; [`HookRegistry`]
//! maps event names to lists, tracks the current-event stack, and runs
//! dispatch. The [`CallbackList`] trait is the seam the profiler's
//! instrumented list plugs into, wrapping a plain list behind the same
//! operations.

mod list;
mod registry;

pub use list::{HookList, IterationSnapshot};
pub use registry::{CallerSite, DispatchObserver, HookRegistry};

use crate::identity::CallableIdentity;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// The value threaded through a dispatch, filter-style.
///
/// Action-style callbacks ignore it and pass it back unchanged.
pub type HookValue = serde_json::Value;

/// A callback registered on a hook.
///
/// Implemented for every `Fn(&HookRegistry, HookValue) -> HookValue`, so
/// plain closures register directly. The registry reference allows
/// re-entrant dispatch from inside a callback.
pub trait HookCallback {
    /// Invokes the callback with the current value.
    fn invoke(&self, registry: &HookRegistry, value: HookValue) -> HookValue;
}

impl<F> HookCallback for F
where
    F: Fn(&HookRegistry, HookValue) -> HookValue,
{
    fn invoke(&self, registry: &HookRegistry, value: HookValue) -> HookValue {
        self(registry, value)
    }
}

/// What kind of entry a list slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A real, host-registered callback.
    Regular,
    /// An injected probe that fires before the callback it measures.
    ProbeStart,
    /// An injected probe that fires after the callback it measures.
    ProbeStop,
}

impl EntryKind {
    /// Whether this entry is an injected probe.
    pub fn is_probe(self) -> bool {
        matches!(self, EntryKind::ProbeStart | EntryKind::ProbeStop)
    }
}

/// One slot in a priority bucket: the callback plus its metadata.
#[derive(Clone)]
pub struct HookEntry {
    id: String,
    callback: Rc<dyn HookCallback>,
    accepted_args: usize,
    kind: EntryKind,
    identity: Option<CallableIdentity>,
}

impl HookEntry {
    /// Creates a regular entry accepting one argument.
    pub fn new(id: impl Into<String>, callback: Rc<dyn HookCallback>) -> Self {
        Self {
            id: id.into(),
            callback,
            accepted_args: 1,
            kind: EntryKind::Regular,
            identity: None,
        }
    }

    /// Creates a probe entry of the given kind.
    pub fn probe(id: impl Into<String>, kind: EntryKind, callback: Rc<dyn HookCallback>) -> Self {
        debug_assert!(kind.is_probe());
        Self {
            id: id.into(),
            callback,
            accepted_args: 1,
            kind,
            identity: None,
        }
    }

    /// Sets the recorded arity.
    pub fn with_args(mut self, accepted_args: usize) -> Self {
        self.accepted_args = accepted_args;
        self
    }

    /// Sets the recorded identity.
    pub fn with_identity(mut self, identity: CallableIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// The entry's id, unique within its priority bucket.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The callback itself.
    pub fn callback(&self) -> &Rc<dyn HookCallback> {
        &self.callback
    }

    /// The recorded arity.
    pub fn accepted_args(&self) -> usize {
        self.accepted_args
    }

    /// The kind of this entry.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The identity recorded at registration, if any.
    pub fn identity(&self) -> Option<&CallableIdentity> {
        self.identity.as_ref()
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("id", &self.id)
            .field("accepted_args", &self.accepted_args)
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Capability interface for a priority-ordered callback collection.
///
/// The registry only talks to lists through this trait, so an instrumented
/// wrapper can stand in for a plain [`HookList`] transparently.
pub trait CallbackList {
    /// Inserts an entry at the given priority. A duplicate id within the
    /// same bucket overwrites the prior registration in place.
    fn insert(&mut self, priority: i64, entry: HookEntry);

    /// Removes the entry with the given id at the given priority.
    /// Returns `false` when no such entry exists; never an error.
    fn remove(&mut self, id: &str, priority: i64) -> bool;

    /// Whether an entry with the given id exists at the given priority.
    fn has(&self, id: &str, priority: i64) -> bool;

    /// The recorded identity of the entry with the given id, searching all
    /// priorities.
    fn identity_of(&self, id: &str) -> Option<CallableIdentity>;

    /// Opens a new iteration and returns its nesting level.
    fn begin_iteration(&mut self) -> usize;

    /// Advances the iteration at `level` and returns the next entry, or
    /// `None` when exhausted.
    fn next_entry(&mut self, level: usize) -> Option<HookEntry>;

    /// Closes the iteration at `level`. Iterations close LIFO.
    fn end_iteration(&mut self, level: usize);

    /// Number of regular (non-probe) callbacks across all priorities.
    fn callback_count(&self) -> usize;

    /// Whether the list holds no entries at all.
    fn is_empty(&self) -> bool;

    /// Whether this list is already an instrumented wrapper.
    fn is_instrumented(&self) -> bool {
        false
    }

    /// Downcasting access, used when wrapping a plain list in place.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
