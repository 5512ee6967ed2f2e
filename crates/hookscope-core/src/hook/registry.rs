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

//! The event dispatcher: named events, registration, re-entrant dispatch,
//! dispatch observers, and per-event list instrumentation.

use super::list::HookList;
use super::{CallbackList, HookCallback, HookEntry, HookValue};
use crate::identity::CallableIdentity;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::Location;
use std::rc::Rc;

/// Source location of a `dispatch` call, captured via `#[track_caller]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerSite {
    /// File containing the dispatch call.
    pub file: String,
    /// Line of the dispatch call.
    pub line: u32,
}

impl CallerSite {
    fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

impl std::fmt::Display for CallerSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Receives a notification at the start and end of every dispatch,
/// including nested ones and dispatches of events with no callbacks.
pub trait DispatchObserver {
    /// A dispatch of `event` is about to run its callbacks.
    fn dispatch_began(&self, registry: &HookRegistry, event: &str, caller: &CallerSite);

    /// The dispatch of `event` that most recently began has finished.
    fn dispatch_ended(&self, registry: &HookRegistry, event: &str);
}

/// A registry of named events and their callback lists.
///
/// Dispatch is re-entrant: a callback may dispatch further events, register
/// or remove callbacks on any event (including the one currently running),
/// and the iteration guarantees of [`HookList`] hold throughout. The
/// registry is single-threaded by construction; share it with `Rc`.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RefCell<HashMap<String, Rc<RefCell<Box<dyn CallbackList>>>>>,
    current: RefCell<Vec<String>>,
    observers: RefCell<Vec<Rc<dyn DispatchObserver>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` on `event` under `id` at `priority`.
    ///
    /// The registration site becomes the callback's default identity. A
    /// duplicate `(id, priority)` pair overwrites the earlier registration
    /// in place.
    #[track_caller]
    pub fn register<F>(&self, event: &str, id: &str, priority: i64, accepted_args: usize, callback: F)
    where
        F: Fn(&HookRegistry, HookValue) -> HookValue + 'static,
    {
        let location = Location::caller();
        let identity = CallableIdentity::at(id, location.file(), location.line());
        let entry = HookEntry::new(id, Rc::new(callback))
            .with_args(accepted_args)
            .with_identity(identity);
        self.register_entry(event, priority, entry);
    }

    /// Registers a pre-built entry on `event` at `priority`.
    pub fn register_entry(&self, event: &str, priority: i64, entry: HookEntry) {
        let list = self.list_for(event);
        list.borrow_mut().insert(priority, entry);
    }

    /// Removes the callback registered under `(id, priority)` on `event`.
    /// Returns whether anything was removed.
    pub fn remove(&self, event: &str, id: &str, priority: i64) -> bool {
        let Some(list) = self.existing_list(event) else {
            return false;
        };
        let removed = list.borrow_mut().remove(id, priority);
        removed
    }

    /// Whether `event` has a callback registered under `(id, priority)`.
    pub fn has_callback(&self, event: &str, id: &str, priority: i64) -> bool {
        self.existing_list(event)
            .is_some_and(|list| list.borrow().has(id, priority))
    }

    /// Number of regular callbacks registered on `event`.
    pub fn callback_count(&self, event: &str) -> usize {
        self.existing_list(event)
            .map_or(0, |list| list.borrow().callback_count())
    }

    /// The identity recorded for `id` on `event`, if any.
    pub fn callback_identity(&self, event: &str, id: &str) -> Option<CallableIdentity> {
        self.existing_list(event)
            .and_then(|list| list.borrow().identity_of(id))
    }

    /// Subscribes an observer to every subsequent dispatch.
    pub fn add_observer(&self, observer: Rc<dyn DispatchObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Unsubscribes a previously added observer.
    pub fn remove_observer(&self, observer: &Rc<dyn DispatchObserver>) {
        self.observers
            .borrow_mut()
            .retain(|o| !Rc::ptr_eq(o, observer));
    }

    /// How many dispatches are currently in flight.
    pub fn depth(&self) -> usize {
        self.current.borrow().len()
    }

    /// The event whose dispatch is innermost right now, if any.
    pub fn current_event(&self) -> Option<String> {
        self.current.borrow().last().cloned()
    }

    /// Whether `event` is anywhere on the in-flight dispatch stack.
    pub fn is_dispatching(&self, event: &str) -> bool {
        self.current.borrow().iter().any(|e| e == event)
    }

    /// Dispatches `event`, threading `value` through every callback in
    /// priority order and returning the final value.
    ///
    /// Observers are notified before the first callback and after the last
    /// one, even when `event` has no callbacks at all.
    #[track_caller]
    pub fn dispatch(&self, event: &str, value: HookValue) -> HookValue {
        let caller = CallerSite::from_location(Location::caller());
        self.current.borrow_mut().push(event.to_string());

        // Snapshot so observers may unsubscribe themselves mid-dispatch.
        let observers: Vec<_> = self.observers.borrow().clone();
        for observer in &observers {
            observer.dispatch_began(self, event, &caller);
        }

        let list = self.list_for(event);
        let level = list.borrow_mut().begin_iteration();

        let mut value = value;
        loop {
            // The borrow must not outlive this statement: the callback may
            // re-enter the registry and mutate this very list.
            let next = list.borrow_mut().next_entry(level);
            match next {
                Some(entry) => value = entry.callback().invoke(self, value),
                None => break,
            }
        }

        list.borrow_mut().end_iteration(level);

        for observer in observers.iter().rev() {
            observer.dispatch_ended(self, event);
        }
        self.current.borrow_mut().pop();
        value
    }

    /// Replaces `event`'s plain [`HookList`] with whatever `wrap` builds
    /// from it, preserving live iteration cursors. Returns `false` when the
    /// list is already instrumented (or is not a plain list), leaving it
    /// untouched.
    pub fn instrument<F>(&self, event: &str, wrap: F) -> bool
    where
        F: FnOnce(HookList) -> Box<dyn CallbackList>,
    {
        let list = self.list_for(event);
        let mut guard = list.borrow_mut();
        if guard.is_instrumented() {
            return false;
        }
        let Some(plain) = guard.as_any_mut().downcast_mut::<HookList>() else {
            return false;
        };
        let taken = std::mem::take(plain);
        *guard = wrap(taken);
        true
    }

    /// Every event name that currently has a list, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hooks.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn list_for(&self, event: &str) -> Rc<RefCell<Box<dyn CallbackList>>> {
        self.hooks
            .borrow_mut()
            .entry(event.to_string())
            .or_insert_with(|| Rc::new(RefCell::new(Box::new(HookList::new()) as Box<dyn CallbackList>)))
            .clone()
    }

    fn existing_list(&self, event: &str) -> Option<Rc<RefCell<Box<dyn CallbackList>>>> {
        self.hooks.borrow().get(event).cloned()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("events", &self.hooks.borrow().len())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
