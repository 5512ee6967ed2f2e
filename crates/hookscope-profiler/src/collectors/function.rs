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

//! The per-callback timing collector.

use super::Collector;
use crate::instrument::ProbeSink;
use crate::session::RequestInfo;
use crate::tree::CallTree;
use hookscope_core::hook::HookRegistry;
use hookscope_core::identity::{CallableIdentity, IdentityResolver};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Records one timing entry per callback execution, fed by the probes that
/// [`InstrumentedList`] injects.
///
/// Identity lookups go through an optional [`IdentityResolver`]; a failed
/// lookup is logged and recorded as the UNKNOWN identity rather than
/// aborting the dispatch.
///
/// [`InstrumentedList`]: crate::instrument::InstrumentedList
pub struct FunctionCollector {
    tree: Rc<RefCell<CallTree>>,
    enabled: Cell<bool>,
    resolver: RefCell<Option<Rc<dyn IdentityResolver>>>,
    ignored: RefCell<HashSet<String>>,
}

impl FunctionCollector {
    /// The name this collector reports under.
    pub const NAME: &'static str = "function";

    /// Creates a collector recording into `tree`. Starts disabled.
    pub fn new(tree: Rc<RefCell<CallTree>>) -> Self {
        Self {
            tree,
            enabled: Cell::new(false),
            resolver: RefCell::new(None),
            ignored: RefCell::new(HashSet::new()),
        }
    }

    /// Sets the resolver used to turn callback ids into identities.
    pub fn set_resolver(&self, resolver: Rc<dyn IdentityResolver>) {
        *self.resolver.borrow_mut() = Some(resolver);
    }

    /// Excludes a callback id from probing.
    pub fn ignore_callback(&self, id: impl Into<String>) {
        self.ignored.borrow_mut().insert(id.into());
    }

    fn identity_for(&self, registry: &HookRegistry, event: &str, id: &str) -> CallableIdentity {
        let resolved = self
            .resolver
            .borrow()
            .as_ref()
            .map(|resolver| resolver.resolve(event, id));
        match resolved {
            Some(Ok(identity)) => identity,
            Some(Err(err)) => {
                log::warn!("identity lookup failed: {err}");
                CallableIdentity::unknown()
            }
            None => registry
                .callback_identity(event, id)
                .unwrap_or_else(CallableIdentity::unknown),
        }
    }
}

impl ProbeSink for FunctionCollector {
    fn function_started(&self, registry: &HookRegistry, event: &str, id: &str) {
        let identity = self.identity_for(registry, event, id);
        self.tree.borrow_mut().push_function(identity);
    }

    fn function_finished(&self, _registry: &HookRegistry, _event: &str, _id: &str) {
        self.tree.borrow_mut().close_last_open_function();
    }

    fn is_callback_ignored(&self, id: &str) -> bool {
        self.ignored.borrow().contains(id)
    }

    fn is_active(&self) -> bool {
        self.enabled.get()
    }
}

impl Collector for FunctionCollector {
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

    /// Function records live inside the dispatch tree nodes; there is no
    /// separate report section.
    fn collect(&self) -> Option<Value> {
        None
    }

    fn filename_parts(&self, request: &RequestInfo, mut parts: Vec<String>) -> Vec<String> {
        parts.insert(0, slugify(&request.uri));
        parts
    }
}

/// Lowercases and squashes anything non-alphanumeric into single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("root");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookscope_core::error::IdentityError;

    struct FailingResolver;
    impl IdentityResolver for FailingResolver {
        fn resolve(&self, event: &str, id: &str) -> Result<CallableIdentity, IdentityError> {
            Err(IdentityError::Unresolvable {
                event: event.to_string(),
                id: id.to_string(),
            })
        }
    }

    #[test]
    fn failed_resolution_falls_back_to_unknown() {
        let tree = Rc::new(RefCell::new(CallTree::new()));
        let collector = FunctionCollector::new(tree.clone());
        collector.enable();
        collector.set_resolver(Rc::new(FailingResolver));

        let registry = HookRegistry::new();
        collector.function_started(&registry, "evt", "cb");
        collector.function_finished(&registry, "evt", "cb");

        let tree = tree.borrow();
        let record = &tree.node(tree.root()).functions[0];
        assert_eq!(record.identity.name, "UNKNOWN");
        assert!(record.timer.is_closed());
    }

    #[test]
    fn without_resolver_registry_identity_is_used() {
        let tree = Rc::new(RefCell::new(CallTree::new()));
        let collector = FunctionCollector::new(tree.clone());
        collector.enable();

        let registry = HookRegistry::new();
        registry.register("evt", "cb", 10, 1, |_, v| v);
        collector.function_started(&registry, "evt", "cb");
        collector.function_finished(&registry, "evt", "cb");

        let tree = tree.borrow();
        assert_eq!(tree.node(tree.root()).functions[0].identity.name, "cb");
    }

    #[test]
    fn ignored_ids_are_reported_as_such() {
        let tree = Rc::new(RefCell::new(CallTree::new()));
        let collector = FunctionCollector::new(tree);
        collector.ignore_callback("noisy");
        assert!(collector.is_callback_ignored("noisy"));
        assert!(!collector.is_callback_ignored("other"));
    }

    #[test]
    fn slugify_squashes_and_lowercases() {
        assert_eq!(slugify("/orders/Recent?page=2"), "orders-recent-page-2");
        assert_eq!(slugify("///"), "root");
        assert_eq!(slugify(""), "root");
    }
}
