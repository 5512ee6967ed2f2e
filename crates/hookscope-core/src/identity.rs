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

//! Callable identity resolution.
//!
//! Closures carry no reflectable identity, so callbacks are registered under
//! an explicit id string and the registry records the registration site as
//! their default identity. The [`IdentityResolver`] capability lets hosts
//! substitute richer resolution; any failure degrades to the
//! [`UNKNOWN_IDENTITY`] rather than disturbing dispatch.

use crate::error::IdentityError;
use crate::hook::HookRegistry;
use serde::{Deserialize, Serialize};
use std::rc::Weak;

/// The name recorded when a callable cannot be resolved.
pub const UNKNOWN_IDENTITY: &str = "UNKNOWN";

/// The resolved identity of a registered callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableIdentity {
    /// Qualified name of the callable.
    pub name: String,
    /// Source file the callable was defined (or registered) in, if known.
    pub file: Option<String>,
    /// Starting line within `file`, if known.
    pub line: Option<u32>,
}

impl CallableIdentity {
    /// An identity with a name but no source location.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            line: None,
        }
    }

    /// An identity with a full source location.
    pub fn at(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// The fallback identity for unresolvable callables.
    pub fn unknown() -> Self {
        Self::named(UNKNOWN_IDENTITY)
    }
}

/// Capability for resolving a registered callback to its identity.
pub trait IdentityResolver {
    /// Resolves the callback registered as `id` under `event`.
    fn resolve(&self, event: &str, id: &str) -> Result<CallableIdentity, IdentityError>;
}

/// Default resolver: looks identities up in the registry, where they were
/// recorded at registration time.
#[derive(Debug)]
pub struct RegistryIdentityResolver {
    registry: Weak<HookRegistry>,
}

impl RegistryIdentityResolver {
    /// Creates a resolver backed by the given registry.
    pub fn new(registry: Weak<HookRegistry>) -> Self {
        Self { registry }
    }
}

impl IdentityResolver for RegistryIdentityResolver {
    fn resolve(&self, event: &str, id: &str) -> Result<CallableIdentity, IdentityError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| IdentityError::Resolver("hook registry dropped".to_string()))?;
        registry
            .callback_identity(event, id)
            .ok_or_else(|| IdentityError::Unresolvable {
                event: event.to_string(),
                id: id.to_string(),
            })
    }
}
