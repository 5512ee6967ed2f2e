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

//! Error types shared across the dispatcher and the profiler.
//!
//! Instrumentation errors are never allowed to alter the behavior of the
//! host dispatch: identity failures degrade to an `UNKNOWN` record and
//! structural inconsistencies are logged loudly and then ignored.

use std::fmt::{self, Display};

/// An error resolving the identity of a registered callable.
///
/// Recovered locally by the function collector, which substitutes the
/// `UNKNOWN` identity rather than aborting the surrounding dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No identity is on record for the given (event, callback id) pair.
    Unresolvable {
        /// The event the callback was looked up under.
        event: String,
        /// The callback id that could not be resolved.
        id: String,
    },
    /// A custom resolver failed with its own message.
    Resolver(String),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::Unresolvable { event, id } => {
                write!(f, "no identity recorded for callback '{id}' on event '{event}'")
            }
            IdentityError::Resolver(msg) => write!(f, "identity resolver failed: {msg}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// An impossible state detected in cursor or call-tree bookkeeping.
///
/// These indicate a bug in the instrumentation rather than in the host, so
/// they are reported via `log::error!` and degraded to a no-op instead of
/// crashing the dispatch they are riding on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A stop signal arrived with no matching open record.
    StopWithoutStart {
        /// What kind of record the stop was aimed at.
        context: &'static str,
    },
    /// An iteration cursor was driven below its starting position or
    /// addressed at a nesting level that does not exist.
    CursorOutOfRange {
        /// The nesting level that was addressed.
        level: usize,
        /// The number of live cursors at the time.
        live: usize,
    },
    /// The tracked nesting depth disagrees with the dispatcher's own count.
    DepthMismatch {
        /// Depth reported by the dispatcher.
        dispatcher: usize,
        /// Depth tracked by the collector.
        tracked: usize,
    },
}

impl Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::StopWithoutStart { context } => {
                write!(f, "stop without a matching start ({context})")
            }
            StructuralError::CursorOutOfRange { level, live } => {
                write!(f, "iteration cursor out of range: level {level}, {live} live")
            }
            StructuralError::DepthMismatch { dispatcher, tracked } => {
                write!(
                    f,
                    "nesting depth mismatch: dispatcher reports {dispatcher}, tracker holds {tracked}"
                )
            }
        }
    }
}

impl std::error::Error for StructuralError {}
