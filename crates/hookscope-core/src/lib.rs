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

//! # Hookscope Core
//!
//! Foundational crate containing the prioritized hook dispatcher, timer and
//! memory sampling primitives, and the interface contracts the profiler
//! layers on top of.
//!
//! The dispatcher is single-threaded and re-entrant: a callback may
//! synchronously dispatch further events (including the one it is running
//! under) before returning. There is no parallelism anywhere in this crate;
//! the only "concurrently" mutated resource is a [`hook::HookList`] being
//! modified while it is iterated, which the per-nesting-level cursors are
//! designed to survive.

#![warn(missing_docs)]

pub mod error;
pub mod hook;
pub mod identity;
pub mod memory;
pub mod timer;

pub use hook::{CallbackList, DispatchObserver, HookCallback, HookEntry, HookList, HookRegistry};
pub use identity::{CallableIdentity, IdentityResolver};
pub use timer::TimerStore;
