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

//! Runtime instrumentation for the hookscope dispatcher.
//!
//! A [`ProfilerSession`] attaches to a live [`HookRegistry`], injects
//! timing probes around its callbacks, builds a call tree as dispatches
//! nest, and writes a JSON report when the session ends.
//!
//! [`HookRegistry`]: hookscope_core::hook::HookRegistry

#![warn(missing_docs)]

pub mod collectors;
pub mod instrument;
pub mod report;
pub mod session;
pub mod tree;

pub use collectors::{CallerTraceCollector, Collector, FunctionCollector, HookCollector};
pub use instrument::{InstrumentedList, ProbeSink};
pub use report::{FileSystemReporter, ReportDocument, ReportError, ReportNode, ReportSink};
pub use session::{ProfilerSession, RequestInfo};
pub use tree::{CallTree, NodeId};
