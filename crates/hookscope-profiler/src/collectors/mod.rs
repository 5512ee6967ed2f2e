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

//! Profiler collectors: named, individually toggleable data gatherers.

mod function;
mod hook;
mod trace;

pub use function::FunctionCollector;
pub use hook::HookCollector;
pub use trace::CallerTraceCollector;

use crate::session::RequestInfo;
use serde_json::Value;

/// A named source of profiling data.
///
/// Collectors are registered with the session under their [`name`] and can
/// be enabled or disabled at any point; a disabled collector gathers
/// nothing and contributes nothing to the report.
///
/// [`name`]: Collector::name
pub trait Collector {
    /// Stable name the collector's data appears under in the report.
    fn name(&self) -> &str;

    /// Order in which [`filename_parts`] is applied across collectors;
    /// lower runs first.
    ///
    /// [`filename_parts`]: Collector::filename_parts
    fn filename_priority(&self) -> i32 {
        0
    }

    /// Starts gathering.
    fn enable(&self);

    /// Stops gathering.
    fn disable(&self);

    /// Whether the collector is currently gathering.
    fn is_enabled(&self) -> bool;

    /// The gathered data, or `None` when the collector has nothing to
    /// contribute to the report body.
    fn collect(&self) -> Option<Value>;

    /// Lets the collector prepend segments to the report filename.
    fn filename_parts(&self, _request: &RequestInfo, parts: Vec<String>) -> Vec<String> {
        parts
    }
}
