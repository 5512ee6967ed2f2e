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

//! Elementary start/stop timing and memory sampling.
//!
//! A [`TimerStore`] is opened once (sampling the monotonic clock, the wall
//! clock and the currently allocated bytes) and closed once; after closing
//! it is immutable. Every call-tree node and function record owns exactly
//! one.

use crate::memory;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One start/stop timing and memory sample.
#[derive(Debug, Clone)]
pub struct TimerStore {
    start: Instant,
    wall_start: SystemTime,
    memory_start: u64,
    stop: Option<Instant>,
    wall_stop: Option<SystemTime>,
    memory_stop: Option<u64>,
}

impl TimerStore {
    /// Opens a new sample at the current instant.
    pub fn open() -> Self {
        Self {
            start: Instant::now(),
            wall_start: SystemTime::now(),
            memory_start: memory::current_allocated_bytes() as u64,
            stop: None,
            wall_stop: None,
            memory_stop: None,
        }
    }

    /// Closes the sample. Closing an already-closed sample is a
    /// bookkeeping bug; it is logged and ignored.
    pub fn close(&mut self) {
        if self.is_closed() {
            log::error!("TimerStore closed twice; keeping the first sample");
            return;
        }
        self.stop = Some(Instant::now());
        self.wall_stop = Some(SystemTime::now());
        self.memory_stop = Some(memory::current_allocated_bytes() as u64);
    }

    /// Whether the sample has been closed.
    pub fn is_closed(&self) -> bool {
        self.stop.is_some()
    }

    /// Elapsed time between open and close, or `None` while still open.
    pub fn elapsed(&self) -> Option<Duration> {
        self.stop.map(|stop| stop.duration_since(self.start))
    }

    /// Elapsed time in seconds, or `None` while still open.
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.elapsed().map(|d| d.as_secs_f64())
    }

    /// Allocated bytes sampled at open.
    pub fn memory_start(&self) -> u64 {
        self.memory_start
    }

    /// Allocated bytes sampled at close, or `None` while still open.
    pub fn memory_stop(&self) -> Option<u64> {
        self.memory_stop
    }

    /// Signed allocation delta across the sample, or `None` while open.
    pub fn memory_delta(&self) -> Option<i64> {
        self.memory_stop
            .map(|stop| stop as i64 - self.memory_start as i64)
    }

    /// The serializable view of a closed sample.
    ///
    /// An open sample yields open (null) stop fields; use
    /// [`TimerStore::finalized_view`] to force-close for reporting.
    pub fn view(&self) -> TimerView {
        TimerView {
            start: unix_secs(self.wall_start),
            stop: self.wall_stop.map(unix_secs),
            time: self.elapsed_secs(),
            human_time: self.elapsed_secs().map(format_human),
            memory_start: self.memory_start,
            memory_stop: self.memory_stop,
            memory: self.memory_delta(),
        }
    }

    /// A view with all fields terminal: a still-open sample is rendered as
    /// if it had been closed right now, without mutating the store. On a
    /// closed sample this is identical to [`TimerStore::view`], so
    /// finalizing twice yields the same result.
    pub fn finalized_view(&self) -> TimerView {
        if self.is_closed() {
            return self.view();
        }
        let elapsed = self.start.elapsed().as_secs_f64();
        let memory_now = memory::current_allocated_bytes() as u64;
        TimerView {
            start: unix_secs(self.wall_start),
            stop: Some(unix_secs(SystemTime::now())),
            time: Some(elapsed),
            human_time: Some(format_human(elapsed)),
            memory_start: self.memory_start,
            memory_stop: Some(memory_now),
            memory: Some(memory_now as i64 - self.memory_start as i64),
        }
    }
}

fn unix_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Six-decimal rendering, matching the report's `human_time` convention.
fn format_human(secs: f64) -> String {
    format!("{secs:.6}")
}

/// Serializable snapshot of a [`TimerStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerView {
    /// Wall-clock open time, seconds since the Unix epoch.
    pub start: f64,
    /// Wall-clock close time; `None` while the sample is open.
    pub stop: Option<f64>,
    /// Elapsed seconds; `None` while the sample is open.
    pub time: Option<f64>,
    /// Six-decimal rendering of `time`.
    pub human_time: Option<String>,
    /// Allocated bytes at open.
    pub memory_start: u64,
    /// Allocated bytes at close; `None` while open.
    pub memory_stop: Option<u64>,
    /// `memory_stop - memory_start`, signed.
    pub memory: Option<i64>,
}
