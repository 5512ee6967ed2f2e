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

//! Global memory allocation counters and the allocator that maintains them.
//!
//! This module is a contract: a registered [`TrackingAllocator`] increments
//! the counters, and any part of the profiler can read them thread-safely.
//! Without a registered tracking allocator every counter stays at zero and
//! the report layer falls back to process-level sampling.

mod allocator;

pub use allocator::TrackingAllocator;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Total bytes currently allocated by the registered global allocator.
pub static CURRENTLY_ALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Peak bytes ever allocated simultaneously during the process lifetime.
pub static PEAK_ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Total number of allocation calls made.
pub static TOTAL_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Total number of deallocation calls made.
pub static TOTAL_DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Cumulative bytes ever allocated over the process lifetime.
pub static BYTES_ALLOCATED_LIFETIME: AtomicU64 = AtomicU64::new(0);

/// Cumulative bytes ever deallocated over the process lifetime.
pub static BYTES_DEALLOCATED_LIFETIME: AtomicU64 = AtomicU64::new(0);

/// Bytes currently allocated, as maintained by the tracking allocator.
///
/// Zero when no tracking allocator is registered.
pub fn current_allocated_bytes() -> usize {
    CURRENTLY_ALLOCATED_BYTES.load(Ordering::Relaxed)
}

/// Peak simultaneous allocation, as maintained by the tracking allocator.
///
/// Zero when no tracking allocator is registered.
pub fn peak_allocated_bytes() -> u64 {
    PEAK_ALLOCATED_BYTES.load(Ordering::Relaxed)
}

/// A snapshot of the raw allocation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    /// Bytes currently in use.
    pub current_allocated_bytes: usize,
    /// Maximum bytes ever in use simultaneously.
    pub peak_allocated_bytes: u64,
    /// Number of allocation calls.
    pub total_allocations: u64,
    /// Number of deallocation calls.
    pub total_deallocations: u64,
    /// Cumulative bytes allocated.
    pub bytes_allocated_lifetime: u64,
    /// Cumulative bytes deallocated.
    pub bytes_deallocated_lifetime: u64,
}

/// Takes a snapshot of all counters (each read with `Ordering::Relaxed`).
pub fn memory_stats() -> MemoryStats {
    MemoryStats {
        current_allocated_bytes: CURRENTLY_ALLOCATED_BYTES.load(Ordering::Relaxed),
        peak_allocated_bytes: PEAK_ALLOCATED_BYTES.load(Ordering::Relaxed),
        total_allocations: TOTAL_ALLOCATIONS.load(Ordering::Relaxed),
        total_deallocations: TOTAL_DEALLOCATIONS.load(Ordering::Relaxed),
        bytes_allocated_lifetime: BYTES_ALLOCATED_LIFETIME.load(Ordering::Relaxed),
        bytes_deallocated_lifetime: BYTES_DEALLOCATED_LIFETIME.load(Ordering::Relaxed),
    }
}
