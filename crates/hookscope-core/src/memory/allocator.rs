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

//! An implementation of `GlobalAlloc` that tracks memory usage.

use super::{
    BYTES_ALLOCATED_LIFETIME, BYTES_DEALLOCATED_LIFETIME, CURRENTLY_ALLOCATED_BYTES,
    PEAK_ALLOCATED_BYTES, TOTAL_ALLOCATIONS, TOTAL_DEALLOCATIONS,
};
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::Ordering;

/// A wrapper around a `GlobalAlloc` implementation (like `std::alloc::System`)
/// that intercepts allocation calls to update the global memory counters in
/// [`crate::memory`].
///
/// Registering it as the `#[global_allocator]` gives the profiler's timer
/// samples real per-span allocation deltas instead of the process-RSS
/// fallback.
///
/// # Usage
///
/// ```rust,ignore
/// use hookscope_core::memory::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator::new(std::alloc::System);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl<A> TrackingAllocator<A> {
    /// Creates a new tracking allocator that wraps the given inner allocator.
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn record_alloc(size: usize) {
    let result = CURRENTLY_ALLOCATED_BYTES.fetch_update(
        Ordering::Relaxed,
        Ordering::Relaxed,
        |current| current.checked_add(size),
    );

    if let Ok(current_total) = result {
        let new_total = current_total + size;
        PEAK_ALLOCATED_BYTES.fetch_max(new_total as u64, Ordering::Relaxed);
        TOTAL_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        BYTES_ALLOCATED_LIFETIME.fetch_add(size as u64, Ordering::Relaxed);
    }
}

fn record_dealloc(size: usize) {
    let result = CURRENTLY_ALLOCATED_BYTES.fetch_update(
        Ordering::Relaxed,
        Ordering::Relaxed,
        |current| current.checked_sub(size),
    );

    if result.is_ok() {
        TOTAL_DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        BYTES_DEALLOCATED_LIFETIME.fetch_add(size as u64, Ordering::Relaxed);
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    /// Allocates memory and updates tracking counters.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it is part of the `GlobalAlloc` trait.
    /// The caller must ensure that `layout` has a non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    /// Deallocates memory and updates tracking counters.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it is part of the `GlobalAlloc` trait.
    /// The caller must ensure that `ptr` was allocated by this allocator with
    /// the same `layout`.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record_dealloc(layout.size());
        self.inner.dealloc(ptr, layout);
    }

    /// Allocates zero-initialized memory and updates tracking counters.
    ///
    /// # Safety
    ///
    /// See [`GlobalAlloc::alloc_zeroed`].
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    /// Reallocates memory, accounting the size change as a paired
    /// dealloc/alloc.
    ///
    /// # Safety
    ///
    /// See [`GlobalAlloc::realloc`].
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}
