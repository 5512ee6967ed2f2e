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

//! The priority-ordered callback collection and its mutation-safe cursors.

use super::{CallbackList, EntryKind, HookEntry};
use crate::error::StructuralError;
use crate::identity::CallableIdentity;
use std::any::Any;
use std::collections::BTreeMap;

/// One live iteration over the list.
///
/// Holds a snapshot of the priority keys plus a position; `entry_idx` is the
/// index of the next entry to run within the current bucket, so entries at
/// smaller indices have already executed. Both fields are adjusted whenever
/// the list mutates underneath the cursor.
#[derive(Debug, Clone)]
struct IterationCursor {
    priorities: Vec<i64>,
    priority_idx: usize,
    entry_idx: usize,
}

impl IterationCursor {
    fn current_priority(&self) -> Option<i64> {
        self.priorities.get(self.priority_idx).copied()
    }
}

/// Read-only view of a live cursor, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationSnapshot {
    /// The priority the cursor is currently positioned on, if any remain.
    pub current_priority: Option<i64>,
    /// How many entries of the current bucket have already run.
    pub entries_run: usize,
    /// Priorities still ahead of the cursor (including the current one).
    pub remaining_priorities: Vec<i64>,
}

/// A mutable, priority-ordered callback collection.
///
/// Priorities ascend; within a bucket, insertion order is preserved and a
/// duplicate id overwrites in place. Iteration is re-entrant: each nesting
/// level gets its own cursor, and every cursor survives insertion and
/// removal happening mid-iteration without skipping or repeating callbacks.
#[derive(Debug, Default)]
pub struct HookList {
    buckets: BTreeMap<i64, Vec<HookEntry>>,
    cursors: Vec<IterationCursor>,
}

impl HookList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sorted priorities currently present.
    pub fn priorities(&self) -> Vec<i64> {
        self.buckets.keys().copied().collect()
    }

    /// Every entry id currently in the list, in iteration order.
    pub fn entry_ids(&self) -> Vec<String> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .map(|e| e.id().to_string())
            .collect()
    }

    /// Number of live (possibly nested) iterations.
    pub fn active_iterations(&self) -> usize {
        self.cursors.len()
    }

    /// A read-only view of the cursor at `level`.
    pub fn iteration_snapshot(&self, level: usize) -> Option<IterationSnapshot> {
        self.cursors.get(level).map(|cursor| IterationSnapshot {
            current_priority: cursor.current_priority(),
            entries_run: cursor.entry_idx,
            remaining_priorities: cursor.priorities[cursor.priority_idx..].to_vec(),
        })
    }

    /// Rebuilds every bucket, letting `wrap` surround individual entries
    /// with extra entries (`(before, after)`); `None` leaves an entry alone.
    ///
    /// Live cursors are remapped so that the next entry due to run is the
    /// first of the replacement group of the entry that was due to run.
    /// Injected probes ahead of a pending callback fire; probes around
    /// already-executed callbacks do not re-fire anything.
    pub fn wrap_entries<F>(&mut self, mut wrap: F)
    where
        F: FnMut(i64, &HookEntry) -> Option<(Vec<HookEntry>, Vec<HookEntry>)>,
    {
        let priorities: Vec<i64> = self.buckets.keys().copied().collect();
        for priority in priorities {
            let Some(bucket) = self.buckets.get_mut(&priority) else {
                continue;
            };
            let old = std::mem::take(bucket);

            let mut rebuilt = Vec::with_capacity(old.len());
            // group_starts[i] is the rebuilt index where old entry i's
            // replacement group begins; one extra slot maps a cursor
            // standing at end-of-bucket.
            let mut group_starts = Vec::with_capacity(old.len() + 1);
            for entry in old {
                group_starts.push(rebuilt.len());
                match wrap(priority, &entry) {
                    Some((before, after)) => {
                        rebuilt.extend(before);
                        rebuilt.push(entry);
                        rebuilt.extend(after);
                    }
                    None => rebuilt.push(entry),
                }
            }
            group_starts.push(rebuilt.len());

            for cursor in &mut self.cursors {
                if cursor.current_priority() == Some(priority) {
                    let old_idx = cursor.entry_idx.min(group_starts.len() - 1);
                    cursor.entry_idx = group_starts[old_idx];
                }
            }

            *bucket = rebuilt;
        }
    }

    /// A new priority bucket appeared: live cursors that have not passed it
    /// yet must still visit it; cursors already past it must not rewind.
    fn on_bucket_added(&mut self, priority: i64) {
        for cursor in &mut self.cursors {
            let pos = cursor.priorities.partition_point(|&p| p < priority);
            if cursor.priorities.get(pos) == Some(&priority) {
                continue; // already in the snapshot
            }
            let not_yet_passed = pos > cursor.priority_idx
                || (pos == cursor.priority_idx && cursor.entry_idx == 0);
            if not_yet_passed {
                cursor.priorities.insert(pos, priority);
            }
        }
    }

    /// A bucket emptied out: regenerate every cursor's snapshot without it,
    /// keeping each cursor logically where it was.
    fn on_bucket_removed(&mut self, priority: i64) {
        for cursor in &mut self.cursors {
            if let Some(idx) = cursor.priorities.iter().position(|&p| p == priority) {
                cursor.priorities.remove(idx);
                if idx < cursor.priority_idx {
                    cursor.priority_idx -= 1;
                } else if idx == cursor.priority_idx {
                    // The in-progress bucket vanished; continue with the
                    // next priority from its first entry.
                    cursor.entry_idx = 0;
                }
            }
        }
    }
}

impl CallbackList for HookList {
    fn insert(&mut self, priority: i64, entry: HookEntry) {
        if let Some(bucket) = self.buckets.get_mut(&priority) {
            if let Some(pos) = bucket.iter().position(|e| e.id() == entry.id()) {
                // Duplicate suppression: overwrite in place, keeping the
                // original position so no cursor needs adjusting.
                bucket[pos] = entry;
            } else {
                bucket.push(entry);
            }
        } else {
            self.buckets.insert(priority, vec![entry]);
            self.on_bucket_added(priority);
        }
    }

    fn remove(&mut self, id: &str, priority: i64) -> bool {
        let Some(bucket) = self.buckets.get_mut(&priority) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|e| e.id() == id) else {
            return false;
        };
        bucket.remove(pos);
        let emptied = bucket.is_empty();

        for cursor in &mut self.cursors {
            if cursor.current_priority() == Some(priority) && cursor.entry_idx > pos {
                // An already-executed slot disappeared; shift back so the
                // next pending entry is neither skipped nor repeated.
                cursor.entry_idx -= 1;
            }
        }

        if emptied {
            self.buckets.remove(&priority);
            self.on_bucket_removed(priority);
        }
        true
    }

    fn has(&self, id: &str, priority: i64) -> bool {
        self.buckets
            .get(&priority)
            .is_some_and(|bucket| bucket.iter().any(|e| e.id() == id))
    }

    fn identity_of(&self, id: &str) -> Option<CallableIdentity> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .find(|e| e.id() == id)
            .and_then(|e| e.identity().cloned())
    }

    fn begin_iteration(&mut self) -> usize {
        let level = self.cursors.len();
        self.cursors.push(IterationCursor {
            priorities: self.buckets.keys().copied().collect(),
            priority_idx: 0,
            entry_idx: 0,
        });
        level
    }

    fn next_entry(&mut self, level: usize) -> Option<HookEntry> {
        let Self { buckets, cursors } = self;
        let Some(cursor) = cursors.get_mut(level) else {
            log::error!(
                "{}",
                StructuralError::CursorOutOfRange {
                    level,
                    live: cursors.len(),
                }
            );
            return None;
        };

        loop {
            let priority = cursor.current_priority()?;
            match buckets.get(&priority) {
                Some(bucket) if cursor.entry_idx < bucket.len() => {
                    let entry = bucket[cursor.entry_idx].clone();
                    cursor.entry_idx += 1;
                    return Some(entry);
                }
                _ => {
                    // Bucket exhausted (or gone without notice); move on.
                    cursor.priority_idx += 1;
                    cursor.entry_idx = 0;
                }
            }
        }
    }

    fn end_iteration(&mut self, level: usize) {
        if level + 1 == self.cursors.len() {
            self.cursors.pop();
        } else {
            log::error!(
                "{}",
                StructuralError::CursorOutOfRange {
                    level,
                    live: self.cursors.len(),
                }
            );
            // Degrade: drop this level and anything stacked above it.
            self.cursors.truncate(level);
        }
    }

    fn callback_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|e| e.kind() == EntryKind::Regular)
            .count()
    }

    fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookValue;
    use std::rc::Rc;

    fn entry(id: &str) -> HookEntry {
        let cb = Rc::new(|_: &crate::hook::HookRegistry, value: HookValue| value);
        HookEntry::new(id, cb)
    }

    fn drain(list: &mut HookList, level: usize) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(e) = list.next_entry(level) {
            seen.push(e.id().to_string());
        }
        seen
    }

    #[test]
    fn iterates_priority_ascending_fifo_within_bucket() {
        let mut list = HookList::new();
        list.insert(20, entry("c"));
        list.insert(10, entry("a"));
        list.insert(10, entry("b"));

        let level = list.begin_iteration();
        assert_eq!(drain(&mut list, level), vec!["a", "b", "c"]);
        list.end_iteration(level);
        assert_eq!(list.active_iterations(), 0);
    }

    #[test]
    fn duplicate_id_overwrites_in_place() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(10, entry("b"));
        list.insert(10, entry("a").with_args(3));

        assert_eq!(list.callback_count(), 2);
        let level = list.begin_iteration();
        assert_eq!(drain(&mut list, level), vec!["a", "b"]);
        list.end_iteration(level);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        assert!(!list.remove("missing", 10));
        assert!(!list.remove("a", 99));
        assert!(list.remove("a", 10));
        assert!(list.is_empty());
    }

    #[test]
    fn higher_priority_added_mid_iteration_is_visited() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");

        // Registered while "a" runs: a later bucket must still fire.
        list.insert(20, entry("late"));
        assert_eq!(list.next_entry(level).unwrap().id(), "late");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
    }

    #[test]
    fn lower_priority_added_mid_iteration_is_not_rewound_into() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");

        // Bucket 5 would have fired before "a"; too late now.
        list.insert(5, entry("early"));
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);

        // A fresh iteration sees it in order.
        let level = list.begin_iteration();
        assert_eq!(drain(&mut list, level), vec!["early", "a"]);
        list.end_iteration(level);
    }

    #[test]
    fn append_to_current_bucket_mid_iteration_fires() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");

        list.insert(10, entry("b"));
        assert_eq!(list.next_entry(level).unwrap().id(), "b");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
    }

    #[test]
    fn removing_executed_entry_does_not_skip_or_repeat() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(10, entry("b"));
        list.insert(10, entry("c"));

        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");
        // "a" removes itself while running.
        assert!(list.remove("a", 10));
        assert_eq!(list.next_entry(level).unwrap().id(), "b");
        assert_eq!(list.next_entry(level).unwrap().id(), "c");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
    }

    #[test]
    fn removing_pending_entry_mid_iteration_skips_only_it() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(10, entry("b"));
        list.insert(10, entry("c"));

        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");
        // "a" unregisters "b" before it runs.
        assert!(list.remove("b", 10));
        assert_eq!(list.next_entry(level).unwrap().id(), "c");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
    }

    #[test]
    fn emptied_bucket_regenerates_cursor_snapshots() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(20, entry("b"));
        list.insert(30, entry("c"));

        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");
        // Sole entry of bucket 20 removed before the cursor reaches it.
        assert!(list.remove("b", 20));
        assert_eq!(list.next_entry(level).unwrap().id(), "c");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
        assert_eq!(list.priorities(), vec![10, 30]);
    }

    #[test]
    fn emptying_the_current_bucket_moves_cursor_forward() {
        let mut list = HookList::new();
        list.insert(10, entry("only"));
        list.insert(20, entry("next"));

        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "only");
        // "only" removes itself; its bucket empties while current.
        assert!(list.remove("only", 10));
        assert_eq!(list.next_entry(level).unwrap().id(), "next");
        assert!(list.next_entry(level).is_none());
        list.end_iteration(level);
    }

    #[test]
    fn nested_iterations_have_independent_cursors() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(20, entry("b"));

        let outer = list.begin_iteration();
        assert_eq!(list.next_entry(outer).unwrap().id(), "a");

        // Re-entrant iteration started from within "a".
        let inner = list.begin_iteration();
        assert_eq!(drain(&mut list, inner), vec!["a", "b"]);
        list.end_iteration(inner);

        // The outer cursor resumes exactly where it was.
        assert_eq!(list.next_entry(outer).unwrap().id(), "b");
        assert!(list.next_entry(outer).is_none());
        list.end_iteration(outer);
    }

    #[test]
    fn wrap_entries_surrounds_and_remaps_live_cursor() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(10, entry("b"));

        let level = list.begin_iteration();
        assert_eq!(list.next_entry(level).unwrap().id(), "a");

        // Inject probes around every entry while "a" is mid-flight.
        list.wrap_entries(|_, e| {
            let id = e.id().to_string();
            Some((
                vec![HookEntry::probe(
                    format!("{id}::probe_start"),
                    EntryKind::ProbeStart,
                    Rc::new(|_: &crate::hook::HookRegistry, v: HookValue| v),
                )],
                vec![HookEntry::probe(
                    format!("{id}::probe_stop"),
                    EntryKind::ProbeStop,
                    Rc::new(|_: &crate::hook::HookRegistry, v: HookValue| v),
                )],
            ))
        });

        // "a" already ran, so its probes must not fire; "b" gets the full
        // probe bracket.
        assert_eq!(
            drain(&mut list, level),
            vec!["b::probe_start", "b", "b::probe_stop"]
        );
        list.end_iteration(level);
        assert_eq!(list.callback_count(), 2);
    }

    #[test]
    fn snapshot_reports_cursor_position() {
        let mut list = HookList::new();
        list.insert(10, entry("a"));
        list.insert(20, entry("b"));

        let level = list.begin_iteration();
        list.next_entry(level);
        let snap = list.iteration_snapshot(level).unwrap();
        assert_eq!(snap.current_priority, Some(10));
        assert_eq!(snap.entries_run, 1);
        assert_eq!(snap.remaining_priorities, vec![10, 20]);
        list.end_iteration(level);
        assert!(list.iteration_snapshot(level).is_none());
    }
}
