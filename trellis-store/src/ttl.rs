//! TTL countdown: expiry scheduling and egress countdown adjustment.

use crate::table::ValueTable;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use trellis_model::{Publication, Value};

/// One scheduled expiry. Heap entries are never removed eagerly; stale ones
/// (superseded by a refresh or a newer value) are skipped on pop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtlEntry {
    pub deadline: Instant,
    pub key: String,
    pub version: u64,
    pub originator_id: String,
    pub ttl_version: u64,
}

impl Ord for TtlEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for TtlEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered queue of expiry deadlines for one area.
#[derive(Debug, Default)]
pub struct TtlCountdownQueue {
    heap: BinaryHeap<Reverse<TtlEntry>>,
    /// Live deadline per key, for egress countdown and stale-entry checks.
    deadlines: HashMap<String, Instant>,
}

impl TtlCountdownQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)schedule expiry for an accepted entry. Infinite-TTL values carry
    /// no deadline.
    pub fn schedule(&mut self, key: &str, value: &Value, now: Instant) {
        if value.is_ttl_infinite() {
            self.deadlines.remove(key);
            return;
        }
        let deadline = now + Duration::from_millis(value.ttl_ms.max(0) as u64);
        self.deadlines.insert(key.to_string(), deadline);
        self.heap.push(Reverse(TtlEntry {
            deadline,
            key: key.to_string(),
            version: value.version,
            originator_id: value.originator_id.clone(),
            ttl_version: value.ttl_version,
        }));
    }

    pub fn unschedule(&mut self, key: &str) {
        self.deadlines.remove(key);
    }

    /// Earliest deadline in the heap. May belong to a stale entry; the loop
    /// wakes, skips it, and re-arms.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Remaining countdown for a key, in milliseconds. Zero once overdue.
    pub fn remaining_ms(&self, key: &str, now: Instant) -> Option<i64> {
        self.deadlines
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(now).as_millis() as i64)
    }

    /// Pop every due entry that still matches the live table state.
    ///
    /// An entry fires only if the stored value still carries the same
    /// `(version, originator, ttl_version)` and the deadline was not
    /// superseded by a refresh.
    pub fn take_expired(&mut self, now: Instant, table: &ValueTable) -> Vec<String> {
        let mut expired = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.deadline > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            if self.deadlines.get(&entry.key) != Some(&entry.deadline) {
                continue;
            }
            let Some(stored) = table.get(&entry.key) else {
                self.deadlines.remove(&entry.key);
                continue;
            };
            if stored.version == entry.version
                && stored.originator_id == entry.originator_id
                && stored.ttl_version == entry.ttl_version
                && !stored.is_ttl_infinite()
            {
                self.deadlines.remove(&entry.key);
                expired.push(entry.key);
            }
        }
        expired
    }
}

/// Apply the egress countdown to an outgoing publication.
///
/// Each finite TTL becomes the remaining countdown minus the fixed
/// decrement; entries with nothing left after the decrement are omitted
/// entirely (the receiver relies on its own replica or its own expiry).
/// Infinite TTLs pass through unchanged.
pub fn update_publication_ttl(
    queue: &TtlCountdownQueue,
    ttl_decrement_ms: i64,
    publication: &mut Publication,
    now: Instant,
) {
    publication.key_vals.retain(|key, value| {
        if value.is_ttl_infinite() {
            return true;
        }
        match queue.remaining_ms(key, now) {
            Some(remaining) if remaining > ttl_decrement_ms => {
                value.ttl_ms = remaining - ttl_decrement_ms;
                true
            }
            _ => false,
        }
    });
    let kept: Vec<String> = publication
        .ttl_only_keys
        .iter()
        .filter(|k| publication.key_vals.contains_key(*k))
        .cloned()
        .collect();
    publication.ttl_only_keys = kept.into_iter().collect();
}
