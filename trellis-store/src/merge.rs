//! The merge engine: applies an incoming batch against the value table.

use crate::table::ValueTable;
use std::collections::{HashMap, HashSet};
use trellis_model::{
    compare_values, KvFilters, NoMergeReason, NoMergeStats, Value, ValueOrdering, TTL_INFINITY,
};

/// The effective delta of a merge: exactly the entries that changed the
/// table. TTL-only refreshes are carried payload-stripped and marked.
#[derive(Debug, Default)]
pub struct MergeDelta {
    pub key_vals: HashMap<String, Value>,
    pub ttl_only_keys: HashSet<String>,
}

impl MergeDelta {
    pub fn is_empty(&self) -> bool {
        self.key_vals.is_empty()
    }
}

/// Merge a batch into the table under the comparison rule.
///
/// Every rejected key is categorized in the returned stats; rejection is
/// data, never an error. An entry that advances only `(ttl_ms, ttl_version)`
/// is updated in place (payload retained) and marked TTL-only in the delta.
pub fn merge_key_values(
    table: &mut ValueTable,
    key_vals: HashMap<String, Value>,
    filters: Option<&KvFilters>,
    min_ttl_ms: i64,
) -> (MergeDelta, NoMergeStats) {
    let mut delta = MergeDelta::default();
    let mut stats = NoMergeStats::default();

    for (key, incoming) in key_vals {
        if let Some(filters) = filters {
            if !filters.matches(&key, &incoming) {
                stats.record(&key, NoMergeReason::NoMatchedKey);
                continue;
            }
        }
        if incoming.ttl_ms != TTL_INFINITY && incoming.ttl_ms < min_ttl_ms {
            stats.record(&key, NoMergeReason::InvalidTtl(incoming.ttl_ms));
            continue;
        }
        if incoming.version == 0 {
            stats.record(&key, NoMergeReason::InvalidVersion);
            continue;
        }

        let Some(current) = table.get(&key) else {
            delta.key_vals.insert(key.clone(), incoming.clone());
            table.insert(key, incoming);
            continue;
        };

        match compare_values(&incoming, current) {
            ValueOrdering::FirstBetter => {
                // Same identity means the win came from the ttl version
                // alone; refresh in place and keep the stored payload.
                let ttl_only = incoming.version == current.version
                    && incoming.originator_id == current.originator_id
                    && incoming.hash == current.hash;
                if ttl_only {
                    let ttl_ms = incoming.ttl_ms;
                    let ttl_version = incoming.ttl_version;
                    if let Some(stored) = table.get_mut(&key) {
                        stored.ttl_ms = ttl_ms;
                        stored.ttl_version = ttl_version;
                        delta.key_vals.insert(key.clone(), stored.without_payload());
                    }
                    delta.ttl_only_keys.insert(key);
                } else {
                    delta.key_vals.insert(key.clone(), incoming.clone());
                    table.insert(key, incoming);
                }
            }
            ValueOrdering::SecondBetter => {
                stats.record(&key, NoMergeReason::OldVersion(incoming.version));
            }
            ValueOrdering::Equal => {
                stats.record(&key, NoMergeReason::NoNeedToUpdate);
            }
            ValueOrdering::Unknown => {
                stats.record(&key, NoMergeReason::UnknownComparison);
            }
        }
    }

    (delta, stats)
}
