//! The per-area value table and its dump operations.

use std::collections::HashMap;
use trellis_model::{compare_values, KvFilters, Value, ValueOrdering};

/// Authoritative key → value mapping for one area. Soft state: populated by
/// merges, trimmed by TTL expiry, never persisted.
#[derive(Debug, Default)]
pub struct ValueTable {
    entries: HashMap<String, Value>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Exact-match lookup of a set of keys (no regex).
    pub fn get_key_vals(&self, keys: &[String]) -> HashMap<String, Value> {
        keys.iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Entries matching the filter, optionally with payloads stripped.
    pub fn dump_all(&self, filters: &KvFilters, strip_payload: bool) -> HashMap<String, Value> {
        self.entries
            .iter()
            .filter(|(key, value)| filters.matches(key, value))
            .map(|(key, value)| {
                let value = if strip_payload {
                    value.without_payload()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Entries matching the filter with payloads stripped, hashes retained.
    pub fn dump_hashes(&self, filters: &KvFilters) -> HashMap<String, Value> {
        self.dump_all(filters, true)
    }

    /// Local entries the requester is missing or holds a different hash for.
    ///
    /// Never includes a key for which the requester's copy is strictly
    /// better under the comparison rule.
    pub fn dump_difference(&self, their: &HashMap<String, Value>) -> HashMap<String, Value> {
        self.entries
            .iter()
            .filter(|(key, mine)| match their.get(*key) {
                None => true,
                Some(theirs) => {
                    mine.hash != theirs.hash
                        && compare_values(mine, theirs) != ValueOrdering::SecondBetter
                }
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Keys from a peer's hash dump we want full values for: locally missing,
    /// or where the peer's copy is better or cannot be ordered.
    pub fn keys_to_request(&self, their: &HashMap<String, Value>) -> Vec<String> {
        their
            .iter()
            .filter(|(key, theirs)| match self.entries.get(*key) {
                None => true,
                Some(mine) => matches!(
                    compare_values(mine, theirs),
                    ValueOrdering::SecondBetter | ValueOrdering::Unknown
                ),
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use trellis_model::FilterOperator;

    fn value(version: u64, originator: &str, payload: &str) -> Value {
        Value::new(version, originator, payload.as_bytes().to_vec(), 30_000, 1)
    }

    fn table_with(entries: &[(&str, Value)]) -> ValueTable {
        let mut table = ValueTable::new();
        for (key, value) in entries {
            table.insert(key.to_string(), value.clone());
        }
        table
    }

    #[test]
    fn test_get_key_vals_is_exact_match() {
        let table = table_with(&[("key1", value(1, "n", "v1")), ("key10", value(1, "n", "v2"))]);
        let got = table.get_key_vals(&["key1".to_string()]);
        assert_eq!(got.len(), 1);
        assert!(got.contains_key("key1"));
    }

    #[test]
    fn test_dump_hashes_strips_payload_keeps_hash() {
        let table = table_with(&[
            ("key3", value(1, "node3", "v3")),
            ("key33", value(1, "node3", "v33")),
            ("key333", value(1, "node3", "v333")),
            ("other", value(1, "node9", "vx")),
        ]);
        let filters = KvFilters::new(
            vec!["key3".into()],
            ["node3".to_string()].into_iter().collect::<HashSet<_>>(),
            FilterOperator::Or,
        )
        .unwrap();
        let dump = table.dump_hashes(&filters);
        assert_eq!(dump.len(), 3);
        for value in dump.values() {
            assert!(value.payload.is_none());
            assert_ne!(value.hash, 0);
            assert_ne!(value.version, 0);
        }
    }

    #[test]
    fn test_dump_difference_includes_local_only_and_hash_mismatch() {
        let table = table_with(&[
            ("mine-only", value(1, "n", "v")),
            ("same", value(2, "n", "same")),
            ("newer-here", value(5, "n", "v5")),
        ]);

        let mut their = HashMap::new();
        their.insert("same".to_string(), value(2, "n", "same").without_payload());
        their.insert("newer-here".to_string(), value(3, "n", "v3").without_payload());

        let diff = table.dump_difference(&their);
        assert!(diff.contains_key("mine-only"));
        assert!(diff.contains_key("newer-here"));
        assert!(!diff.contains_key("same"));
    }

    #[test]
    fn test_dump_difference_never_offers_when_theirs_is_better() {
        let table = table_with(&[("k", value(2, "n", "old"))]);
        let mut their = HashMap::new();
        their.insert("k".to_string(), value(7, "n", "new").without_payload());

        let diff = table.dump_difference(&their);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_keys_to_request_covers_missing_better_and_unknown() {
        let table = table_with(&[
            ("stale-here", value(1, "n", "v1")),
            ("fresh-here", value(9, "n", "v9")),
            ("fuzzy", value(3, "n", "left").without_payload()),
        ]);

        let mut their = HashMap::new();
        their.insert("stale-here".to_string(), value(4, "n", "v4").without_payload());
        their.insert("fresh-here".to_string(), value(2, "n", "v2").without_payload());
        their.insert("missing-here".to_string(), value(1, "n", "v").without_payload());
        their.insert("fuzzy".to_string(), value(3, "n", "right").without_payload());

        let mut requested = table.keys_to_request(&their);
        requested.sort();
        assert_eq!(
            requested,
            vec![
                "fuzzy".to_string(),
                "missing-here".to_string(),
                "stale-here".to_string()
            ]
        );
    }
}
