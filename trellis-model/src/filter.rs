//! Key/originator filters and their request-surface parameter form.

use crate::value::Value;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// Errors from filter construction.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid key regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}

/// How the key and originator predicates combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterOperator {
    #[default]
    Or,
    And,
}

/// Compiled filter: a set of anchored key regexes plus a set of originator
/// ids, joined by [`FilterOperator`]. An empty regex list matches every key;
/// an empty originator set matches every originator.
#[derive(Clone, Debug)]
pub struct KvFilters {
    key_regexes: Vec<Regex>,
    originator_ids: HashSet<String>,
    operator: FilterOperator,
}

impl KvFilters {
    pub fn new(
        key_patterns: Vec<String>,
        originator_ids: HashSet<String>,
        operator: FilterOperator,
    ) -> Result<Self, FilterError> {
        let mut key_regexes = Vec::with_capacity(key_patterns.len());
        for pattern in key_patterns {
            // Anchor at the start of the key; "key33" matches "key333".
            let anchored = if pattern.starts_with('^') {
                pattern.clone()
            } else {
                format!("^(?:{pattern})")
            };
            let regex = Regex::new(&anchored)
                .map_err(|source| FilterError::InvalidRegex { pattern, source })?;
            key_regexes.push(regex);
        }
        Ok(Self {
            key_regexes,
            originator_ids,
            operator,
        })
    }

    /// Filter that matches everything.
    pub fn match_all() -> Self {
        Self {
            key_regexes: Vec::new(),
            originator_ids: HashSet::new(),
            operator: FilterOperator::Or,
        }
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// Key-only predicate; empty regex list matches every key. Used for
    /// expired-key notifications where no value is available.
    pub fn key_pattern_match(&self, key: &str) -> bool {
        self.key_regexes.is_empty() || self.key_regexes.iter().any(|re| re.is_match(key))
    }

    fn originator_match(&self, value: &Value) -> bool {
        self.originator_ids.is_empty() || self.originator_ids.contains(&value.originator_id)
    }

    /// Full predicate over a `(key, value)` pair under the configured
    /// combinator.
    pub fn matches(&self, key: &str, value: &Value) -> bool {
        match self.operator {
            FilterOperator::Or => self.key_pattern_match(key) || self.originator_match(value),
            FilterOperator::And => self.key_pattern_match(key) && self.originator_match(value),
        }
    }
}

/// Filter parameters as they arrive on the request surface.
///
/// `prefix` is the deprecated single-prefix form; it is honored only when
/// `keys` is empty.
#[derive(Clone, Debug, Default)]
pub struct KeyDumpParams {
    pub prefix: String,
    pub keys: Vec<String>,
    pub originator_ids: HashSet<String>,
    pub oper: FilterOperator,
    /// Omit TTL-only deltas from the subscription stream.
    pub ignore_ttl: bool,
    /// Strip payloads from both the initial snapshot and the stream.
    pub do_not_publish_value: bool,
}

impl KeyDumpParams {
    /// Compile into [`KvFilters`]. `keys` wins over the legacy `prefix`.
    pub fn to_filters(&self) -> Result<KvFilters, FilterError> {
        let patterns = if !self.keys.is_empty() {
            self.keys.clone()
        } else if !self.prefix.is_empty() {
            vec![self.prefix.clone()]
        } else {
            Vec::new()
        };
        KvFilters::new(patterns, self.originator_ids.clone(), self.oper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_from(originator: &str) -> Value {
        Value::new(1, originator, b"v".to_vec(), 30_000, 1)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filters = KvFilters::match_all();
        assert!(filters.matches("any/key", &value_from("any-node")));
        assert!(filters.key_pattern_match("any/key"));
    }

    #[test]
    fn test_key_regex_is_anchored_at_start() {
        let filters =
            KvFilters::new(vec!["key33".into()], HashSet::new(), FilterOperator::Or).unwrap();
        assert!(filters.matches("key33", &value_from("n")));
        assert!(filters.matches("key333", &value_from("n")));
        assert!(!filters.matches("akey33", &value_from("n")));
    }

    #[test]
    fn test_and_requires_both() {
        let filters = KvFilters::new(
            vec!["key33".into()],
            ["node33".to_string()].into(),
            FilterOperator::And,
        )
        .unwrap();
        assert!(filters.matches("key333", &value_from("node33")));
        assert!(!filters.matches("key333", &value_from("node1")));
        assert!(!filters.matches("other", &value_from("node33")));
    }

    #[test]
    fn test_or_accepts_either() {
        let filters = KvFilters::new(
            vec!["key33".into()],
            ["node33".to_string()].into(),
            FilterOperator::Or,
        )
        .unwrap();
        assert!(filters.matches("key333", &value_from("node1")));
        assert!(filters.matches("other", &value_from("node33")));
        assert!(!filters.matches("other", &value_from("node1")));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let err = KvFilters::new(vec!["[".into()], HashSet::new(), FilterOperator::Or);
        assert!(err.is_err());
    }

    #[test]
    fn test_keys_win_over_legacy_prefix() {
        let params = KeyDumpParams {
            prefix: "legacy".into(),
            keys: vec!["modern".into()],
            ..Default::default()
        };
        let filters = params.to_filters().unwrap();
        assert!(filters.key_pattern_match("modern-key"));
        assert!(!filters.key_pattern_match("legacy-key"));
    }

    #[test]
    fn test_prefix_used_when_keys_absent() {
        let params = KeyDumpParams {
            prefix: "legacy".into(),
            ..Default::default()
        };
        let filters = params.to_filters().unwrap();
        assert!(filters.key_pattern_match("legacy-key"));
    }
}
