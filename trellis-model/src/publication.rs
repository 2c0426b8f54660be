//! The publication: the unit exchanged between peers and delivered to
//! subscribers.

use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// A batch of key-values plus expirations for one area.
///
/// `ttl_only_keys` is a local delivery marker (never serialized): entries
/// whose merge advanced only the TTL metadata, so subscribers that asked to
/// ignore TTL-only churn can drop them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Publication {
    pub area_id: String,
    pub key_vals: HashMap<String, Value>,
    pub expired_keys: Vec<String>,
    pub timestamp_ms: Option<i64>,
    /// Nodes this publication has already visited, for flood-loop detection.
    pub node_ids: Option<Vec<String>>,
    pub ttl_only_keys: HashSet<String>,
}

impl Publication {
    pub fn new(area_id: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            ..Default::default()
        }
    }

    /// True when there is nothing to deliver or flood.
    pub fn is_empty(&self) -> bool {
        self.key_vals.is_empty() && self.expired_keys.is_empty()
    }

    /// True when every carried entry is a TTL-only refresh.
    pub fn is_ttl_only(&self) -> bool {
        !self.key_vals.is_empty()
            && self.expired_keys.is_empty()
            && self.key_vals.keys().all(|k| self.ttl_only_keys.contains(k))
    }
}
