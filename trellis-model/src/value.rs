//! Versioned values and the deterministic comparison that drives convergence.

use crate::TTL_INFINITY;

/// A replicated value as stored in the value table and carried on the wire.
///
/// `payload` may be absent when only the hash travels (hash dumps, TTL-only
/// refreshes); `hash` is then authoritative for identity comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Value {
    /// Per-key version counter. Versions start at 1; 0 is reserved.
    pub version: u64,
    /// Node that produced this value. Tie-breaker and accounting identity.
    pub originator_id: String,
    pub payload: Option<Vec<u8>>,
    /// Remaining time-to-live at the moment of wire transfer, or
    /// [`TTL_INFINITY`].
    pub ttl_ms: i64,
    /// Advances on each keep-alive refresh that leaves the payload untouched.
    pub ttl_version: u64,
    /// Digest of `(version, originator_id, payload)`.
    pub hash: i64,
}

impl Value {
    /// Build a value with its hash computed from the identity fields.
    pub fn new(
        version: u64,
        originator_id: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        ttl_ms: i64,
        ttl_version: u64,
    ) -> Self {
        let originator_id = originator_id.into();
        let payload = payload.into();
        let hash = hash_value(version, &originator_id, Some(&payload));
        Self {
            version,
            originator_id,
            payload: Some(payload),
            ttl_ms,
            ttl_version,
            hash,
        }
    }

    /// Copy with the payload stripped; hash and all metadata retained.
    pub fn without_payload(&self) -> Self {
        Self {
            version: self.version,
            originator_id: self.originator_id.clone(),
            payload: None,
            ttl_ms: self.ttl_ms,
            ttl_version: self.ttl_version,
            hash: self.hash,
        }
    }

    pub fn is_ttl_infinite(&self) -> bool {
        self.ttl_ms == TTL_INFINITY
    }

    /// Recompute the hash from the current identity fields.
    pub fn rehash(&mut self) {
        self.hash = hash_value(self.version, &self.originator_id, self.payload.as_deref());
    }
}

/// Deterministic digest over `(version, originator_id, payload)`.
///
/// First eight bytes of the BLAKE3 digest, little-endian. Every replica
/// computes the same hash for the same identity, so hash dumps can stand in
/// for payloads during reconciliation.
pub fn hash_value(version: u64, originator_id: &str, payload: Option<&[u8]>) -> i64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&version.to_le_bytes());
    hasher.update(originator_id.as_bytes());
    if let Some(payload) = payload {
        hasher.update(payload);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}

/// Outcome of [`compare_values`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueOrdering {
    FirstBetter,
    SecondBetter,
    Equal,
    /// Not enough information to order: at least one payload is absent and
    /// the hashes differ.
    Unknown,
}

/// Decide which of two values is better to keep.
///
/// Comparators are applied strictly in lexicographic order, short-circuiting
/// on the first that differs: version, originator id, payload bytes, then
/// ttl version. When a payload is missing on either side the hash stands in:
/// equal hashes mean identical payloads and the comparison falls through to
/// the ttl version; differing hashes cannot be ordered and the result is
/// [`ValueOrdering::Unknown`].
pub fn compare_values(first: &Value, second: &Value) -> ValueOrdering {
    if first.version != second.version {
        return if first.version > second.version {
            ValueOrdering::FirstBetter
        } else {
            ValueOrdering::SecondBetter
        };
    }

    if first.originator_id != second.originator_id {
        return if first.originator_id > second.originator_id {
            ValueOrdering::FirstBetter
        } else {
            ValueOrdering::SecondBetter
        };
    }

    match (&first.payload, &second.payload) {
        (Some(a), Some(b)) => {
            if a != b {
                return if a > b {
                    ValueOrdering::FirstBetter
                } else {
                    ValueOrdering::SecondBetter
                };
            }
        }
        _ => {
            if first.hash != second.hash {
                return ValueOrdering::Unknown;
            }
        }
    }

    if first.ttl_version != second.ttl_version {
        return if first.ttl_version > second.ttl_version {
            ValueOrdering::FirstBetter
        } else {
            ValueOrdering::SecondBetter
        };
    }

    ValueOrdering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(version: u64, originator: &str, payload: &str) -> Value {
        Value::new(version, originator, payload.as_bytes().to_vec(), 30_000, 1)
    }

    #[test]
    fn test_higher_version_wins() {
        let a = value(1, "nodeA", "v1");
        let b = value(2, "nodeZ", "v2");
        assert_eq!(compare_values(&a, &b), ValueOrdering::SecondBetter);
        assert_eq!(compare_values(&b, &a), ValueOrdering::FirstBetter);
    }

    #[test]
    fn test_originator_tie_break_is_lexicographic() {
        let a = value(5, "nodeA", "vA");
        let b = value(5, "nodeB", "vB");
        assert_eq!(compare_values(&a, &b), ValueOrdering::SecondBetter);
        assert_eq!(compare_values(&b, &a), ValueOrdering::FirstBetter);
    }

    #[test]
    fn test_payload_bytes_break_ties() {
        let a = value(3, "node1", "aaa");
        let b = value(3, "node1", "bbb");
        assert_eq!(compare_values(&a, &b), ValueOrdering::SecondBetter);
    }

    #[test]
    fn test_equal_values_compare_equal() {
        let a = value(3, "node1", "same");
        let b = value(3, "node1", "same");
        assert_eq!(compare_values(&a, &b), ValueOrdering::Equal);
    }

    #[test]
    fn test_missing_payload_with_matching_hash_is_equal() {
        let full = value(3, "node1", "same");
        let stripped = full.without_payload();
        assert_eq!(compare_values(&full, &stripped), ValueOrdering::Equal);
        assert_eq!(compare_values(&stripped, &full), ValueOrdering::Equal);
    }

    #[test]
    fn test_missing_payload_with_matching_hash_falls_through_to_ttl_version() {
        let full = value(3, "node1", "same");
        let mut refreshed = full.without_payload();
        refreshed.ttl_version = 2;
        assert_eq!(compare_values(&refreshed, &full), ValueOrdering::FirstBetter);
    }

    #[test]
    fn test_both_payloads_missing_differing_hash_is_unknown() {
        let a = value(3, "node1", "left").without_payload();
        let b = value(3, "node1", "right").without_payload();
        assert_eq!(compare_values(&a, &b), ValueOrdering::Unknown);
    }

    #[test]
    fn test_one_payload_missing_differing_hash_is_unknown() {
        let a = value(3, "node1", "left");
        let b = value(3, "node1", "right").without_payload();
        assert_eq!(compare_values(&a, &b), ValueOrdering::Unknown);
    }

    #[test]
    fn test_hash_is_pure_function_of_identity() {
        let a = value(7, "node9", "payload");
        let b = value(7, "node9", "payload");
        assert_eq!(a.hash, b.hash);
        let c = value(8, "node9", "payload");
        assert_ne!(a.hash, c.hash);
    }
}
