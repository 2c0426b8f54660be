//! Merge-rejection reasons and their per-batch / cumulative statistics.
//!
//! A rejected merge is data, not an error: every skipped key is categorized
//! so the daemon can explain why a replica refused an update.

use std::collections::HashMap;

/// Why an incoming key-value was not merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoMergeReason {
    /// The key did not match the supplied filter.
    NoMatchedKey,
    /// Finite TTL below the configured floor; carries the observed TTL.
    InvalidTtl(i64),
    /// Version 0 is reserved and never valid on the wire.
    InvalidVersion,
    /// The stored value is strictly better; carries the stale version seen.
    OldVersion(u64),
    /// Identical to the stored value with no TTL advance.
    NoNeedToUpdate,
    /// Comparison returned unknown (payload absent, hashes differ).
    UnknownComparison,
}

/// Per-batch report returned alongside the effective delta of a merge.
#[derive(Clone, Debug, Default)]
pub struct NoMergeStats {
    pub no_matched_keys: u32,
    pub invalid_ttls: Vec<i64>,
    pub invalid_versions: u32,
    pub old_versions: Vec<u64>,
    pub no_need_to_updates: u32,
    pub unknown_comparisons: u32,
    /// Per-key reason map for the whole batch.
    pub reasons: HashMap<String, NoMergeReason>,
}

impl NoMergeStats {
    pub fn record(&mut self, key: &str, reason: NoMergeReason) {
        match &reason {
            NoMergeReason::NoMatchedKey => self.no_matched_keys += 1,
            NoMergeReason::InvalidTtl(ttl) => self.invalid_ttls.push(*ttl),
            NoMergeReason::InvalidVersion => self.invalid_versions += 1,
            NoMergeReason::OldVersion(version) => self.old_versions.push(*version),
            NoMergeReason::NoNeedToUpdate => self.no_need_to_updates += 1,
            NoMergeReason::UnknownComparison => self.unknown_comparisons += 1,
        }
        self.reasons.insert(key.to_string(), reason);
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Cumulative per-area counters, accumulated across merges for the area
/// summary surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeCounters {
    pub no_matched_keys: u64,
    pub invalid_ttls: u64,
    pub invalid_versions: u64,
    pub old_versions: u64,
    pub no_need_to_updates: u64,
    pub unknown_comparisons: u64,
    /// Publications dropped because the sender is not a known peer.
    pub unauthorized_publications: u64,
    /// Inbound frames that failed to decode or carried an unknown message.
    pub protocol_anomalies: u64,
}

impl MergeCounters {
    pub fn absorb(&mut self, stats: &NoMergeStats) {
        self.no_matched_keys += u64::from(stats.no_matched_keys);
        self.invalid_ttls += stats.invalid_ttls.len() as u64;
        self.invalid_versions += u64::from(stats.invalid_versions);
        self.old_versions += stats.old_versions.len() as u64;
        self.no_need_to_updates += u64::from(stats.no_need_to_updates);
        self.unknown_comparisons += u64::from(stats.unknown_comparisons);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_categorizes_and_maps() {
        let mut stats = NoMergeStats::default();
        stats.record("k1", NoMergeReason::InvalidTtl(0));
        stats.record("k2", NoMergeReason::OldVersion(3));
        stats.record("k3", NoMergeReason::NoNeedToUpdate);

        assert_eq!(stats.invalid_ttls, vec![0]);
        assert_eq!(stats.old_versions, vec![3]);
        assert_eq!(stats.no_need_to_updates, 1);
        assert_eq!(stats.reasons.len(), 3);
        assert_eq!(stats.reasons["k2"], NoMergeReason::OldVersion(3));
    }

    #[test]
    fn test_counters_absorb_batch_stats() {
        let mut stats = NoMergeStats::default();
        stats.record("a", NoMergeReason::InvalidTtl(-5));
        stats.record("b", NoMergeReason::UnknownComparison);

        let mut counters = MergeCounters::default();
        counters.absorb(&stats);
        counters.absorb(&stats);
        assert_eq!(counters.invalid_ttls, 2);
        assert_eq!(counters.unknown_comparisons, 2);
    }
}
