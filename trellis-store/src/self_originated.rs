//! Self-originated key tracking: persistence and keep-alive refresh.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use trellis_model::TTL_INFINITY;

/// A key this node keeps advertised: re-advertised above any competing
/// value, refreshed before its TTL runs out.
#[derive(Clone, Debug)]
pub struct PersistedKey {
    pub payload: Vec<u8>,
    pub ttl_ms: i64,
}

/// Tracks which keys this node originates and when each needs its next
/// ttl-version bump.
#[derive(Debug, Default)]
pub struct SelfOriginated {
    persisted: HashMap<String, PersistedKey>,
    refresh_at: HashMap<String, Instant>,
}

impl SelfOriginated {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist(&mut self, key: String, payload: Vec<u8>, ttl_ms: i64) {
        self.persisted.insert(key, PersistedKey { payload, ttl_ms });
    }

    pub fn unpersist(&mut self, key: &str) -> bool {
        self.persisted.remove(key).is_some()
    }

    pub fn persisted(&self, key: &str) -> Option<&PersistedKey> {
        self.persisted.get(key)
    }

    /// Schedule the next keep-alive at a quarter of the advertised TTL,
    /// floored, so downstream replicas never expire a live key. The floor
    /// never pushes the refresh past three quarters of the TTL itself.
    pub fn schedule_refresh(&mut self, key: &str, ttl_ms: i64, now: Instant, floor: Duration) {
        if ttl_ms == TTL_INFINITY {
            self.refresh_at.remove(key);
            return;
        }
        let ttl = Duration::from_millis(ttl_ms.max(0) as u64);
        let interval = (ttl / 4).max(floor).min(ttl * 3 / 4);
        self.refresh_at.insert(key.to_string(), now + interval);
    }

    pub fn cancel_refresh(&mut self, key: &str) {
        self.refresh_at.remove(key);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.refresh_at.values().min().copied()
    }

    /// Remove and return every key whose refresh deadline has passed.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let due: Vec<String> = self
            .refresh_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.refresh_at.remove(key);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_interval_is_quarter_ttl_with_floor() {
        let mut state = SelfOriginated::new();
        let now = Instant::now();
        let floor = Duration::from_secs(1);

        state.schedule_refresh("big", 40_000, now, floor);
        let deadline = state.next_deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_secs(10));

        // A tiny TTL refreshes before it can expire, floor notwithstanding.
        state.cancel_refresh("big");
        state.schedule_refresh("small", 100, now, floor);
        assert_eq!(
            state.next_deadline().unwrap(),
            now + Duration::from_millis(75)
        );

        // A mid-sized TTL sits on the floor.
        state.cancel_refresh("small");
        state.schedule_refresh("mid", 2_000, now, floor);
        assert_eq!(state.next_deadline().unwrap(), now + floor);
    }

    #[test]
    fn test_infinite_ttl_needs_no_refresh() {
        let mut state = SelfOriginated::new();
        state.schedule_refresh("k", TTL_INFINITY, Instant::now(), Duration::from_secs(1));
        assert!(state.next_deadline().is_none());
    }

    #[test]
    fn test_due_drains_expired_deadlines() {
        let mut state = SelfOriginated::new();
        let now = Instant::now();
        state.schedule_refresh("a", 4, now - Duration::from_secs(10), Duration::from_secs(1));
        state.schedule_refresh("b", 4_000_000, now, Duration::from_secs(1));

        let due = state.due(now);
        assert_eq!(due, vec!["a".to_string()]);
        assert!(state.due(now).is_empty());
        assert!(state.next_deadline().is_some());
    }

    #[test]
    fn test_persist_roundtrip() {
        let mut state = SelfOriginated::new();
        state.persist("k".into(), b"payload".to_vec(), 30_000);
        assert_eq!(state.persisted("k").unwrap().ttl_ms, 30_000);
        assert!(state.unpersist("k"));
        assert!(!state.unpersist("k"));
        assert!(state.persisted("k").is_none());
    }
}
