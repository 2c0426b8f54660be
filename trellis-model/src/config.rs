//! Per-area store configuration.

use crate::{MIN_TTL_MS, TTL_DECREMENT_MS};
use std::time::Duration;

/// Configuration for one area's store. Plain data with sane defaults;
/// constructed once at startup and owned by the area actor.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// This node's id; used as originator for self-originated keys and for
    /// flood-loop accounting.
    pub node_id: String,
    /// Smallest acceptable finite TTL on incoming values.
    pub min_ttl_ms: i64,
    /// Fixed decrement applied to finite TTLs on egress.
    pub ttl_decrement_ms: i64,
    /// Per-attempt timeout for a full-sync exchange.
    pub sync_timeout: Duration,
    /// Consecutive send failures before a peer transitions to failed.
    pub max_send_failures: u32,
    /// Exponential backoff base for peer sync retries.
    pub retry_backoff_base: Duration,
    /// Backoff ceiling.
    pub retry_backoff_max: Duration,
    /// Sync attempts before a peer is left failed until re-added or
    /// reconnected.
    pub sync_retry_budget: u32,
    /// Bounded queue depth per subscriber; overflow cancels the subscriber.
    pub subscriber_queue_capacity: usize,
    /// Outbound flood queue depth per peer.
    pub flood_queue_capacity: usize,
    /// Elect spanning trees and restrict floods to tree edges.
    pub enable_flood_optimization: bool,
    /// Link cost advertised for each peer in spanning-tree election.
    pub default_link_cost: u64,
    /// Floor for the self-originated key refresh interval.
    pub self_refresh_floor: Duration,
    /// Consecutive protocol anomalies tolerated on one connection.
    pub max_protocol_anomalies: u32,
}

impl StoreConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            min_ttl_ms: MIN_TTL_MS,
            ttl_decrement_ms: TTL_DECREMENT_MS,
            sync_timeout: Duration::from_secs(10),
            max_send_failures: 3,
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_max: Duration::from_secs(60),
            sync_retry_budget: 8,
            subscriber_queue_capacity: 256,
            flood_queue_capacity: 1024,
            enable_flood_optimization: false,
            default_link_cost: 1,
            self_refresh_floor: Duration::from_secs(1),
            max_protocol_anomalies: 3,
        }
    }
}
