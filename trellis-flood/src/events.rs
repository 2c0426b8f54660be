//! Events delivered from peer I/O tasks into the owning area's loop.

use crate::spt::SptMessage;
use std::collections::HashMap;
use tokio::sync::oneshot;
use trellis_model::{Publication, Value};

/// Responder's answer to a full-sync request: the values the initiator
/// needs, and the keys the responder wants full values for.
#[derive(Debug)]
pub struct SyncRequestReply {
    pub key_vals: HashMap<String, Value>,
    pub requested_keys: Vec<String>,
}

/// Peer lifecycle notifications from sender and sync tasks.
#[derive(Debug)]
pub enum PeerEvent {
    /// The sender task exhausted its consecutive-failure budget.
    SendExhausted { peer: String },
    SyncSucceeded { peer: String },
    SyncFailed { peer: String, reason: String },
}

/// Everything the listener and peer tasks feed into an area loop.
#[derive(Debug)]
pub enum InboundEvent {
    /// A flooded publication from an established peer.
    Publication {
        from: String,
        publication: Publication,
    },
    /// A peer started a full-sync against us; reply with our diff.
    SyncRequest {
        from: String,
        hash_dump: HashMap<String, Value>,
        resp: oneshot::Sender<SyncRequestReply>,
    },
    /// Mid-sync on the initiator side: merge the responder's values and
    /// produce full values for the keys it requested.
    SyncResponse {
        peer: String,
        key_vals: HashMap<String, Value>,
        requested_keys: Vec<String>,
        resp: oneshot::Sender<HashMap<String, Value>>,
    },
    /// Spanning-tree messages from a peer.
    Dual {
        from: String,
        messages: Vec<SptMessage>,
    },
    Peer(PeerEvent),
}
