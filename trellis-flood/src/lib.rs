//! Flooding, peer sync, and spanning-tree election for Trellis.
//!
//! The area store owns the state; this crate provides the peer lifecycle
//! (sync state machine, retry backoff), the flooder (per-peer sender tasks,
//! target selection), the full-sync exchange, the inbound listener, and the
//! DUAL-style spanning-tree module.

pub mod events;
pub mod flooder;
pub mod listener;
pub mod peer;
pub mod spt;
pub mod sync;

pub use events::{InboundEvent, PeerEvent, SyncRequestReply};
pub use flooder::{select_flood_targets, spawn_peer_sender};
pub use listener::{spawn_listener, InboundRouter};
pub use peer::{Backoff, PeerSet, PeerState};
pub use spt::{
    FloodTopoSetParams, SptDelta, SptInfo, SptInfos, SptMessage, SptState, DISTANCE_INFINITY,
};
pub use sync::spawn_full_sync;
