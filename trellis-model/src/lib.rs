//! Core data model for the Trellis KV dissemination substrate.
//!
//! Pure types shared by every other crate: versioned values and their
//! deterministic comparison, key/originator filters, merge-rejection
//! statistics, publications, peer records, configuration, and the
//! request-surface error taxonomy. Nothing here does I/O.

pub mod config;
pub mod error;
pub mod filter;
pub mod peer;
pub mod publication;
pub mod stats;
pub mod value;

pub use config::StoreConfig;
pub use error::RequestError;
pub use filter::{FilterError, FilterOperator, KeyDumpParams, KvFilters};
pub use peer::{PeerInfo, PeerSpec, PeerSyncState};
pub use publication::Publication;
pub use stats::{MergeCounters, NoMergeReason, NoMergeStats};
pub use value::{compare_values, hash_value, Value, ValueOrdering};

/// TTL sentinel meaning "never expires". Matches the legacy wire convention.
pub const TTL_INFINITY: i64 = i32::MIN as i64;

/// Smallest acceptable finite TTL on an incoming value, in milliseconds.
pub const MIN_TTL_MS: i64 = 1;

/// Fixed decrement applied to every finite TTL on egress, in milliseconds.
/// Guarantees forward progress so a value cannot circulate forever.
pub const TTL_DECREMENT_MS: i64 = 1;
