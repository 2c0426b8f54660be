//! Peer records as seen by the request surface.

/// A flooding neighbor, as supplied on peer add.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSpec {
    /// Unique within the area.
    pub peer_name: String,
    /// Opaque transport address, interpreted by the transport backend.
    pub endpoint: String,
    pub tls_identity: Option<String>,
}

impl PeerSpec {
    pub fn new(peer_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            peer_name: peer_name.into(),
            endpoint: endpoint.into(),
            tls_identity: None,
        }
    }
}

/// Where a peer is in its sync lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeerSyncState {
    #[default]
    Idle,
    Syncing,
    Established,
    Failed,
}

/// Peer record returned by `get_peers`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub spec: PeerSpec,
    pub sync_state: PeerSyncState,
}
