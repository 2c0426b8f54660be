//! Async handle over an area store's command channel.

use crate::area::{AreaSummary, StoreCmd};
use crate::publisher::PublicationFrame;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use trellis_flood::{FloodTopoSetParams, InboundEvent, SptInfos, SptMessage};
use trellis_model::{
    KeyDumpParams, NoMergeStats, PeerInfo, PeerSpec, Publication, RequestError, Value,
};

/// Cheap, cloneable entry point to one area's store. Every call marshals
/// onto the area loop and suspends until it replies.
#[derive(Clone)]
pub struct StoreHandle {
    area_id: String,
    cmd_tx: mpsc::Sender<StoreCmd>,
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl StoreHandle {
    pub(crate) fn new(
        area_id: String,
        cmd_tx: mpsc::Sender<StoreCmd>,
        inbound_tx: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            area_id,
            cmd_tx,
            inbound_tx,
        }
    }

    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    /// Channel for the flood listener to deliver inbound peer traffic.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundEvent> {
        self.inbound_tx.clone()
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> StoreCmd,
    ) -> Result<R, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| RequestError::Internal("area store unavailable".into()))?;
        rx.await
            .map_err(|_| RequestError::Internal("area store dropped the reply".into()))
    }

    /// Merge a batch of key-values as a local caller.
    pub async fn set_key_vals(
        &self,
        key_vals: HashMap<String, Value>,
    ) -> Result<NoMergeStats, RequestError> {
        self.request(|resp| StoreCmd::SetKeyVals { key_vals, resp })
            .await
    }

    /// Exact-match lookup.
    pub async fn get_key_vals(&self, keys: Vec<String>) -> Result<Publication, RequestError> {
        self.request(|resp| StoreCmd::GetKeyVals { keys, resp })
            .await
    }

    pub async fn dump_all(&self, params: KeyDumpParams) -> Result<Publication, RequestError> {
        self.request(|resp| StoreCmd::DumpAll { params, resp })
            .await?
    }

    pub async fn dump_hashes(&self, params: KeyDumpParams) -> Result<Publication, RequestError> {
        self.request(|resp| StoreCmd::DumpHashes { params, resp })
            .await?
    }

    pub async fn dump_difference(
        &self,
        key_vals: HashMap<String, Value>,
    ) -> Result<Publication, RequestError> {
        self.request(|resp| StoreCmd::DumpDifference { key_vals, resp })
            .await
    }

    /// Atomic snapshot-plus-stream subscription.
    pub async fn subscribe(
        &self,
        params: KeyDumpParams,
    ) -> Result<(Publication, ReceiverStream<PublicationFrame>), RequestError> {
        let (snapshot, rx) = self
            .request(|resp| StoreCmd::Subscribe { params, resp })
            .await??;
        Ok((snapshot, ReceiverStream::new(rx)))
    }

    pub async fn add_peer(&self, spec: PeerSpec) -> Result<(), RequestError> {
        self.request(|resp| StoreCmd::AddPeer { spec, resp }).await?
    }

    pub async fn del_peer(&self, peer_name: impl Into<String>) -> Result<(), RequestError> {
        let peer_name = peer_name.into();
        self.request(|resp| StoreCmd::DelPeer { peer_name, resp })
            .await?
    }

    pub async fn get_peers(&self) -> Result<HashMap<String, PeerInfo>, RequestError> {
        self.request(|resp| StoreCmd::GetPeers { resp }).await
    }

    /// Keep a key advertised under this node's originator id.
    pub async fn persist_key(
        &self,
        key: impl Into<String>,
        payload: Vec<u8>,
        ttl_ms: i64,
    ) -> Result<(), RequestError> {
        let key = key.into();
        self.request(|resp| StoreCmd::PersistKey {
            key,
            payload,
            ttl_ms,
            resp,
        })
        .await?
    }

    /// Stop advertising a key and invalidate it cluster-wide.
    pub async fn erase_key(&self, key: impl Into<String>) -> Result<(), RequestError> {
        let key = key.into();
        self.request(|resp| StoreCmd::EraseKey { key, resp }).await?
    }

    pub async fn process_dual_messages(
        &self,
        from: impl Into<String>,
        messages: Vec<SptMessage>,
    ) -> Result<(), RequestError> {
        let from = from.into();
        self.request(|resp| StoreCmd::ProcessDualMessages {
            from,
            messages,
            resp,
        })
        .await?
    }

    pub async fn update_flood_topology_child(
        &self,
        params: FloodTopoSetParams,
    ) -> Result<(), RequestError> {
        self.request(|resp| StoreCmd::UpdateFloodTopoChild { params, resp })
            .await?
    }

    pub async fn get_spanning_tree_infos(&self) -> Result<SptInfos, RequestError> {
        self.request(|resp| StoreCmd::GetSptInfos { resp }).await?
    }

    pub async fn get_summary(&self) -> Result<AreaSummary, RequestError> {
        self.request(|resp| StoreCmd::GetSummary { resp }).await
    }

    /// Stop the area loop. Idempotent; pending subscribers see their streams
    /// end.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(StoreCmd::Shutdown).await;
    }
}
