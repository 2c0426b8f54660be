//! Area registry and the remote-callable request surface.

use crate::handle::StoreHandle;
use crate::publisher::PublicationFrame;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamMap};
use trellis_flood::{FloodTopoSetParams, InboundEvent, InboundRouter, SptInfos, SptMessage};
use trellis_model::{KeyDumpParams, PeerInfo, PeerSpec, Publication, RequestError, Value};

/// Maps area id → store handle. Built once at startup, immutable after;
/// there is no other process-wide mutable state.
#[derive(Clone, Default)]
pub struct AreaRegistry {
    areas: HashMap<String, StoreHandle>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an area during startup, before the registry is shared.
    pub fn insert(&mut self, handle: StoreHandle) {
        self.areas.insert(handle.area_id().to_string(), handle);
    }

    pub fn get(&self, area_id: &str) -> Result<&StoreHandle, RequestError> {
        self.areas
            .get(area_id)
            .ok_or_else(|| RequestError::UnknownArea(area_id.to_string()))
    }

    pub fn area_ids(&self) -> Vec<String> {
        self.areas.keys().cloned().collect()
    }

    pub fn handles(&self) -> impl Iterator<Item = &StoreHandle> {
        self.areas.values()
    }
}

impl InboundRouter for AreaRegistry {
    fn route(&self, area_id: &str) -> Option<mpsc::Sender<InboundEvent>> {
        self.areas.get(area_id).map(|h| h.inbound_sender())
    }
}

/// Parameters for a key-value set on the request surface.
#[derive(Clone, Debug, Default)]
pub struct KeySetParams {
    pub key_vals: HashMap<String, Value>,
    pub timestamp_ms: Option<i64>,
}

/// Merged subscription stream over one or more areas.
pub struct AreaSubscription {
    streams: StreamMap<String, ReceiverStream<PublicationFrame>>,
}

impl Stream for AreaSubscription {
    type Item = PublicationFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.streams)
            .poll_next(cx)
            .map(|item| item.map(|(_, frame)| frame))
    }
}

/// The remote-callable request surface: one instance per host, serving every
/// area through the registry.
#[derive(Clone)]
pub struct KvStoreService {
    registry: Arc<AreaRegistry>,
}

impl KvStoreService {
    pub fn new(registry: Arc<AreaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AreaRegistry> {
        &self.registry
    }

    pub async fn set_kv_store_key_vals(
        &self,
        params: KeySetParams,
        area: &str,
    ) -> Result<(), RequestError> {
        let handle = self.registry.get(area)?;
        handle.set_key_vals(params.key_vals).await?;
        Ok(())
    }

    pub async fn get_kv_store_key_vals_area(
        &self,
        keys: Vec<String>,
        area: &str,
    ) -> Result<Publication, RequestError> {
        self.registry.get(area)?.get_key_vals(keys).await
    }

    pub async fn get_kv_store_key_vals_filtered_area(
        &self,
        params: KeyDumpParams,
        area: &str,
    ) -> Result<Publication, RequestError> {
        self.registry.get(area)?.dump_all(params).await
    }

    pub async fn get_kv_store_hash_filtered_area(
        &self,
        params: KeyDumpParams,
        area: &str,
    ) -> Result<Publication, RequestError> {
        self.registry.get(area)?.dump_hashes(params).await
    }

    pub async fn get_kv_store_peers_area(
        &self,
        area: &str,
    ) -> Result<HashMap<String, PeerInfo>, RequestError> {
        self.registry.get(area)?.get_peers().await
    }

    pub async fn add_kv_store_peer(
        &self,
        spec: PeerSpec,
        area: &str,
    ) -> Result<(), RequestError> {
        self.registry.get(area)?.add_peer(spec).await
    }

    pub async fn del_kv_store_peer(
        &self,
        peer_name: &str,
        area: &str,
    ) -> Result<(), RequestError> {
        self.registry.get(area)?.del_peer(peer_name).await
    }

    /// Spanning-tree messages reported by neighbor `from`.
    pub async fn process_kv_store_dual_message(
        &self,
        from: &str,
        messages: Vec<SptMessage>,
        area: &str,
    ) -> Result<(), RequestError> {
        self.registry
            .get(area)?
            .process_dual_messages(from, messages)
            .await
    }

    pub async fn update_flood_topology_child(
        &self,
        params: FloodTopoSetParams,
        area: &str,
    ) -> Result<(), RequestError> {
        self.registry
            .get(area)?
            .update_flood_topology_child(params)
            .await
    }

    pub async fn get_spanning_tree_infos(&self, area: &str) -> Result<SptInfos, RequestError> {
        self.registry.get(area)?.get_spanning_tree_infos().await
    }

    /// Subscribe to a set of areas: one initial snapshot per requested area
    /// (in request order), then a merged stream of matching deltas.
    pub async fn subscribe_and_get_area_kv_stores(
        &self,
        params: KeyDumpParams,
        areas: Vec<String>,
    ) -> Result<(Vec<Publication>, AreaSubscription), RequestError> {
        let mut initial_responses = Vec::with_capacity(areas.len());
        let mut streams = StreamMap::new();
        for area in areas {
            let handle = self.registry.get(&area)?;
            let (snapshot, stream) = handle.subscribe(params.clone()).await?;
            initial_responses.push(snapshot);
            streams.insert(area, stream);
        }
        Ok((initial_responses, AreaSubscription { streams }))
    }
}
