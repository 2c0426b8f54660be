//! The per-area store actor.
//!
//! One single-threaded cooperative loop per area: merges, TTL firings,
//! self-refresh, peer events, and subscriber fan-out all run serialized
//! here, which makes every table mutation linearizable without locks. Peer
//! I/O and sync exchanges run in spawned tasks and report back through the
//! inbound event channel.

use crate::merge::{merge_key_values, MergeDelta};
use crate::publisher::{PublicationFrame, PublisherRegistry};
use crate::self_originated::SelfOriginated;
use crate::table::ValueTable;
use crate::ttl::{update_publication_ttl, TtlCountdownQueue};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use trellis_flood::{
    select_flood_targets, spawn_full_sync, spawn_peer_sender, FloodTopoSetParams, InboundEvent,
    PeerEvent, PeerSet, PeerState, SptDelta, SptInfos, SptMessage, SptState, SyncRequestReply,
};
use trellis_model::{
    KeyDumpParams, KvFilters, MergeCounters, NoMergeStats, PeerInfo, PeerSpec, PeerSyncState,
    Publication, RequestError, StoreConfig, Value,
};
use trellis_net::Transport;
use trellis_proto::{DualMessages, PeerMessage};

/// TTL advertised when a key is self-invalidated: long enough to flood,
/// short enough to vanish everywhere promptly.
const ERASE_TTL_MS: i64 = 256;

/// Commands from the request surface, marshalled onto the area loop.
pub enum StoreCmd {
    SetKeyVals {
        key_vals: HashMap<String, Value>,
        resp: oneshot::Sender<NoMergeStats>,
    },
    GetKeyVals {
        keys: Vec<String>,
        resp: oneshot::Sender<Publication>,
    },
    DumpAll {
        params: KeyDumpParams,
        resp: oneshot::Sender<Result<Publication, RequestError>>,
    },
    DumpHashes {
        params: KeyDumpParams,
        resp: oneshot::Sender<Result<Publication, RequestError>>,
    },
    DumpDifference {
        key_vals: HashMap<String, Value>,
        resp: oneshot::Sender<Publication>,
    },
    Subscribe {
        params: KeyDumpParams,
        resp: oneshot::Sender<
            Result<(Publication, mpsc::Receiver<PublicationFrame>), RequestError>,
        >,
    },
    AddPeer {
        spec: PeerSpec,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    DelPeer {
        peer_name: String,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    GetPeers {
        resp: oneshot::Sender<HashMap<String, PeerInfo>>,
    },
    PersistKey {
        key: String,
        payload: Vec<u8>,
        ttl_ms: i64,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    EraseKey {
        key: String,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    ProcessDualMessages {
        from: String,
        messages: Vec<SptMessage>,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    UpdateFloodTopoChild {
        params: FloodTopoSetParams,
        resp: oneshot::Sender<Result<(), RequestError>>,
    },
    GetSptInfos {
        resp: oneshot::Sender<Result<SptInfos, RequestError>>,
    },
    GetSummary {
        resp: oneshot::Sender<AreaSummary>,
    },
    Shutdown,
}

/// Observability snapshot for one area.
#[derive(Clone, Debug)]
pub struct AreaSummary {
    pub area_id: String,
    pub key_count: usize,
    pub peer_count: usize,
    pub subscriber_count: usize,
    pub counters: MergeCounters,
}

/// One area's store: value table, merge engine, TTL scheduler, peers,
/// flooder plumbing, spanning tree, and subscriber registry.
pub struct Store<T: Transport> {
    area_id: String,
    config: StoreConfig,
    transport: T,
    inbound_tx: mpsc::Sender<InboundEvent>,
    table: ValueTable,
    ttl_queue: TtlCountdownQueue,
    refresh: SelfOriginated,
    publishers: PublisherRegistry,
    peers: PeerSet,
    spt: Option<SptState>,
    counters: MergeCounters,
}

impl<T: Transport> Store<T> {
    /// Spawn the area loop; the returned handle is the only way in.
    pub fn spawn(
        area_id: impl Into<String>,
        config: StoreConfig,
        transport: T,
    ) -> crate::handle::StoreHandle {
        let area_id = area_id.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let spt = config
            .enable_flood_optimization
            .then(|| SptState::new(config.node_id.clone()));
        let store = Store {
            publishers: PublisherRegistry::new(area_id.clone(), config.subscriber_queue_capacity),
            area_id: area_id.clone(),
            transport,
            inbound_tx: inbound_tx.clone(),
            table: ValueTable::new(),
            ttl_queue: TtlCountdownQueue::new(),
            refresh: SelfOriginated::new(),
            peers: PeerSet::new(),
            spt,
            counters: MergeCounters::default(),
            config,
        };
        tokio::spawn(store.run(cmd_rx, inbound_rx));
        crate::handle::StoreHandle::new(area_id, cmd_tx, inbound_tx)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<StoreCmd>,
        mut inbound_rx: mpsc::Receiver<InboundEvent>,
    ) {
        tracing::info!(area = %self.area_id, node = %self.config.node_id, "area store started");
        loop {
            let ttl_deadline = self.ttl_queue.next_deadline();
            let refresh_deadline = self.refresh.next_deadline();
            let retry_deadline = self.peers.next_retry_deadline();

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(StoreCmd::Shutdown) | None => break,
                    Some(cmd) => self.handle_cmd(cmd),
                },
                event = inbound_rx.recv() => match event {
                    Some(event) => self.handle_inbound(event),
                    None => break,
                },
                _ = sleep_until(ttl_deadline.unwrap_or_else(far_future)),
                    if ttl_deadline.is_some() => self.handle_ttl_expiry(),
                _ = sleep_until(refresh_deadline.unwrap_or_else(far_future)),
                    if refresh_deadline.is_some() => self.handle_self_refresh(),
                _ = sleep_until(retry_deadline.unwrap_or_else(far_future)),
                    if retry_deadline.is_some() => self.handle_sync_retries(),
            }
        }
        tracing::info!(area = %self.area_id, "area store stopped");
    }

    // ==================== Command dispatch ====================

    fn handle_cmd(&mut self, cmd: StoreCmd) {
        match cmd {
            StoreCmd::SetKeyVals { key_vals, resp } => {
                let stats = self.apply_merge(key_vals, None, None);
                let _ = resp.send(stats);
            }
            StoreCmd::GetKeyVals { keys, resp } => {
                let publication = self.finalize_dump(self.table.get_key_vals(&keys));
                let _ = resp.send(publication);
            }
            StoreCmd::DumpAll { params, resp } => {
                let _ = resp.send(self.handle_dump(&params, params.do_not_publish_value));
            }
            StoreCmd::DumpHashes { params, resp } => {
                let _ = resp.send(self.handle_dump(&params, true));
            }
            StoreCmd::DumpDifference { key_vals, resp } => {
                let publication = self.finalize_dump(self.table.dump_difference(&key_vals));
                let _ = resp.send(publication);
            }
            StoreCmd::Subscribe { params, resp } => {
                let _ = resp.send(self.handle_subscribe(params));
            }
            StoreCmd::AddPeer { spec, resp } => {
                let _ = resp.send(self.handle_add_peer(spec));
            }
            StoreCmd::DelPeer { peer_name, resp } => {
                let _ = resp.send(self.handle_del_peer(&peer_name));
            }
            StoreCmd::GetPeers { resp } => {
                let _ = resp.send(self.peers.infos());
            }
            StoreCmd::PersistKey {
                key,
                payload,
                ttl_ms,
                resp,
            } => {
                let _ = resp.send(self.handle_persist_key(key, payload, ttl_ms));
            }
            StoreCmd::EraseKey { key, resp } => {
                let _ = resp.send(self.handle_erase_key(key));
            }
            StoreCmd::ProcessDualMessages {
                from,
                messages,
                resp,
            } => {
                let _ = resp.send(self.process_dual(&from, messages));
            }
            StoreCmd::UpdateFloodTopoChild { params, resp } => {
                let result = match self.spt.as_mut() {
                    Some(spt) => {
                        spt.set_child(&params);
                        Ok(())
                    }
                    None => Err(RequestError::ModuleUnavailable("spanning-tree".into())),
                };
                let _ = resp.send(result);
            }
            StoreCmd::GetSptInfos { resp } => {
                let result = match self.spt.as_ref() {
                    Some(spt) => Ok(spt.infos()),
                    None => Err(RequestError::ModuleUnavailable("spanning-tree".into())),
                };
                let _ = resp.send(result);
            }
            StoreCmd::GetSummary { resp } => {
                let _ = resp.send(AreaSummary {
                    area_id: self.area_id.clone(),
                    key_count: self.table.len(),
                    peer_count: self.peers.len(),
                    subscriber_count: self.publishers.len(),
                    counters: self.counters,
                });
            }
            StoreCmd::Shutdown => {}
        }
    }

    fn handle_dump(
        &self,
        params: &KeyDumpParams,
        strip_payload: bool,
    ) -> Result<Publication, RequestError> {
        let filters = params.to_filters()?;
        Ok(self.finalize_dump(self.table.dump_all(&filters, strip_payload)))
    }

    fn handle_subscribe(
        &mut self,
        params: KeyDumpParams,
    ) -> Result<(Publication, mpsc::Receiver<PublicationFrame>), RequestError> {
        let filters = params.to_filters()?;
        // Snapshot and registration happen in this one loop turn, so the
        // stream starts at exactly the next committed delta.
        let snapshot =
            self.finalize_dump(self.table.dump_all(&filters, params.do_not_publish_value));
        let rx = self
            .publishers
            .subscribe(filters, params.do_not_publish_value, params.ignore_ttl);
        Ok((snapshot, rx))
    }

    // ==================== Inbound events ====================

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Publication { from, publication } => {
                if !self.peers.contains(&from) {
                    self.counters.unauthorized_publications += 1;
                    tracing::warn!(area = %self.area_id, from = %from, "publication from unknown peer dropped");
                    return;
                }
                if publication
                    .node_ids
                    .as_ref()
                    .is_some_and(|ids| ids.contains(&self.config.node_id))
                {
                    tracing::debug!(area = %self.area_id, from = %from, "flood loop detected, dropping");
                    return;
                }
                let node_ids = publication.node_ids.clone();
                self.apply_merge(publication.key_vals, Some(&from), node_ids);
            }
            InboundEvent::SyncRequest {
                from,
                hash_dump,
                resp,
            } => {
                if !self.peers.contains(&from) {
                    self.counters.unauthorized_publications += 1;
                    tracing::warn!(area = %self.area_id, from = %from, "sync request from unknown peer refused");
                    return;
                }
                let diff = self.finalize_dump(self.table.dump_difference(&hash_dump));
                let requested_keys = self.table.keys_to_request(&hash_dump);
                tracing::debug!(
                    area = %self.area_id,
                    from = %from,
                    offering = diff.key_vals.len(),
                    requesting = requested_keys.len(),
                    "answering full sync"
                );
                let _ = resp.send(SyncRequestReply {
                    key_vals: diff.key_vals,
                    requested_keys,
                });
            }
            InboundEvent::SyncResponse {
                peer,
                key_vals,
                requested_keys,
                resp,
            } => {
                self.apply_merge(key_vals, Some(&peer), None);
                let full = self.finalize_dump(self.table.get_key_vals(&requested_keys));
                let _ = resp.send(full.key_vals);
            }
            InboundEvent::Dual { from, messages } => {
                if !self.peers.contains(&from) {
                    self.counters.unauthorized_publications += 1;
                    return;
                }
                let _ = self.process_dual(&from, messages);
            }
            InboundEvent::Peer(PeerEvent::SendExhausted { peer }) => {
                self.mark_peer_failed(&peer, "consecutive send failures");
            }
            InboundEvent::Peer(PeerEvent::SyncSucceeded { peer }) => {
                self.handle_sync_succeeded(&peer);
            }
            InboundEvent::Peer(PeerEvent::SyncFailed { peer, reason }) => {
                self.handle_sync_failed(&peer, &reason);
            }
        }
    }

    // ==================== Merge path ====================

    /// The single path every mutation takes: local sets, inbound floods,
    /// sync deltas, self-refresh bumps, and erase tombstones.
    fn apply_merge(
        &mut self,
        key_vals: HashMap<String, Value>,
        from_peer: Option<&str>,
        inbound_node_ids: Option<Vec<String>>,
    ) -> NoMergeStats {
        let (delta, stats) =
            merge_key_values(&mut self.table, key_vals, None, self.config.min_ttl_ms);
        self.counters.absorb(&stats);
        if delta.is_empty() {
            return stats;
        }

        let now = Instant::now();
        let mut readvertise = HashMap::new();
        for (key, value) in &delta.key_vals {
            self.ttl_queue.schedule(key, value, now);
            if value.originator_id == self.config.node_id {
                self.refresh
                    .schedule_refresh(key, value.ttl_ms, now, self.config.self_refresh_floor);
            } else {
                self.refresh.cancel_refresh(key);
                // A competing value overwrote a key we persist: advertise a
                // higher version of our own value.
                if let Some(persisted) = self.refresh.persisted(key) {
                    readvertise.insert(
                        key.clone(),
                        Value::new(
                            value.version + 1,
                            self.config.node_id.clone(),
                            persisted.payload.clone(),
                            persisted.ttl_ms,
                            1,
                        ),
                    );
                }
            }
        }

        tracing::debug!(
            area = %self.area_id,
            accepted = delta.key_vals.len(),
            ttl_only = delta.ttl_only_keys.len(),
            rejected = stats.reasons.len(),
            "merge applied"
        );

        self.publish_delta(&delta);
        self.flood_delta(&delta, from_peer, inbound_node_ids);

        if !readvertise.is_empty() {
            self.apply_merge(readvertise, None, None);
        }
        stats
    }

    fn publish_delta(&mut self, delta: &MergeDelta) {
        let mut publication = Publication::new(&self.area_id);
        publication.key_vals = delta.key_vals.clone();
        publication.ttl_only_keys = delta.ttl_only_keys.clone();
        publication.timestamp_ms = Some(unix_now_ms());
        self.publishers.publish(&publication);
    }

    fn flood_delta(
        &mut self,
        delta: &MergeDelta,
        from_peer: Option<&str>,
        inbound_node_ids: Option<Vec<String>>,
    ) {
        let mut publication = Publication::new(&self.area_id);
        publication.key_vals = delta.key_vals.clone();
        publication.ttl_only_keys = delta.ttl_only_keys.clone();
        update_publication_ttl(
            &self.ttl_queue,
            self.config.ttl_decrement_ms,
            &mut publication,
            Instant::now(),
        );
        if publication.key_vals.is_empty() {
            return;
        }
        publication.timestamp_ms = Some(unix_now_ms());
        let mut node_ids = inbound_node_ids.unwrap_or_default();
        node_ids.push(self.config.node_id.clone());
        publication.node_ids = Some(node_ids);

        let root = single_originator(&publication.key_vals);
        let targets =
            select_flood_targets(&self.peers, self.spt.as_ref(), root.as_deref(), from_peer);
        if targets.is_empty() {
            return;
        }
        let wire = PeerMessage::publication(publication.into());
        for name in targets {
            self.send_peer_message(&name, wire.clone());
        }
    }

    // ==================== TTL and self-refresh ====================

    fn handle_ttl_expiry(&mut self) {
        let now = Instant::now();
        let expired = self.ttl_queue.take_expired(now, &self.table);
        if expired.is_empty() {
            return;
        }
        for key in &expired {
            self.table.remove(key);
            self.refresh.cancel_refresh(key);
        }
        tracing::debug!(area = %self.area_id, count = expired.len(), "keys expired");

        // Expiry is local to every replica: notify subscribers, never
        // re-flood.
        let mut publication = Publication::new(&self.area_id);
        publication.expired_keys = expired;
        publication.timestamp_ms = Some(unix_now_ms());
        self.publishers.publish(&publication);
    }

    fn handle_self_refresh(&mut self) {
        let now = Instant::now();
        let mut batch = HashMap::new();
        for key in self.refresh.due(now) {
            let Some(stored) = self.table.get(&key) else {
                continue;
            };
            if stored.originator_id != self.config.node_id || stored.is_ttl_infinite() {
                continue;
            }
            let mut bump = stored.without_payload();
            bump.ttl_version += 1;
            batch.insert(key, bump);
        }
        if !batch.is_empty() {
            self.apply_merge(batch, None, None);
        }
    }

    // ==================== Self-originated keys ====================

    fn handle_persist_key(
        &mut self,
        key: String,
        payload: Vec<u8>,
        ttl_ms: i64,
    ) -> Result<(), RequestError> {
        if ttl_ms != trellis_model::TTL_INFINITY && ttl_ms < self.config.min_ttl_ms {
            return Err(RequestError::InvalidRequest(format!(
                "ttl {ttl_ms} below minimum {}",
                self.config.min_ttl_ms
            )));
        }
        if let Some(current) = self.table.get(&key) {
            if current.originator_id == self.config.node_id
                && current.payload.as_deref() == Some(payload.as_slice())
            {
                // Already advertising exactly this; just keep it persisted.
                self.refresh.persist(key, payload, ttl_ms);
                return Ok(());
            }
        }
        let version = self.table.get(&key).map(|v| v.version).unwrap_or(0) + 1;
        let value = Value::new(
            version,
            self.config.node_id.clone(),
            payload.clone(),
            ttl_ms,
            1,
        );
        self.refresh.persist(key.clone(), payload, ttl_ms);
        self.apply_merge(HashMap::from([(key, value)]), None, None);
        Ok(())
    }

    fn handle_erase_key(&mut self, key: String) -> Result<(), RequestError> {
        self.refresh.unpersist(&key);
        self.refresh.cancel_refresh(&key);
        let Some(current) = self.table.get(&key) else {
            return Ok(());
        };
        // Self-invalidation: a higher version with an empty payload and a
        // short TTL, so every replica expires the key.
        let value = Value::new(
            current.version + 1,
            self.config.node_id.clone(),
            Vec::new(),
            ERASE_TTL_MS,
            1,
        );
        self.apply_merge(HashMap::from([(key.clone(), value)]), None, None);
        // The tombstone is ours but must be allowed to expire.
        self.refresh.cancel_refresh(&key);
        Ok(())
    }

    // ==================== Peer lifecycle ====================

    fn handle_add_peer(&mut self, spec: PeerSpec) -> Result<(), RequestError> {
        if spec.peer_name == self.config.node_id {
            return Err(RequestError::InvalidRequest(
                "cannot add self as peer".into(),
            ));
        }
        if let Some(mut old) = self.peers.remove(&spec.peer_name) {
            old.abort_tasks();
            self.spt_peer_down(&spec.peer_name);
        }
        tracing::info!(area = %self.area_id, peer = %spec.peer_name, "peer added");
        let mut state = PeerState::new(
            spec.clone(),
            self.config.retry_backoff_base,
            self.config.retry_backoff_max,
        );
        state.sync_state = PeerSyncState::Syncing;
        self.peers.insert(state);
        self.start_sync(&spec.peer_name);
        Ok(())
    }

    fn handle_del_peer(&mut self, peer_name: &str) -> Result<(), RequestError> {
        match self.peers.remove(peer_name) {
            Some(mut peer) => {
                peer.abort_tasks();
                self.spt_peer_down(peer_name);
                tracing::info!(area = %self.area_id, peer = %peer_name, "peer removed");
            }
            None => {
                tracing::debug!(area = %self.area_id, peer = %peer_name, "del of unknown peer ignored");
            }
        }
        Ok(())
    }

    fn start_sync(&mut self, peer_name: &str) {
        let Some(peer) = self.peers.get_mut(peer_name) else {
            return;
        };
        peer.sync_state = PeerSyncState::Syncing;
        peer.next_retry = None;
        let spec = peer.spec.clone();

        let hash_dump = self.table.dump_hashes(&KvFilters::match_all());
        let task = spawn_full_sync(
            self.transport.clone(),
            self.area_id.clone(),
            spec,
            hash_dump,
            self.inbound_tx.clone(),
            self.config.sync_timeout,
        );
        if let Some(peer) = self.peers.get_mut(peer_name) {
            peer.sync_task = Some(task);
        }
    }

    fn handle_sync_succeeded(&mut self, peer_name: &str) {
        let Some(peer) = self.peers.get_mut(peer_name) else {
            return;
        };
        peer.sync_state = PeerSyncState::Established;
        peer.backoff.reset();
        peer.next_retry = None;
        peer.sync_task = None;
        self.ensure_sender(peer_name);

        let seeded = match self.spt.as_mut() {
            Some(spt) => {
                let delta = spt.peer_up(peer_name, self.config.default_link_cost);
                Some((delta, spt.advertisements()))
            }
            None => None,
        };
        if let Some((delta, seeds)) = seeded {
            self.send_spt_delta(delta);
            if !seeds.is_empty() {
                let msg = self.dual_wire(seeds);
                self.send_peer_message(peer_name, msg);
            }
        }
    }

    fn handle_sync_failed(&mut self, peer_name: &str, reason: &str) {
        // Timeouts are soft: the peer stays syncing across retries. Anything
        // else marks it failed until a retry succeeds.
        if reason != "timeout" {
            if let Some(peer) = self.peers.get_mut(peer_name) {
                peer.sync_state = PeerSyncState::Failed;
            }
        }
        self.schedule_retry(peer_name);
    }

    fn mark_peer_failed(&mut self, peer_name: &str, reason: &str) {
        tracing::warn!(area = %self.area_id, peer = %peer_name, reason, "peer failed");
        if let Some(peer) = self.peers.get_mut(peer_name) {
            peer.sync_state = PeerSyncState::Failed;
            peer.abort_tasks();
        }
        self.spt_peer_down(peer_name);
        self.schedule_retry(peer_name);
    }

    fn schedule_retry(&mut self, peer_name: &str) {
        let budget = self.config.sync_retry_budget;
        if let Some(peer) = self.peers.get_mut(peer_name) {
            if peer.backoff.attempts() >= budget {
                tracing::warn!(
                    area = %self.area_id,
                    peer = %peer_name,
                    "retry budget exhausted, leaving peer failed"
                );
                peer.sync_state = PeerSyncState::Failed;
                peer.next_retry = None;
            } else {
                let delay = peer.backoff.next_delay();
                peer.next_retry = Some(Instant::now() + delay);
            }
        }
    }

    fn handle_sync_retries(&mut self) {
        let now = Instant::now();
        for name in self.peers.due_for_retry(now) {
            tracing::info!(area = %self.area_id, peer = %name, "retrying peer sync");
            self.start_sync(&name);
        }
    }

    fn ensure_sender(&mut self, peer_name: &str) {
        let Some(peer) = self.peers.get(peer_name) else {
            return;
        };
        if peer.flood_tx.is_some() {
            return;
        }
        let spec = peer.spec.clone();
        let (tx, rx) = mpsc::channel(self.config.flood_queue_capacity);
        let task = spawn_peer_sender(
            self.transport.clone(),
            self.area_id.clone(),
            spec,
            rx,
            self.inbound_tx.clone(),
            self.config.max_send_failures,
        );
        if let Some(peer) = self.peers.get_mut(peer_name) {
            peer.flood_tx = Some(tx);
            peer.sender_task = Some(task);
        }
    }

    fn send_peer_message(&self, peer_name: &str, msg: PeerMessage) {
        if let Some(peer) = self.peers.get(peer_name) {
            if let Some(tx) = &peer.flood_tx {
                if tx.try_send(msg).is_err() {
                    tracing::warn!(
                        area = %self.area_id,
                        peer = %peer_name,
                        "outbound queue unavailable, dropping frame"
                    );
                }
            }
        }
    }

    // ==================== Spanning tree ====================

    fn process_dual(
        &mut self,
        from: &str,
        messages: Vec<SptMessage>,
    ) -> Result<(), RequestError> {
        let Some(spt) = self.spt.as_mut() else {
            return Err(RequestError::ModuleUnavailable("spanning-tree".into()));
        };
        let delta = spt.handle_messages(from, messages);
        self.send_spt_delta(delta);
        Ok(())
    }

    fn spt_peer_down(&mut self, peer_name: &str) {
        let delta = match self.spt.as_mut() {
            Some(spt) => spt.peer_down(peer_name),
            None => return,
        };
        self.send_spt_delta(delta);
    }

    fn send_spt_delta(&mut self, delta: SptDelta) {
        if delta.is_empty() {
            return;
        }
        if !delta.broadcast.is_empty() {
            let msg = self.dual_wire(delta.broadcast);
            for name in self.peers.established_names() {
                self.send_peer_message(&name, msg.clone());
            }
        }
        for (target, message) in delta.directed {
            let msg = self.dual_wire(vec![message]);
            self.send_peer_message(&target, msg);
        }
    }

    fn dual_wire(&self, messages: Vec<SptMessage>) -> PeerMessage {
        PeerMessage::dual_messages(DualMessages {
            area_id: self.area_id.clone(),
            messages: messages.into_iter().map(Into::into).collect(),
        })
    }

    // ==================== Helpers ====================

    /// Wrap a dump in a publication with the egress TTL countdown applied.
    fn finalize_dump(&self, key_vals: HashMap<String, Value>) -> Publication {
        let mut publication = Publication::new(&self.area_id);
        publication.key_vals = key_vals;
        update_publication_ttl(
            &self.ttl_queue,
            self.config.ttl_decrement_ms,
            &mut publication,
            Instant::now(),
        );
        publication.timestamp_ms = Some(unix_now_ms());
        publication
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The flood root for a delta: meaningful only when every entry shares one
/// originator.
fn single_originator(key_vals: &HashMap<String, Value>) -> Option<String> {
    let mut originators = key_vals.values().map(|v| v.originator_id.as_str());
    let first = originators.next()?;
    originators
        .all(|o| o == first)
        .then(|| first.to_string())
}
