//! Shared helpers: in-memory nodes wired through the channel transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use trellis_flood::spawn_listener;
use trellis_model::{PeerSpec, PeerSyncState, StoreConfig, Value};
use trellis_net::{ChannelNetwork, ChannelTransport};
use trellis_store::{AreaRegistry, KvStoreService, Store, StoreHandle};

/// Polling cadence for the wait helpers: 200 × 25 ms ≈ 5 s ceiling.
pub const WAIT_ROUNDS: u32 = 200;
pub const WAIT_STEP: Duration = Duration::from_millis(25);

/// One simulated daemon: a transport identity, a registry of area stores,
/// the flood listener, and the request surface.
pub struct TestNode {
    pub node_id: String,
    pub service: KvStoreService,
    pub registry: Arc<AreaRegistry>,
    _listener: JoinHandle<()>,
}

impl TestNode {
    pub async fn new(node_id: &str, areas: &[&str], network: &ChannelNetwork) -> Self {
        Self::with_config(node_id, areas, network, |_| {}).await
    }

    pub async fn with_config(
        node_id: &str,
        areas: &[&str],
        network: &ChannelNetwork,
        tweak: impl Fn(&mut StoreConfig),
    ) -> Self {
        let transport = ChannelTransport::new(node_id, network).await;
        let mut registry = AreaRegistry::new();
        for area in areas {
            let mut config = StoreConfig::new(node_id);
            // Keep retries snappy for tests.
            config.retry_backoff_base = Duration::from_millis(50);
            config.retry_backoff_max = Duration::from_secs(1);
            tweak(&mut config);
            registry.insert(Store::spawn(*area, config, transport.clone()));
        }
        let registry = Arc::new(registry);
        let listener = spawn_listener(transport, registry.clone(), 3);
        Self {
            node_id: node_id.to_string(),
            service: KvStoreService::new(registry.clone()),
            registry,
            _listener: listener,
        }
    }

    pub fn handle(&self, area: &str) -> &StoreHandle {
        self.registry
            .get(area)
            .expect("area registered in test node")
    }
}

/// Peer two nodes with each other on one area.
#[allow(dead_code)]
pub async fn connect(a: &TestNode, b: &TestNode, area: &str) {
    a.handle(area)
        .add_peer(PeerSpec::new(&b.node_id, &b.node_id))
        .await
        .expect("add peer");
    b.handle(area)
        .add_peer(PeerSpec::new(&a.node_id, &a.node_id))
        .await
        .expect("add peer");
}

#[allow(dead_code)]
pub fn value(version: u64, originator: &str, payload: &str, ttl_ms: i64) -> Value {
    Value::new(version, originator, payload.as_bytes().to_vec(), ttl_ms, 1)
}

#[allow(dead_code)]
pub fn batch(entries: &[(&str, Value)]) -> HashMap<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[allow(dead_code)]
pub async fn has_value(node: &TestNode, area: &str, key: &str, payload: &[u8]) -> bool {
    match node.handle(area).get_key_vals(vec![key.to_string()]).await {
        Ok(publication) => publication
            .key_vals
            .get(key)
            .is_some_and(|v| v.payload.as_deref() == Some(payload)),
        Err(_) => false,
    }
}

#[allow(dead_code)]
pub async fn key_absent(node: &TestNode, area: &str, key: &str) -> bool {
    match node.handle(area).get_key_vals(vec![key.to_string()]).await {
        Ok(publication) => !publication.key_vals.contains_key(key),
        Err(_) => true,
    }
}

/// Wait until every listed node holds `key` with `payload`.
#[allow(dead_code)]
pub async fn wait_value(nodes: &[&TestNode], area: &str, key: &str, payload: &[u8]) {
    for _ in 0..WAIT_ROUNDS {
        let mut all = true;
        for node in nodes {
            if !has_value(node, area, key, payload).await {
                all = false;
                break;
            }
        }
        if all {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("timed out waiting for {key:?} on all nodes");
}

/// Wait until `key` is gone from every listed node.
#[allow(dead_code)]
pub async fn wait_absent(nodes: &[&TestNode], area: &str, key: &str) {
    for _ in 0..WAIT_ROUNDS {
        let mut all = true;
        for node in nodes {
            if !key_absent(node, area, key).await {
                all = false;
                break;
            }
        }
        if all {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("timed out waiting for {key:?} to expire on all nodes");
}

/// Wait until `peer` reaches `state` on `node`.
#[allow(dead_code)]
pub async fn wait_peer_state(node: &TestNode, area: &str, peer: &str, state: PeerSyncState) {
    for _ in 0..WAIT_ROUNDS {
        if let Ok(peers) = node.handle(area).get_peers().await {
            if peers.get(peer).is_some_and(|p| p.sync_state == state) {
                return;
            }
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("timed out waiting for peer {peer:?} to reach {state:?}");
}
