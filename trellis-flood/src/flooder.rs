//! Flood forwarding: per-peer sender tasks and target selection.

use crate::events::{InboundEvent, PeerEvent};
use crate::peer::PeerSet;
use crate::spt::SptState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trellis_model::PeerSpec;
use trellis_net::{BiStream, Connection, MessageSink, Transport};
use trellis_proto::PeerMessage;

/// Spawn the sender task for one peer.
///
/// Owns the peer's outbound connection: connects lazily, identifies itself
/// with a hello frame, then forwards queued messages. Consecutive send
/// failures are counted here; once `max_failures` is reached the task emits
/// [`PeerEvent::SendExhausted`] and exits, leaving the area loop to mark the
/// peer failed and schedule a re-sync. A dropped message is repaired by the
/// next full sync, never retried here.
pub fn spawn_peer_sender<T: Transport>(
    transport: T,
    area_id: String,
    spec: PeerSpec,
    mut rx: mpsc::Receiver<PeerMessage>,
    events: mpsc::Sender<InboundEvent>,
    max_failures: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let node_id = transport.node_id().to_string();
        let peer_name = spec.peer_name.clone();
        let mut sink = None;
        let mut failures: u32 = 0;

        while let Some(msg) = rx.recv().await {
            if sink.is_none() {
                match open_sink(&transport, &spec, &node_id, &area_id).await {
                    Ok(s) => {
                        sink = Some(s);
                        failures = 0;
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer_name, error = %e, "flood connect failed");
                        failures += 1;
                        if failures >= max_failures {
                            let _ = events
                                .send(InboundEvent::Peer(PeerEvent::SendExhausted {
                                    peer: peer_name.clone(),
                                }))
                                .await;
                            return;
                        }
                        continue;
                    }
                }
            }

            if let Some(s) = sink.as_mut() {
                match s.send(&msg).await {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        tracing::warn!(peer = %peer_name, error = %e, "flood send failed");
                        sink = None;
                        failures += 1;
                        if failures >= max_failures {
                            let _ = events
                                .send(InboundEvent::Peer(PeerEvent::SendExhausted {
                                    peer: peer_name.clone(),
                                }))
                                .await;
                            return;
                        }
                    }
                }
            }
        }
        tracing::debug!(peer = %peer_name, "flood sender stopped");
    })
}

async fn open_sink<T: Transport>(
    transport: &T,
    spec: &PeerSpec,
    node_id: &str,
    area_id: &str,
) -> Result<MessageSink<<<T::Connection as Connection>::Stream as BiStream>::SendStream>, String> {
    let conn = transport
        .connect(&spec.endpoint)
        .await
        .map_err(|e| e.to_string())?;
    let stream = conn.open_bi().await.map_err(|e| e.to_string())?;
    let (send, _recv) = stream.into_split();
    let mut sink = MessageSink::new(send);
    sink.send(&PeerMessage::hello(node_id, area_id))
        .await
        .map_err(|e| e.to_string())?;
    Ok(sink)
}

/// Choose which established peers receive a flood.
///
/// Split horizon always excludes the inbound edge. When flood optimization
/// is on and the spanning-tree module has an elected tree for `root`, the
/// flood is restricted to that tree's edges; otherwise it goes to every
/// established peer.
pub fn select_flood_targets(
    peers: &PeerSet,
    spt: Option<&SptState>,
    root: Option<&str>,
    exclude: Option<&str>,
) -> Vec<String> {
    let tree_edges = match (spt, root) {
        (Some(spt), Some(root)) => spt.flood_edges(root),
        _ => None,
    };

    peers
        .established_names()
        .into_iter()
        .filter(|name| Some(name.as_str()) != exclude)
        .filter(|name| match &tree_edges {
            Some(edges) => edges.contains(name),
            None => true,
        })
        .collect()
}
