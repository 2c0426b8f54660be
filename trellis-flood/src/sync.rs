//! Full-sync exchange: how a node reconciles with a newly added peer.
//!
//! Three messages on one stream: the initiator's hash dump, the responder's
//! diff (full values the initiator needs plus the keys the responder wants),
//! and the finalize carrying those full values. Merging happens on the
//! owning area's loop; this module only runs the protocol.

use crate::events::{InboundEvent, PeerEvent};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use trellis_model::{PeerSpec, Value};
use trellis_net::{BiStream, Connection, MessageSink, MessageStream, Transport};
use trellis_proto::{peer_message, FullSyncFinalize, FullSyncRequest, PeerMessage, WireValue};

pub(crate) fn to_model_map(map: HashMap<String, WireValue>) -> HashMap<String, Value> {
    map.into_iter().map(|(k, v)| (k, v.into())).collect()
}

pub(crate) fn to_wire_map(map: HashMap<String, Value>) -> HashMap<String, WireValue> {
    map.into_iter().map(|(k, v)| (k, v.into())).collect()
}

/// Spawn the initiator side of a full sync with one peer.
///
/// Emits [`PeerEvent::SyncSucceeded`] or [`PeerEvent::SyncFailed`] on the
/// area's event channel; the area loop owns the resulting state transition
/// and any retry scheduling. The whole exchange runs under one timeout,
/// and a timeout is a soft failure.
pub fn spawn_full_sync<T: Transport>(
    transport: T,
    area_id: String,
    spec: PeerSpec,
    hash_dump: HashMap<String, Value>,
    events: mpsc::Sender<InboundEvent>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let peer = spec.peer_name.clone();
        let result = tokio::time::timeout(
            timeout,
            run_initiator(&transport, &area_id, &spec, hash_dump, &events),
        )
        .await;

        let event = match result {
            Ok(Ok(received)) => {
                tracing::info!(peer = %peer, area = %area_id, received, "full sync complete");
                PeerEvent::SyncSucceeded { peer }
            }
            Ok(Err(reason)) => {
                tracing::warn!(peer = %peer, area = %area_id, %reason, "full sync failed");
                PeerEvent::SyncFailed { peer, reason }
            }
            Err(_) => {
                tracing::warn!(peer = %peer, area = %area_id, "full sync timed out");
                PeerEvent::SyncFailed {
                    peer,
                    reason: "timeout".into(),
                }
            }
        };
        let _ = events.send(InboundEvent::Peer(event)).await;
    })
}

async fn run_initiator<T: Transport>(
    transport: &T,
    area_id: &str,
    spec: &PeerSpec,
    hash_dump: HashMap<String, Value>,
    events: &mpsc::Sender<InboundEvent>,
) -> Result<usize, String> {
    let conn = transport
        .connect(&spec.endpoint)
        .await
        .map_err(|e| format!("connect: {e}"))?;
    let stream = conn.open_bi().await.map_err(|e| format!("stream: {e}"))?;
    let (send, recv) = stream.into_split();
    let mut sink = MessageSink::new(send);
    let mut messages = MessageStream::new(recv);

    sink.send(&PeerMessage::hello(transport.node_id(), area_id))
        .await
        .map_err(|e| format!("hello: {e}"))?;
    sink.send(&PeerMessage {
        message: Some(peer_message::Message::FullSyncRequest(FullSyncRequest {
            area_id: area_id.to_string(),
            hash_dump: to_wire_map(hash_dump),
        })),
    })
    .await
    .map_err(|e| format!("request: {e}"))?;

    let response = match messages.recv().await.map_err(|e| format!("recv: {e}"))? {
        Some(PeerMessage {
            message: Some(peer_message::Message::FullSyncResponse(response)),
        }) => response,
        Some(_) => return Err("unexpected message awaiting sync response".into()),
        None => return Err("stream closed awaiting sync response".into()),
    };

    let received = response.key_vals.len();
    let (resp_tx, resp_rx) = oneshot::channel();
    events
        .send(InboundEvent::SyncResponse {
            peer: spec.peer_name.clone(),
            key_vals: to_model_map(response.key_vals),
            requested_keys: response.requested_keys,
            resp: resp_tx,
        })
        .await
        .map_err(|_| "area loop gone".to_string())?;
    let full_vals = resp_rx.await.map_err(|_| "area loop dropped reply".to_string())?;

    sink.send(&PeerMessage {
        message: Some(peer_message::Message::FullSyncFinalize(FullSyncFinalize {
            area_id: area_id.to_string(),
            key_vals: to_wire_map(full_vals),
        })),
    })
    .await
    .map_err(|e| format!("finalize: {e}"))?;

    Ok(received)
}
