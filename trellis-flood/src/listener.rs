//! Inbound connection handling: accept, identify, dispatch into area loops.

use crate::events::InboundEvent;
use crate::sync::{to_model_map, to_wire_map};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use trellis_net::{BiStream, Connection, FramingError, MessageSink, MessageStream, Transport};
use trellis_proto::{peer_message, FullSyncResponse, PeerMessage};

/// Routes inbound traffic to the owning area's event channel.
///
/// Implemented by the area registry; returns `None` for unknown areas, which
/// drops the connection.
pub trait InboundRouter: Send + Sync + 'static {
    fn route(&self, area_id: &str) -> Option<mpsc::Sender<InboundEvent>>;
}

/// Accept-and-dispatch loop for a node's transport.
pub fn spawn_listener<T, R>(transport: T, router: Arc<R>, max_anomalies: u32) -> JoinHandle<()>
where
    T: Transport,
    R: InboundRouter,
{
    tokio::spawn(async move {
        while let Some(conn) = transport.accept().await {
            let router = router.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(conn, router, max_anomalies).await {
                    tracing::debug!(error = %e, "peer connection ended");
                }
            });
        }
        tracing::debug!("listener stopped");
    })
}

async fn handle_connection<C, R>(
    conn: C,
    router: Arc<R>,
    max_anomalies: u32,
) -> Result<(), String>
where
    C: Connection,
    R: InboundRouter,
{
    let stream = conn.open_bi().await.map_err(|e| e.to_string())?;
    let (send, recv) = stream.into_split();
    let mut sink = MessageSink::new(send);
    let mut messages = MessageStream::new(recv);

    // Every connection starts with a hello identifying (node, area).
    let hello = match messages.recv().await.map_err(|e| e.to_string())? {
        Some(PeerMessage {
            message: Some(peer_message::Message::Hello(hello)),
        }) => hello,
        Some(_) => return Err("expected hello".into()),
        None => return Ok(()),
    };

    let Some(tx) = router.route(&hello.area_id) else {
        tracing::warn!(area = %hello.area_id, from = %hello.node_id, "connection for unknown area");
        return Ok(());
    };
    let from = hello.node_id;

    let mut anomalies: u32 = 0;
    loop {
        match messages.recv().await {
            Ok(Some(msg)) => match msg.message {
                Some(peer_message::Message::Publication(publication)) => {
                    anomalies = 0;
                    let event = InboundEvent::Publication {
                        from: from.clone(),
                        publication: publication.into(),
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Some(peer_message::Message::FullSyncRequest(request)) => {
                    anomalies = 0;
                    let (resp_tx, resp_rx) = oneshot::channel();
                    let event = InboundEvent::SyncRequest {
                        from: from.clone(),
                        hash_dump: to_model_map(request.hash_dump),
                        resp: resp_tx,
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                    // A dropped reply means the area refused the peer.
                    let Ok(reply) = resp_rx.await else {
                        return Err(format!("sync request from {from} refused"));
                    };
                    let response = PeerMessage {
                        message: Some(peer_message::Message::FullSyncResponse(
                            FullSyncResponse {
                                area_id: request.area_id,
                                key_vals: to_wire_map(reply.key_vals),
                                requested_keys: reply.requested_keys,
                            },
                        )),
                    };
                    sink.send(&response).await.map_err(|e| e.to_string())?;
                }
                Some(peer_message::Message::FullSyncFinalize(finalize)) => {
                    anomalies = 0;
                    let mut publication = trellis_model::Publication::new(finalize.area_id);
                    publication.key_vals = to_model_map(finalize.key_vals);
                    let event = InboundEvent::Publication {
                        from: from.clone(),
                        publication,
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Some(peer_message::Message::DualMessages(dual)) => {
                    anomalies = 0;
                    let event = InboundEvent::Dual {
                        from: from.clone(),
                        messages: dual.messages.into_iter().map(Into::into).collect(),
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Some(peer_message::Message::Hello(_))
                | Some(peer_message::Message::FullSyncResponse(_))
                | None => {
                    anomalies += 1;
                    tracing::debug!(from = %from, anomalies, "unexpected frame");
                    if anomalies >= max_anomalies {
                        return Err(format!("too many protocol anomalies from {from}"));
                    }
                }
            },
            // A decode failure leaves frame boundaries intact; tolerate a
            // bounded burst before giving up on the connection.
            Err(FramingError::Decode(e)) => {
                anomalies += 1;
                tracing::warn!(from = %from, error = %e, anomalies, "corrupted frame");
                if anomalies >= max_anomalies {
                    return Err(format!("too many corrupted frames from {from}"));
                }
            }
            Err(FramingError::Io(e)) => return Err(e.to_string()),
            Ok(None) => return Ok(()),
        }
    }
}
