//! In-memory transport backed by `tokio::io::DuplexStream`.
//!
//! A shared `ChannelNetwork` broker routes dials between `ChannelTransport`
//! instances by node id. Used by multi-node tests and simulations; the
//! production daemon plugs a real transport behind the same traits.

use crate::transport::{BiStream, Connection, Transport, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

/// Shared broker routing connections between transports by node id.
#[derive(Clone, Debug, Default)]
pub struct ChannelNetwork {
    nodes: Arc<Mutex<HashMap<String, mpsc::Sender<ChannelConnection>>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, node_id: String, accept_tx: mpsc::Sender<ChannelConnection>) {
        self.nodes.lock().await.insert(node_id, accept_tx);
    }
}

/// In-memory Transport implementation. Endpoint addresses are node ids.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    node_id: String,
    network: ChannelNetwork,
    accept_rx: Arc<Mutex<mpsc::Receiver<ChannelConnection>>>,
}

impl ChannelTransport {
    pub async fn new(node_id: impl Into<String>, network: &ChannelNetwork) -> Self {
        let node_id = node_id.into();
        let (accept_tx, accept_rx) = mpsc::channel(64);
        network.register(node_id.clone(), accept_tx).await;
        Self {
            node_id,
            network: network.clone(),
            accept_rx: Arc::new(Mutex::new(accept_rx)),
        }
    }
}

impl Transport for ChannelTransport {
    type Connection = ChannelConnection;

    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn connect(
        &self,
        endpoint: &str,
    ) -> impl std::future::Future<Output = Result<Self::Connection, TransportError>> + Send {
        let network = self.network.clone();
        let my_node_id = self.node_id.clone();
        let remote = endpoint.to_string();

        async move {
            let accept_tx = {
                let nodes = network.nodes.lock().await;
                nodes
                    .get(&remote)
                    .ok_or_else(|| {
                        TransportError::Connect(format!("node {remote} not found in network"))
                    })?
                    .clone()
            };

            // One channel: the initiator hands DuplexStream ends to the peer.
            let (stream_tx, stream_rx) = mpsc::channel::<DuplexStream>(8);

            let peer_conn = ChannelConnection {
                remote_node_id: my_node_id,
                role: ConnectionRole::Responder(Arc::new(Mutex::new(stream_rx))),
            };
            accept_tx.send(peer_conn).await.map_err(|_| {
                TransportError::Connect(format!("node {remote} accept channel closed"))
            })?;

            Ok(ChannelConnection {
                remote_node_id: remote,
                role: ConnectionRole::Initiator(Arc::new(Mutex::new(stream_tx))),
            })
        }
    }

    fn accept(&self) -> impl std::future::Future<Output = Option<Self::Connection>> + Send {
        let accept_rx = self.accept_rx.clone();
        async move { accept_rx.lock().await.recv().await }
    }
}

/// Role determines how `open_bi` works.
enum ConnectionRole {
    /// Creates DuplexStream pairs and hands one end to the peer.
    Initiator(Arc<Mutex<mpsc::Sender<DuplexStream>>>),
    /// Receives DuplexStream ends from the initiator.
    Responder(Arc<Mutex<mpsc::Receiver<DuplexStream>>>),
}

/// In-memory connection between two `ChannelTransport` instances.
pub struct ChannelConnection {
    remote_node_id: String,
    role: ConnectionRole,
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("remote", &self.remote_node_id)
            .finish()
    }
}

impl Connection for ChannelConnection {
    type Stream = ChannelBiStream;

    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Stream, TransportError>> + Send {
        let role = match &self.role {
            ConnectionRole::Initiator(tx) => ConnectionRole::Initiator(tx.clone()),
            ConnectionRole::Responder(rx) => ConnectionRole::Responder(rx.clone()),
        };

        async move {
            match role {
                ConnectionRole::Initiator(tx) => {
                    let (mine, theirs) = tokio::io::duplex(DUPLEX_BUF_SIZE);
                    let tx = tx.lock().await;
                    tx.send(theirs)
                        .await
                        .map_err(|_| TransportError::Stream("connection closed".into()))?;
                    Ok(ChannelBiStream(mine))
                }
                ConnectionRole::Responder(rx) => {
                    let mut rx = rx.lock().await;
                    let stream = rx
                        .recv()
                        .await
                        .ok_or_else(|| TransportError::Stream("connection closed".into()))?;
                    Ok(ChannelBiStream(stream))
                }
            }
        }
    }

    fn remote_node_id(&self) -> &str {
        &self.remote_node_id
    }
}

/// In-memory bidirectional stream backed by one `DuplexStream`.
pub struct ChannelBiStream(DuplexStream);

impl BiStream for ChannelBiStream {
    type SendStream = WriteHalf<DuplexStream>;
    type RecvStream = ReadHalf<DuplexStream>;

    fn into_split(self) -> (Self::SendStream, Self::RecvStream) {
        let (read, write) = tokio::io::split(self.0);
        (write, read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{MessageSink, MessageStream};
    use trellis_proto::{peer_message, PeerMessage};

    #[tokio::test]
    async fn test_connect_accept_and_exchange() {
        let network = ChannelNetwork::new();
        let alpha = ChannelTransport::new("alpha", &network).await;
        let beta = ChannelTransport::new("beta", &network).await;

        let dial = tokio::spawn({
            let alpha = alpha.clone();
            async move {
                let conn = alpha.connect("beta").await.unwrap();
                let stream = conn.open_bi().await.unwrap();
                let (send, _recv) = stream.into_split();
                let mut sink = MessageSink::new(send);
                sink.send(&PeerMessage::hello("alpha", "spine")).await.unwrap();
            }
        });

        let conn = beta.accept().await.unwrap();
        assert_eq!(conn.remote_node_id(), "alpha");
        let stream = conn.open_bi().await.unwrap();
        let (_send, recv) = stream.into_split();
        let mut messages = MessageStream::new(recv);
        let msg = messages.recv().await.unwrap().unwrap();
        match msg.message {
            Some(peer_message::Message::Hello(hello)) => {
                assert_eq!(hello.node_id, "alpha");
                assert_eq!(hello.area_id, "spine");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        dial.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_unknown_node_fails() {
        let network = ChannelNetwork::new();
        let alpha = ChannelTransport::new("alpha", &network).await;
        assert!(alpha.connect("ghost").await.is_err());
    }
}
