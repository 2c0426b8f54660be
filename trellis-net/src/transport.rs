//! Transport abstraction for peer connectivity.
//!
//! Decouples the flood/sync path from any concrete network stack. Peers are
//! addressed by opaque endpoint strings, interpreted by the backend;
//! production can plug a QUIC/TLS transport, tests use in-memory channels.

use std::fmt;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("accept failed: {0}")]
    Accept(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// A bidirectional byte stream (send + receive half).
///
/// Both halves must be independently usable. Implementations are expected to
/// carry length-delimited frames via `MessageSink`/`MessageStream`.
pub trait BiStream: Send + 'static {
    type SendStream: tokio::io::AsyncWrite + Send + Unpin;
    type RecvStream: tokio::io::AsyncRead + Send + Unpin;

    /// Split into send and receive halves.
    fn into_split(self) -> (Self::SendStream, Self::RecvStream);
}

/// A connection to a remote peer that can open bidirectional streams.
pub trait Connection: Send + Sync + 'static {
    type Stream: BiStream;

    /// Open a new bidirectional stream on this connection.
    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Stream, TransportError>> + Send;

    /// The remote side's node id.
    fn remote_node_id(&self) -> &str;
}

/// Transport layer abstraction: identity, outbound dial, inbound accept.
pub trait Transport: Clone + Send + Sync + fmt::Debug + 'static {
    type Connection: Connection;

    /// This node's id.
    fn node_id(&self) -> &str;

    /// Dial a remote peer by endpoint address.
    fn connect(
        &self,
        endpoint: &str,
    ) -> impl std::future::Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Accept an incoming connection; `None` on transport shutdown.
    fn accept(
        &self,
    ) -> impl std::future::Future<Output = Option<Self::Connection>> + Send;
}
