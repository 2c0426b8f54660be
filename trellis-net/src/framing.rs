//! Length-delimited framing for peer message exchange.
//!
//! Wraps any AsyncWrite/AsyncRead pair in `PeerMessage` send/recv using
//! tokio-util's LengthDelimitedCodec, keeping protocol code independent of
//! the transport backend.

use futures_util::{SinkExt, StreamExt};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use trellis_proto::PeerMessage;

/// Errors from framed message exchange.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Framed writer sending length-prefixed `PeerMessage` frames.
pub struct MessageSink<W: AsyncWrite + Send + Unpin> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Send + Unpin> MessageSink<W> {
    pub fn new(stream: W) -> Self {
        Self {
            inner: FramedWrite::new(stream, LengthDelimitedCodec::new()),
        }
    }

    pub async fn send(&mut self, msg: &PeerMessage) -> Result<(), FramingError> {
        let bytes = msg.encode_to_vec();
        self.inner.send(bytes.into()).await?;
        Ok(())
    }

    /// Consume the sink and return the underlying writer, for
    /// transport-specific finalization.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Framed reader receiving length-prefixed `PeerMessage` frames.
pub struct MessageStream<R: AsyncRead + Send + Unpin> {
    inner: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Send + Unpin> MessageStream<R> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: FramedRead::new(stream, LengthDelimitedCodec::new()),
        }
    }

    /// Receive the next message, or `None` when the stream closed.
    pub async fn recv(&mut self) -> Result<Option<PeerMessage>, FramingError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(PeerMessage::decode(&bytes[..])?)),
            Some(Err(e)) => Err(FramingError::Io(e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_recv_roundtrip_over_duplex() {
        let (a, b) = tokio::io::duplex(4096);
        let mut sink = MessageSink::new(a);
        let mut stream = MessageStream::new(b);

        let msg = PeerMessage::hello("node1", "spine");
        sink.send(&msg).await.unwrap();
        let received = stream.recv().await.unwrap().unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_close() {
        let (a, b) = tokio::io::duplex(4096);
        drop(a);
        let mut stream = MessageStream::new(b);
        assert!(stream.recv().await.unwrap().is_none());
    }
}
