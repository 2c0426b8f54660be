//! Networking seam for Trellis.
//!
//! Transport traits decouple flooding and sync from any concrete stack; the
//! in-memory channel transport backs tests and simulations. Framing wraps
//! any bidirectional stream in length-delimited `PeerMessage` exchange.

pub mod channel;
pub mod framing;
pub mod transport;

pub use channel::{ChannelNetwork, ChannelTransport};
pub use framing::{FramingError, MessageSink, MessageStream};
pub use transport::{BiStream, Connection, Transport, TransportError};
