//! Wire message definitions for Trellis.
//!
//! Field tags and types are pinned in source with explicit `#[prost(...)]`
//! attributes; they are the wire contract and must not be renumbered.

mod convert;

/// A versioned value as carried on the wire. Payload is optional: hash dumps
/// and TTL-only refreshes strip it and rely on `hash` for identity.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireValue {
    #[prost(uint64, tag = "1")]
    pub version: u64,
    #[prost(string, tag = "2")]
    pub originator_id: ::prost::alloc::string::String,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub payload: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(int64, tag = "4")]
    pub ttl_ms: i64,
    #[prost(uint64, tag = "5")]
    pub ttl_version: u64,
    #[prost(int64, tag = "6")]
    pub hash: i64,
}

/// Key-values plus expirations for one area.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePublication {
    #[prost(string, tag = "1")]
    pub area_id: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "2")]
    pub key_vals: ::std::collections::HashMap<::prost::alloc::string::String, WireValue>,
    #[prost(string, repeated, tag = "3")]
    pub expired_keys: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(int64, optional, tag = "4")]
    pub timestamp_ms: ::core::option::Option<i64>,
    /// Nodes already visited by this flood, for loop detection.
    #[prost(string, repeated, tag = "5")]
    pub node_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Filter parameters on the request surface.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireKeyDumpParams {
    /// Deprecated single-prefix form; honored only when `keys` is empty.
    #[prost(string, tag = "1")]
    pub prefix: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub keys: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "3")]
    pub originator_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(enumeration = "WireFilterOperator", tag = "4")]
    pub oper: i32,
    #[prost(bool, tag = "5")]
    pub ignore_ttl: bool,
    #[prost(bool, tag = "6")]
    pub do_not_publish_value: bool,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum WireFilterOperator {
    Or = 0,
    And = 1,
}

/// First message on every peer connection: who is calling, for which area.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Hello {
    #[prost(string, tag = "1")]
    pub node_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub area_id: ::prost::alloc::string::String,
}

/// Full-sync step 1: the initiator's complete hash dump (payloads stripped).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullSyncRequest {
    #[prost(string, tag = "1")]
    pub area_id: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "2")]
    pub hash_dump: ::std::collections::HashMap<::prost::alloc::string::String, WireValue>,
}

/// Full-sync step 2: values the initiator needs, plus the keys the responder
/// wants full values for.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullSyncResponse {
    #[prost(string, tag = "1")]
    pub area_id: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "2")]
    pub key_vals: ::std::collections::HashMap<::prost::alloc::string::String, WireValue>,
    #[prost(string, repeated, tag = "3")]
    pub requested_keys: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Full-sync step 3: full values for the responder's requested keys.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullSyncFinalize {
    #[prost(string, tag = "1")]
    pub area_id: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "2")]
    pub key_vals: ::std::collections::HashMap<::prost::alloc::string::String, WireValue>,
}

/// One spanning-tree message. Without `child`, this is a routing update
/// carrying the sender's reported distance to `root_id` (`u64::MAX` means
/// unreachable). With `child` set, it is a flood-topology child update:
/// `child` is to be attached to (or detached from) the receiver's tree for
/// `root_id` according to `set_child`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DualMessage {
    #[prost(string, tag = "1")]
    pub root_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub distance: u64,
    #[prost(string, optional, tag = "3")]
    pub child: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(bool, optional, tag = "4")]
    pub set_child: ::core::option::Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DualMessages {
    #[prost(string, tag = "1")]
    pub area_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub messages: ::prost::alloc::vec::Vec<DualMessage>,
}

/// Envelope for every peer-to-peer frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerMessage {
    #[prost(oneof = "peer_message::Message", tags = "1, 2, 3, 4, 5, 6")]
    pub message: ::core::option::Option<peer_message::Message>,
}

pub mod peer_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        Hello(super::Hello),
        #[prost(message, tag = "2")]
        Publication(super::WirePublication),
        #[prost(message, tag = "3")]
        FullSyncRequest(super::FullSyncRequest),
        #[prost(message, tag = "4")]
        FullSyncResponse(super::FullSyncResponse),
        #[prost(message, tag = "5")]
        FullSyncFinalize(super::FullSyncFinalize),
        #[prost(message, tag = "6")]
        DualMessages(super::DualMessages),
    }
}

impl PeerMessage {
    pub fn hello(node_id: impl Into<String>, area_id: impl Into<String>) -> Self {
        Self {
            message: Some(peer_message::Message::Hello(Hello {
                node_id: node_id.into(),
                area_id: area_id.into(),
            })),
        }
    }

    pub fn publication(publication: WirePublication) -> Self {
        Self {
            message: Some(peer_message::Message::Publication(publication)),
        }
    }

    pub fn dual_messages(msgs: DualMessages) -> Self {
        Self {
            message: Some(peer_message::Message::DualMessages(msgs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_wire_value_roundtrip_preserves_optional_payload() {
        let with_payload = WireValue {
            version: 3,
            originator_id: "node1".into(),
            payload: Some(b"v".to_vec()),
            ttl_ms: 30_000,
            ttl_version: 2,
            hash: -42,
        };
        let decoded = WireValue::decode(&with_payload.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded, with_payload);

        let stripped = WireValue {
            payload: None,
            ..with_payload
        };
        let decoded = WireValue::decode(&stripped.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded.payload, None);
        assert_eq!(decoded.hash, -42);
    }

    #[test]
    fn test_peer_message_envelope_roundtrip() {
        let mut publication = WirePublication {
            area_id: "spine".into(),
            ..Default::default()
        };
        publication.key_vals.insert(
            "k".into(),
            WireValue {
                version: 1,
                originator_id: "n".into(),
                payload: Some(b"v".to_vec()),
                ttl_ms: 1000,
                ttl_version: 1,
                hash: 7,
            },
        );
        publication.node_ids.push("n".into());

        let msg = PeerMessage::publication(publication.clone());
        let decoded = PeerMessage::decode(&msg.encode_to_vec()[..]).unwrap();
        match decoded.message {
            Some(peer_message::Message::Publication(p)) => assert_eq!(p, publication),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
