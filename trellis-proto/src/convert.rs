//! Conversions between wire messages and model types.

use crate::{WireFilterOperator, WireKeyDumpParams, WirePublication, WireValue};
use trellis_model::{FilterOperator, KeyDumpParams, Publication, Value};

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        WireValue {
            version: value.version,
            originator_id: value.originator_id,
            payload: value.payload,
            ttl_ms: value.ttl_ms,
            ttl_version: value.ttl_version,
            hash: value.hash,
        }
    }
}

impl From<WireValue> for Value {
    fn from(wire: WireValue) -> Self {
        Value {
            version: wire.version,
            originator_id: wire.originator_id,
            payload: wire.payload,
            ttl_ms: wire.ttl_ms,
            ttl_version: wire.ttl_version,
            hash: wire.hash,
        }
    }
}

impl From<Publication> for WirePublication {
    fn from(publication: Publication) -> Self {
        WirePublication {
            area_id: publication.area_id,
            key_vals: publication
                .key_vals
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            expired_keys: publication.expired_keys,
            timestamp_ms: publication.timestamp_ms,
            node_ids: publication.node_ids.unwrap_or_default(),
        }
    }
}

impl From<WirePublication> for Publication {
    fn from(wire: WirePublication) -> Self {
        // TTL-only marking is a local concern; inbound entries are re-marked
        // by the merge engine.
        Publication {
            area_id: wire.area_id,
            key_vals: wire
                .key_vals
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            expired_keys: wire.expired_keys,
            timestamp_ms: wire.timestamp_ms,
            node_ids: if wire.node_ids.is_empty() {
                None
            } else {
                Some(wire.node_ids)
            },
            ttl_only_keys: Default::default(),
        }
    }
}

impl From<WireFilterOperator> for FilterOperator {
    fn from(oper: WireFilterOperator) -> Self {
        match oper {
            WireFilterOperator::Or => FilterOperator::Or,
            WireFilterOperator::And => FilterOperator::And,
        }
    }
}

impl From<FilterOperator> for WireFilterOperator {
    fn from(oper: FilterOperator) -> Self {
        match oper {
            FilterOperator::Or => WireFilterOperator::Or,
            FilterOperator::And => WireFilterOperator::And,
        }
    }
}

impl From<WireKeyDumpParams> for KeyDumpParams {
    fn from(wire: WireKeyDumpParams) -> Self {
        let oper = WireFilterOperator::try_from(wire.oper)
            .unwrap_or(WireFilterOperator::Or)
            .into();
        KeyDumpParams {
            prefix: wire.prefix,
            keys: wire.keys,
            originator_ids: wire.originator_ids.into_iter().collect(),
            oper,
            ignore_ttl: wire.ignore_ttl,
            do_not_publish_value: wire.do_not_publish_value,
        }
    }
}

impl From<KeyDumpParams> for WireKeyDumpParams {
    fn from(params: KeyDumpParams) -> Self {
        WireKeyDumpParams {
            prefix: params.prefix,
            keys: params.keys,
            originator_ids: params.originator_ids.into_iter().collect(),
            oper: WireFilterOperator::from(params.oper) as i32,
            ignore_ttl: params.ignore_ttl,
            do_not_publish_value: params.do_not_publish_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip_through_wire() {
        let value = Value::new(5, "node1", b"payload".to_vec(), 30_000, 2);
        let wire: WireValue = value.clone().into();
        let back: Value = wire.into();
        assert_eq!(back, value);
    }

    #[test]
    fn test_publication_roundtrip_drops_local_markers() {
        let mut publication = Publication::new("spine");
        publication
            .key_vals
            .insert("k".into(), Value::new(1, "n", b"v".to_vec(), 1000, 1));
        publication.ttl_only_keys.insert("k".into());
        publication.node_ids = Some(vec!["n".into()]);

        let wire: WirePublication = publication.clone().into();
        let back: Publication = wire.into();
        assert!(back.ttl_only_keys.is_empty());
        assert_eq!(back.key_vals, publication.key_vals);
        assert_eq!(back.node_ids, publication.node_ids);
    }
}
