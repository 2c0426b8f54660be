//! Subscriber registry: filtered fan-out of effective deltas.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use trellis_model::{KvFilters, Publication};
use uuid::Uuid;

/// A frame on a subscriber's stream. `Lagged` is terminal: the subscriber
/// fell behind its bounded queue and was cancelled.
#[derive(Clone, Debug, PartialEq)]
pub enum PublicationFrame {
    Publication(Publication),
    Lagged,
}

struct Subscriber {
    id: Uuid,
    filters: KvFilters,
    suppress_payload: bool,
    ignore_ttl_only: bool,
    tx: mpsc::Sender<PublicationFrame>,
}

/// All live subscribers of one area.
pub struct PublisherRegistry {
    area_id: String,
    capacity: usize,
    subscribers: Vec<Subscriber>,
}

impl PublisherRegistry {
    pub fn new(area_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            area_id: area_id.into(),
            capacity,
            subscribers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Register a subscriber and hand back its stream end. The caller is on
    /// the area loop, so registration is atomic with respect to merges.
    pub fn subscribe(
        &mut self,
        filters: KvFilters,
        suppress_payload: bool,
        ignore_ttl_only: bool,
    ) -> mpsc::Receiver<PublicationFrame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        tracing::debug!(area = %self.area_id, subscriber = %id, "subscriber registered");
        self.subscribers.push(Subscriber {
            id,
            filters,
            suppress_payload,
            ignore_ttl_only,
            tx,
        });
        rx
    }

    /// Deliver an effective delta to every subscriber whose filtered view of
    /// it is non-empty. A full queue cancels that subscriber with a terminal
    /// lagged frame; a closed queue (consumer went away) just drops it.
    pub fn publish(&mut self, delta: &Publication) {
        let area_id = &self.area_id;
        self.subscribers.retain(|sub| {
            let Some(view) = subscriber_view(delta, sub) else {
                return true;
            };
            match sub.tx.try_send(PublicationFrame::Publication(view)) {
                Ok(()) => true,
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(area = %area_id, subscriber = %sub.id, "subscriber gone");
                    false
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(area = %area_id, subscriber = %sub.id, "subscriber lagged, cancelling");
                    let tx = sub.tx.clone();
                    // The queue is full; deliver the terminal frame once the
                    // consumer drains a slot, then the sender closes.
                    tokio::spawn(async move {
                        let _ = tx.send(PublicationFrame::Lagged).await;
                    });
                    false
                }
            }
        });
    }
}

/// Compute one subscriber's view of a delta, or `None` when nothing is left
/// after filtering.
fn subscriber_view(delta: &Publication, sub: &Subscriber) -> Option<Publication> {
    let mut key_vals = HashMap::new();
    let mut ttl_only_keys = std::collections::HashSet::new();
    for (key, value) in &delta.key_vals {
        let ttl_only = delta.ttl_only_keys.contains(key);
        if ttl_only && sub.ignore_ttl_only {
            continue;
        }
        if !sub.filters.matches(key, value) {
            continue;
        }
        let value = if sub.suppress_payload {
            value.without_payload()
        } else {
            value.clone()
        };
        if ttl_only {
            ttl_only_keys.insert(key.clone());
        }
        key_vals.insert(key.clone(), value);
    }

    // Expired keys carry no value, so only the key predicate applies.
    let expired_keys: Vec<String> = delta
        .expired_keys
        .iter()
        .filter(|key| sub.filters.key_pattern_match(key))
        .cloned()
        .collect();

    if key_vals.is_empty() && expired_keys.is_empty() {
        return None;
    }
    Some(Publication {
        area_id: delta.area_id.clone(),
        key_vals,
        expired_keys,
        timestamp_ms: delta.timestamp_ms,
        node_ids: None,
        ttl_only_keys,
    })
}
