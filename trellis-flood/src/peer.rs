//! Peer lifecycle state: sync states, retry backoff, task handles.

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use trellis_model::{PeerInfo, PeerSpec, PeerSyncState};
use trellis_proto::PeerMessage;

/// Bounded exponential backoff with jitter for peer sync retries.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Next delay: base * 2^attempt, capped, with up to 10% jitter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(16));
        let capped = exp.min(self.max);
        if self.attempt < u32::MAX {
            self.attempt += 1;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(10) / 10) as u64;
        capped + Duration::from_millis(jitter_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// How many delays have been handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// One peer's live state inside an area.
#[derive(Debug)]
pub struct PeerState {
    pub spec: PeerSpec,
    pub sync_state: PeerSyncState,
    /// Queue into the sender task; `None` while the peer has no live sender.
    pub flood_tx: Option<mpsc::Sender<PeerMessage>>,
    pub backoff: Backoff,
    /// When to retry a failed or timed-out sync.
    pub next_retry: Option<Instant>,
    pub sender_task: Option<JoinHandle<()>>,
    pub sync_task: Option<JoinHandle<()>>,
}

impl PeerState {
    pub fn new(spec: PeerSpec, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            spec,
            sync_state: PeerSyncState::Idle,
            flood_tx: None,
            backoff: Backoff::new(backoff_base, backoff_max),
            next_retry: None,
            sender_task: None,
            sync_task: None,
        }
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            spec: self.spec.clone(),
            sync_state: self.sync_state,
        }
    }

    /// Tear down this peer's tasks.
    pub fn abort_tasks(&mut self) {
        if let Some(task) = self.sender_task.take() {
            task.abort();
        }
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
        self.flood_tx = None;
    }
}

impl Drop for PeerState {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// All peers of one area, keyed by peer name.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<String, PeerState>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: PeerState) -> Option<PeerState> {
        self.peers.insert(state.spec.peer_name.clone(), state)
    }

    pub fn remove(&mut self, peer_name: &str) -> Option<PeerState> {
        self.peers.remove(peer_name)
    }

    pub fn get(&self, peer_name: &str) -> Option<&PeerState> {
        self.peers.get(peer_name)
    }

    pub fn get_mut(&mut self, peer_name: &str) -> Option<&mut PeerState> {
        self.peers.get_mut(peer_name)
    }

    pub fn contains(&self, peer_name: &str) -> bool {
        self.peers.contains_key(peer_name)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PeerState)> {
        self.peers.iter()
    }

    /// Names of peers currently able to receive floods.
    pub fn established_names(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|(_, p)| p.sync_state == PeerSyncState::Established)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn infos(&self) -> HashMap<String, PeerInfo> {
        self.peers
            .iter()
            .map(|(name, p)| (name.clone(), p.info()))
            .collect()
    }

    /// The earliest pending retry deadline across all peers, if any.
    pub fn next_retry_deadline(&self) -> Option<Instant> {
        self.peers.values().filter_map(|p| p.next_retry).min()
    }

    /// Names of peers whose retry deadline has passed.
    pub fn due_for_retry(&self, now: Instant) -> Vec<String> {
        self.peers
            .iter()
            .filter(|(_, p)| p.next_retry.is_some_and(|at| at <= now))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
