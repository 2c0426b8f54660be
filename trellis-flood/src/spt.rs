//! DUAL-style spanning-tree election for flood optimization.
//!
//! Each reachable root gets a directed tree: the local node picks a
//! successor (parent) among its neighbors under the feasibility condition
//! (a neighbor's reported distance must be strictly below the local feasible
//! distance), and learns its children from flood-topology child updates.
//! The flooder restricts forwarding to tree edges when a tree is elected;
//! with no feasible successor the root is unreachable and flooding falls
//! back to split-horizon broadcast, so convergence never depends on this
//! module.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use trellis_proto::DualMessage;

/// Reported distance meaning "unreachable".
pub const DISTANCE_INFINITY: u64 = u64::MAX;

/// A spanning-tree message, decoded from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SptMessage {
    /// Sender's reported distance to `root_id`.
    Distance { root_id: String, distance: u64 },
    /// Attach or detach `child` on the receiver's tree for `root_id`.
    ChildUpdate {
        root_id: String,
        child: String,
        enable: bool,
    },
}

impl From<SptMessage> for DualMessage {
    fn from(msg: SptMessage) -> Self {
        match msg {
            SptMessage::Distance { root_id, distance } => DualMessage {
                root_id,
                distance,
                child: None,
                set_child: None,
            },
            SptMessage::ChildUpdate {
                root_id,
                child,
                enable,
            } => DualMessage {
                root_id,
                distance: 0,
                child: Some(child),
                set_child: Some(enable),
            },
        }
    }
}

impl From<DualMessage> for SptMessage {
    fn from(msg: DualMessage) -> Self {
        match (msg.child, msg.set_child) {
            (Some(child), set_child) => SptMessage::ChildUpdate {
                root_id: msg.root_id,
                child,
                enable: set_child.unwrap_or(true),
            },
            (None, _) => SptMessage::Distance {
                root_id: msg.root_id,
                distance: msg.distance,
            },
        }
    }
}

/// Flood-topology child update as supplied on the request surface.
#[derive(Clone, Debug, Default)]
pub struct FloodTopoSetParams {
    /// Target root; ignored when `all_roots` is set.
    pub root_id: Option<String>,
    pub peer_name: String,
    pub set_child: bool,
    pub all_roots: bool,
}

/// Per-root tree view for introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SptInfo {
    pub root_id: String,
    pub distance: u64,
    /// Successor toward the root; `None` when this node is the root or the
    /// root is unreachable.
    pub parent: Option<String>,
    pub children: BTreeSet<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SptInfos {
    pub infos: Vec<SptInfo>,
}

/// Messages produced by a topology change, split by addressing.
#[derive(Debug, Default)]
pub struct SptDelta {
    /// Distance updates for every neighbor.
    pub broadcast: Vec<SptMessage>,
    /// Child attach/detach updates for specific peers.
    pub directed: Vec<(String, SptMessage)>,
}

impl SptDelta {
    pub fn is_empty(&self) -> bool {
        self.broadcast.is_empty() && self.directed.is_empty()
    }
}

#[derive(Debug, Default)]
struct RootState {
    /// Neighbor name → distance that neighbor reported for this root.
    reported: HashMap<String, u64>,
    successor: Option<String>,
    distance: u64,
    feasible_distance: u64,
    children: BTreeSet<String>,
}

/// Spanning-tree election state for one area.
#[derive(Debug)]
pub struct SptState {
    node_id: String,
    /// Neighbor name → link cost. Only up neighbors are present.
    neighbors: HashMap<String, u64>,
    roots: BTreeMap<String, RootState>,
}

impl SptState {
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let mut roots = BTreeMap::new();
        // This node roots its own tree at distance zero.
        roots.insert(
            node_id.clone(),
            RootState {
                distance: 0,
                feasible_distance: 0,
                ..Default::default()
            },
        );
        Self {
            node_id,
            neighbors: HashMap::new(),
            roots,
        }
    }

    /// A neighbor came up with the given link cost.
    pub fn peer_up(&mut self, peer: &str, cost: u64) -> SptDelta {
        self.neighbors.insert(peer.to_string(), cost);
        self.recompute_all()
    }

    /// A neighbor went away: drop its reports and child registrations.
    pub fn peer_down(&mut self, peer: &str) -> SptDelta {
        self.neighbors.remove(peer);
        for root in self.roots.values_mut() {
            root.reported.remove(peer);
            root.children.remove(peer);
        }
        self.recompute_all()
    }

    /// Apply messages received from `from`, returning resulting updates.
    pub fn handle_messages(&mut self, from: &str, messages: Vec<SptMessage>) -> SptDelta {
        let mut delta = SptDelta::default();
        for msg in messages {
            match msg {
                SptMessage::Distance { root_id, distance } => {
                    if root_id == self.node_id {
                        // Nobody else gets to report our own root closer
                        // than ourselves; ignore.
                        continue;
                    }
                    let root = self.roots.entry(root_id.clone()).or_insert_with(|| {
                        RootState {
                            distance: DISTANCE_INFINITY,
                            feasible_distance: DISTANCE_INFINITY,
                            ..Default::default()
                        }
                    });
                    root.reported.insert(from.to_string(), distance);
                    let d = self.recompute_root(&root_id);
                    delta.broadcast.extend(d.broadcast);
                    delta.directed.extend(d.directed);
                }
                SptMessage::ChildUpdate {
                    root_id,
                    child,
                    enable,
                } => {
                    self.apply_child(&root_id, &child, enable);
                }
            }
        }
        delta
    }

    /// Flood-topology child update from the request surface.
    pub fn set_child(&mut self, params: &FloodTopoSetParams) {
        if params.all_roots {
            let roots: Vec<String> = self.roots.keys().cloned().collect();
            for root in roots {
                self.apply_child(&root, &params.peer_name, params.set_child);
            }
        } else if let Some(root) = &params.root_id {
            self.apply_child(root, &params.peer_name, params.set_child);
        }
    }

    fn apply_child(&mut self, root_id: &str, child: &str, enable: bool) {
        let root = self.roots.entry(root_id.to_string()).or_insert_with(|| {
            RootState {
                distance: DISTANCE_INFINITY,
                feasible_distance: DISTANCE_INFINITY,
                ..Default::default()
            }
        });
        if enable {
            root.children.insert(child.to_string());
        } else {
            root.children.remove(child);
        }
    }

    /// Current distance advertisements, for seeding a newly-synced peer.
    pub fn advertisements(&self) -> Vec<SptMessage> {
        self.roots
            .iter()
            .map(|(root_id, root)| SptMessage::Distance {
                root_id: root_id.clone(),
                distance: root.distance,
            })
            .collect()
    }

    /// Tree edges (successor + children) for a root, when a tree is elected.
    /// `None` means no usable tree: caller falls back to broadcast.
    pub fn flood_edges(&self, root_id: &str) -> Option<HashSet<String>> {
        let root = self.roots.get(root_id)?;
        if root_id != self.node_id && root.successor.is_none() {
            return None;
        }
        let mut edges: HashSet<String> = root.children.iter().cloned().collect();
        if let Some(successor) = &root.successor {
            edges.insert(successor.clone());
        }
        if edges.is_empty() {
            return None;
        }
        Some(edges)
    }

    pub fn infos(&self) -> SptInfos {
        SptInfos {
            infos: self
                .roots
                .iter()
                .map(|(root_id, root)| SptInfo {
                    root_id: root_id.clone(),
                    distance: root.distance,
                    parent: root.successor.clone(),
                    children: root.children.clone(),
                })
                .collect(),
        }
    }

    fn recompute_all(&mut self) -> SptDelta {
        let roots: Vec<String> = self.roots.keys().cloned().collect();
        let mut delta = SptDelta::default();
        for root in roots {
            let d = self.recompute_root(&root);
            delta.broadcast.extend(d.broadcast);
            delta.directed.extend(d.directed);
        }
        delta
    }

    /// Run successor selection for one root under the feasibility condition.
    fn recompute_root(&mut self, root_id: &str) -> SptDelta {
        let mut delta = SptDelta::default();
        if root_id == self.node_id {
            return delta;
        }
        let Some(root) = self.roots.get_mut(root_id) else {
            return delta;
        };

        let old_distance = root.distance;
        let old_successor = root.successor.clone();

        let mut elected = Self::elect(&self.neighbors, root, root.feasible_distance);
        if elected.is_none() {
            // No feasible successor: treat as a completed diffusing
            // computation, reset the feasible distance, and retry once.
            root.feasible_distance = DISTANCE_INFINITY;
            elected = Self::elect(&self.neighbors, root, DISTANCE_INFINITY);
        }

        match elected {
            Some((successor, distance)) => {
                root.successor = Some(successor);
                root.distance = distance;
                root.feasible_distance = root.feasible_distance.min(distance);
            }
            None => {
                root.successor = None;
                root.distance = DISTANCE_INFINITY;
                root.feasible_distance = DISTANCE_INFINITY;
            }
        }

        if root.distance != old_distance {
            delta.broadcast.push(SptMessage::Distance {
                root_id: root_id.to_string(),
                distance: root.distance,
            });
        }
        if root.successor != old_successor {
            if let Some(old) = old_successor {
                delta.directed.push((
                    old,
                    SptMessage::ChildUpdate {
                        root_id: root_id.to_string(),
                        child: self.node_id.clone(),
                        enable: false,
                    },
                ));
            }
            if let Some(new) = root.successor.clone() {
                delta.directed.push((
                    new,
                    SptMessage::ChildUpdate {
                        root_id: root_id.to_string(),
                        child: self.node_id.clone(),
                        enable: true,
                    },
                ));
            }
        }
        delta
    }

    /// Pick the feasible successor with the lowest total distance,
    /// tie-broken by peer name for determinism.
    fn elect(
        neighbors: &HashMap<String, u64>,
        root: &RootState,
        feasible_distance: u64,
    ) -> Option<(String, u64)> {
        let mut best: Option<(String, u64)> = None;
        for (peer, cost) in neighbors {
            let Some(&reported) = root.reported.get(peer) else {
                continue;
            };
            if reported == DISTANCE_INFINITY || reported >= feasible_distance {
                continue;
            }
            let total = reported.saturating_add(*cost);
            let better = match &best {
                None => true,
                Some((best_peer, best_distance)) => {
                    total < *best_distance || (total == *best_distance && peer < best_peer)
                }
            };
            if better {
                best = Some((peer.clone(), total));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(root: &str, d: u64) -> SptMessage {
        SptMessage::Distance {
            root_id: root.into(),
            distance: d,
        }
    }

    #[test]
    fn test_own_root_at_distance_zero() {
        let spt = SptState::new("me");
        let infos = spt.infos();
        assert_eq!(infos.infos.len(), 1);
        assert_eq!(infos.infos[0].root_id, "me");
        assert_eq!(infos.infos[0].distance, 0);
        assert_eq!(infos.infos[0].parent, None);
    }

    #[test]
    fn test_successor_election_prefers_lower_distance() {
        let mut spt = SptState::new("me");
        spt.peer_up("a", 1);
        spt.peer_up("b", 1);
        spt.handle_messages("a", vec![distance("r", 5)]);
        let delta = spt.handle_messages("b", vec![distance("r", 1)]);

        let infos = spt.infos();
        let root = infos.infos.iter().find(|i| i.root_id == "r").unwrap();
        assert_eq!(root.parent.as_deref(), Some("b"));
        assert_eq!(root.distance, 2);
        // The switch to "b" notifies both the old and the new parent.
        assert!(delta
            .directed
            .iter()
            .any(|(to, m)| to == "b"
                && matches!(m, SptMessage::ChildUpdate { enable: true, .. })));
    }

    #[test]
    fn test_equal_distance_tie_breaks_by_name() {
        let mut spt = SptState::new("me");
        spt.peer_up("b", 1);
        spt.peer_up("a", 1);
        spt.handle_messages("b", vec![distance("r", 3)]);
        spt.handle_messages("a", vec![distance("r", 3)]);

        let infos = spt.infos();
        let root = infos.infos.iter().find(|i| i.root_id == "r").unwrap();
        assert_eq!(root.parent.as_deref(), Some("a"));
    }

    #[test]
    fn test_peer_down_reelects_or_goes_unreachable() {
        let mut spt = SptState::new("me");
        spt.peer_up("a", 1);
        spt.peer_up("b", 1);
        spt.handle_messages("a", vec![distance("r", 1)]);
        spt.handle_messages("b", vec![distance("r", 4)]);

        let delta = spt.peer_down("a");
        let infos = spt.infos();
        let root = infos.infos.iter().find(|i| i.root_id == "r").unwrap();
        assert_eq!(root.parent.as_deref(), Some("b"));
        assert_eq!(root.distance, 5);
        assert!(delta
            .broadcast
            .iter()
            .any(|m| matches!(m, SptMessage::Distance { distance: 5, .. })));

        spt.peer_down("b");
        let infos = spt.infos();
        let root = infos.infos.iter().find(|i| i.root_id == "r").unwrap();
        assert_eq!(root.parent, None);
        assert_eq!(root.distance, DISTANCE_INFINITY);
        assert!(spt.flood_edges("r").is_none());
    }

    #[test]
    fn test_children_join_flood_edges() {
        let mut spt = SptState::new("me");
        spt.peer_up("a", 1);
        spt.peer_up("c", 1);
        spt.handle_messages("a", vec![distance("r", 0)]);
        spt.handle_messages(
            "c",
            vec![SptMessage::ChildUpdate {
                root_id: "r".into(),
                child: "c".into(),
                enable: true,
            }],
        );

        let edges = spt.flood_edges("r").unwrap();
        assert!(edges.contains("a"));
        assert!(edges.contains("c"));

        spt.handle_messages(
            "c",
            vec![SptMessage::ChildUpdate {
                root_id: "r".into(),
                child: "c".into(),
                enable: false,
            }],
        );
        let edges = spt.flood_edges("r").unwrap();
        assert!(!edges.contains("c"));
    }

    #[test]
    fn test_own_root_edges_come_from_children_only() {
        let mut spt = SptState::new("me");
        spt.peer_up("a", 1);
        assert!(spt.flood_edges("me").is_none());

        spt.handle_messages(
            "a",
            vec![SptMessage::ChildUpdate {
                root_id: "me".into(),
                child: "a".into(),
                enable: true,
            }],
        );
        let edges = spt.flood_edges("me").unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges.contains("a"));
    }

    #[test]
    fn test_distance_update_ignored_for_own_root() {
        let mut spt = SptState::new("me");
        spt.peer_up("a", 1);
        let delta = spt.handle_messages("a", vec![distance("me", 0)]);
        assert!(delta.is_empty());
        let infos = spt.infos();
        let own = infos.infos.iter().find(|i| i.root_id == "me").unwrap();
        assert_eq!(own.distance, 0);
        assert_eq!(own.parent, None);
    }

    #[test]
    fn test_wire_roundtrip() {
        let msgs = vec![
            distance("r", 7),
            SptMessage::ChildUpdate {
                root_id: "r".into(),
                child: "x".into(),
                enable: false,
            },
        ];
        for msg in msgs {
            let wire: DualMessage = msg.clone().into();
            let back: SptMessage = wire.into();
            assert_eq!(back, msg);
        }
    }
}
