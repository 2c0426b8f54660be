//! Spanning-tree flood optimization, end to end.

mod common;

use common::{batch, connect, value, wait_peer_state, wait_value, TestNode, WAIT_ROUNDS, WAIT_STEP};
use trellis_flood::{FloodTopoSetParams, SptInfos, SptMessage, DISTANCE_INFINITY};
use trellis_model::PeerSyncState;
use trellis_net::ChannelNetwork;

async fn spt_node(name: &str, network: &ChannelNetwork) -> TestNode {
    TestNode::with_config(name, &["spine"], network, |config| {
        config.enable_flood_optimization = true;
    })
    .await
}

fn root_info<'a>(infos: &'a SptInfos, root: &str) -> Option<&'a trellis_flood::SptInfo> {
    infos.infos.iter().find(|i| i.root_id == root)
}

#[tokio::test]
async fn test_tree_election_across_triangle() {
    let network = ChannelNetwork::new();
    let alpha = spt_node("alpha", &network).await;
    let beta = spt_node("beta", &network).await;
    let gamma = spt_node("gamma", &network).await;

    connect(&alpha, &beta, "spine").await;
    connect(&beta, &gamma, "spine").await;
    connect(&alpha, &gamma, "spine").await;

    wait_peer_state(&alpha, "spine", "beta", PeerSyncState::Established).await;
    wait_peer_state(&alpha, "spine", "gamma", PeerSyncState::Established).await;
    wait_peer_state(&beta, "spine", "alpha", PeerSyncState::Established).await;
    wait_peer_state(&beta, "spine", "gamma", PeerSyncState::Established).await;
    wait_peer_state(&gamma, "spine", "alpha", PeerSyncState::Established).await;
    wait_peer_state(&gamma, "spine", "beta", PeerSyncState::Established).await;

    // Every node should elect a direct parent toward alpha's root, and alpha
    // should learn both children from their child updates.
    let mut elected = false;
    for _ in 0..WAIT_ROUNDS {
        let beta_infos = beta.service.get_spanning_tree_infos("spine").await.unwrap();
        let gamma_infos = gamma.service.get_spanning_tree_infos("spine").await.unwrap();
        let alpha_infos = alpha.service.get_spanning_tree_infos("spine").await.unwrap();

        let beta_ok = root_info(&beta_infos, "alpha")
            .is_some_and(|i| i.parent.as_deref() == Some("alpha") && i.distance == 1);
        let gamma_ok = root_info(&gamma_infos, "alpha")
            .is_some_and(|i| i.parent.as_deref() == Some("alpha") && i.distance == 1);
        let alpha_ok = root_info(&alpha_infos, "alpha")
            .is_some_and(|i| i.children.contains("beta") && i.children.contains("gamma"));

        if beta_ok && gamma_ok && alpha_ok {
            elected = true;
            break;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    assert!(elected, "spanning tree for alpha's root never converged");

    // Flooding along the restricted tree still converges everywhere.
    alpha
        .handle("spine")
        .set_key_vals(batch(&[("adj:alpha", value(1, "alpha", "up", 60_000))]))
        .await
        .unwrap();
    wait_value(&[&beta, &gamma], "spine", "adj:alpha", b"up").await;
}

#[tokio::test]
async fn test_dual_surface_reports_unreachable_without_feasible_successor() {
    let network = ChannelNetwork::new();
    let alpha = spt_node("alpha", &network).await;

    // A distance report from a node that is not an up neighbor: no feasible
    // successor exists, so the root must stay unreachable.
    alpha
        .service
        .process_kv_store_dual_message(
            "stranger",
            vec![SptMessage::Distance {
                root_id: "far-root".into(),
                distance: 3,
            }],
            "spine",
        )
        .await
        .unwrap();

    let infos = alpha.service.get_spanning_tree_infos("spine").await.unwrap();
    let far = root_info(&infos, "far-root").expect("root tracked");
    assert_eq!(far.parent, None);
    assert_eq!(far.distance, DISTANCE_INFINITY);
}

#[tokio::test]
async fn test_flood_topology_child_update_surface() {
    let network = ChannelNetwork::new();
    let alpha = spt_node("alpha", &network).await;

    alpha
        .service
        .update_flood_topology_child(
            FloodTopoSetParams {
                root_id: Some("alpha".into()),
                peer_name: "beta".into(),
                set_child: true,
                all_roots: false,
            },
            "spine",
        )
        .await
        .unwrap();

    let infos = alpha.service.get_spanning_tree_infos("spine").await.unwrap();
    assert!(root_info(&infos, "alpha").unwrap().children.contains("beta"));

    alpha
        .service
        .update_flood_topology_child(
            FloodTopoSetParams {
                root_id: None,
                peer_name: "beta".into(),
                set_child: false,
                all_roots: true,
            },
            "spine",
        )
        .await
        .unwrap();
    let infos = alpha.service.get_spanning_tree_infos("spine").await.unwrap();
    assert!(root_info(&infos, "alpha").unwrap().children.is_empty());
}
