//! Full-sync bootstrap: snapshot exchange and re-verification.

use astral_dht::cache::PeerStatus;
use astral_dht::DhtError;
use astral_integration_tests::{spawn_node, MeshTransport};
use astral_types::PROTOCOL_VERSION;

#[tokio::test]
async fn snapshot_contains_only_vouched_systems() {
    let mesh = MeshTransport::new();
    let seed = spawn_node(&mesh, "seed", "10.2.0.1:4817");
    let x = spawn_node(&mesh, "member-x", "10.2.0.2:4817");
    let y = spawn_node(&mesh, "member-y", "10.2.0.3:4817");

    x.engine.announce_to(&seed.system).await.expect("x joins");
    y.engine.announce_to(&seed.system).await.expect("y joins");

    let snapshot = seed.engine.full_sync_snapshot().await;
    assert_eq!(snapshot.protocol_version, PROTOCOL_VERSION);
    assert_eq!(snapshot.local_system.id, seed.system.id);
    assert_eq!(snapshot.total_count, snapshot.systems.len() + 1);

    let ids: Vec<_> = snapshot.systems.iter().map(|s| s.id).collect();
    assert!(ids.contains(&x.system.id));
    assert!(ids.contains(&y.system.id));
}

#[tokio::test]
async fn joining_node_reverifies_snapshot_entries() {
    let mesh = MeshTransport::new();
    let seed = spawn_node(&mesh, "seed", "10.2.1.1:4817");
    let x = spawn_node(&mesh, "member-x", "10.2.1.2:4817");
    x.engine.announce_to(&seed.system).await.expect("x joins");

    let newcomer = spawn_node(&mesh, "newcomer", "10.2.1.9:4817");
    let snapshot = seed.engine.full_sync_snapshot().await;
    let learned = newcomer
        .engine
        .apply_snapshot(snapshot)
        .await
        .expect("snapshot applies");
    assert_eq!(learned, 2); // x and the seed itself

    // Liveness is never inherited: everything lands Pending.
    assert_eq!(
        newcomer.engine.peer_status(&x.system.id).await,
        Some(PeerStatus::Pending)
    );
    assert_eq!(
        newcomer.engine.peer_status(&seed.system.id).await,
        Some(PeerStatus::Pending)
    );

    // The gossip-validation path promotes by direct ping.
    newcomer.engine.ping(&x.system).await.expect("verify x");
    assert_eq!(
        newcomer.engine.peer_status(&x.system.id).await,
        Some(PeerStatus::Active)
    );
}

#[tokio::test]
async fn incompatible_snapshot_is_rejected() {
    let mesh = MeshTransport::new();
    let seed = spawn_node(&mesh, "seed", "10.2.2.1:4817");
    let newcomer = spawn_node(&mesh, "newcomer", "10.2.2.2:4817");

    let mut snapshot = seed.engine.full_sync_snapshot().await;
    snapshot.protocol_version = "2.0".to_string();

    let err = newcomer
        .engine
        .apply_snapshot(snapshot)
        .await
        .expect_err("rejected");
    assert!(matches!(err, DhtError::IncompatibleVersion(_)));
}
