//! Iterative lookup and gossip-freshness scenarios.

use astral_dht::bootstrap::FullSyncSnapshot;
use astral_dht::cache::PeerStatus;
use astral_integration_tests::{make_system, shareable_ids, spawn_node, MeshTransport};
use astral_crypto::ed25519::IdentityKey;
use astral_types::{unix_now, PROTOCOL_VERSION};

#[tokio::test]
async fn iterative_lookup_finds_target_two_hops_away() {
    let mesh = MeshTransport::new();
    let a = spawn_node(&mesh, "alpha", "10.1.0.1:4817");
    let s = spawn_node(&mesh, "seed", "10.1.0.2:4817");
    let t = spawn_node(&mesh, "target", "10.1.0.3:4817");

    // S can vouch for T; A only knows S.
    t.engine.announce_to(&s.system).await.expect("announce");
    a.engine.ping(&s.system).await.expect("ping seed");

    let outcome = a
        .engine
        .find_node(t.system.id)
        .await
        .expect("lookup completes");
    let found = outcome.found.expect("target discovered");
    assert_eq!(found.id, t.system.id);
    assert!(outcome.hops <= 3, "took {} hops", outcome.hops);
    assert!(outcome.queried >= 1);

    // The discovery landed in A's cache as unverified gossip.
    assert_eq!(
        a.engine.peer_status(&t.system.id).await,
        Some(PeerStatus::Pending)
    );
}

#[tokio::test]
async fn cached_target_returns_without_queries() {
    let mesh = MeshTransport::new();
    let a = spawn_node(&mesh, "alpha", "10.1.1.1:4817");
    let b = spawn_node(&mesh, "beta", "10.1.1.2:4817");

    a.engine.ping(&b.system).await.expect("ping");
    let outcome = a.engine.find_node(b.system.id).await.expect("lookup");
    assert_eq!(outcome.hops, 0);
    assert_eq!(outcome.queried, 0);
    assert_eq!(outcome.found.expect("cached").id, b.system.id);
}

#[tokio::test]
async fn lookup_with_no_peers_returns_empty() {
    let mesh = MeshTransport::new();
    let a = spawn_node(&mesh, "loner", "10.1.2.1:4817");

    let outcome = a
        .engine
        .find_node(uuid::Uuid::new_v4())
        .await
        .expect("no peers is not an error");
    assert!(outcome.found.is_none());
    assert_eq!(outcome.queried, 0);
}

#[tokio::test]
async fn unverified_gossip_is_not_forwarded() {
    let mesh = MeshTransport::new();
    let a = spawn_node(&mesh, "alpha", "10.1.3.1:4817");
    let b = spawn_node(&mesh, "beta", "10.1.3.2:4817");

    // A hears about D through a snapshot but never verifies it.
    let ghost_keys = IdentityKey::generate();
    let ghost = make_system("ghost", "10.1.3.99:4817", &ghost_keys);
    let seed = spawn_node(&mesh, "seed", "10.1.3.3:4817");
    let mut snapshot = seed.engine.full_sync_snapshot().await;
    snapshot.systems.push(ghost.clone());
    a.engine.apply_snapshot(snapshot).await.expect("seeded");
    assert_eq!(
        a.engine.peer_status(&ghost.id).await,
        Some(PeerStatus::Pending)
    );

    // A never shares what it cannot vouch for.
    assert!(!shareable_ids(&a).await.contains(&ghost.id));

    // So B's lookup through A comes back empty.
    b.engine.ping(&a.system).await.expect("ping");
    let outcome = b.engine.find_node(ghost.id).await.expect("lookup");
    assert!(outcome.found.is_none());
    assert!(outcome.queried >= 1);
}

#[tokio::test]
async fn stale_gossip_never_downgrades_info() {
    let mesh = MeshTransport::new();
    let a = spawn_node(&mesh, "alpha", "10.1.4.1:4817");
    let p1 = spawn_node(&mesh, "peer-1", "10.1.4.2:4817");
    let p2 = spawn_node(&mesh, "peer-2", "10.1.4.3:4817");

    let subject_keys = IdentityKey::generate();
    let mut current = make_system("subject", "10.1.4.9:4817", &subject_keys);
    current.info_version = 10;
    current.name = "subject-current".to_string();

    let mut stale = current.clone();
    stale.info_version = 5;
    stale.name = "subject-old".to_string();

    let snapshot_with = |seed: &astral_integration_tests::TestNode, system| FullSyncSnapshot {
        protocol_version: PROTOCOL_VERSION.to_string(),
        timestamp: unix_now(),
        local_system: seed.system.clone(),
        systems: vec![system],
        total_count: 2,
    };

    a.engine
        .apply_snapshot(snapshot_with(&p1, current.clone()))
        .await
        .expect("current version");
    a.engine
        .apply_snapshot(snapshot_with(&p2, stale))
        .await
        .expect("stale version ignored");

    let entry = a.engine.peer_entry(&current.id).await.expect("entry");
    assert_eq!(entry.system.info_version, 10);
    assert_eq!(entry.system.name, "subject-current");
}
