//! Shared scaffolding for the end-to-end overlay scenarios.
//!
//! `MeshTransport` wires engines together in-process: a send to a peer
//! address becomes a direct `handle_message` call on the engine registered
//! there. Protocol behavior is exercised without sockets, exactly as the
//! engine's transport trait intends.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use astral_crypto::ed25519::IdentityKey;
use astral_dht::engine::{DhtEngine, Transport};
use astral_dht::messages::DhtMessage;
use astral_dht::storage::InMemoryStorage;
use astral_dht::{DhtConfig, DhtError, Result};
use astral_starfield::{companion_flags, expected_star_class};
use astral_types::{unix_now, Coordinates, System, SystemId};
use uuid::Uuid;

/// Engine type used throughout the scenarios.
pub type TestEngine = DhtEngine<MeshTransport, InMemoryStorage>;

/// In-process transport: a registry of engines keyed by peer address.
#[derive(Clone, Default)]
pub struct MeshTransport {
    nodes: Arc<Mutex<HashMap<String, Arc<TestEngine>>>>,
}

impl MeshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine as reachable at `address`.
    pub fn register(&self, address: &str, engine: Arc<TestEngine>) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.insert(address.to_string(), engine);
        }
    }

    /// Make an address unreachable (simulates a node going dark).
    pub fn unregister(&self, address: &str) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.remove(address);
        }
    }

    fn route(&self, address: &str) -> Option<Arc<TestEngine>> {
        self.nodes.lock().ok().and_then(|n| n.get(address).cloned())
    }
}

impl Transport for MeshTransport {
    fn send(
        &self,
        peer_address: &str,
        message: DhtMessage,
    ) -> impl Future<Output = Result<DhtMessage>> + Send {
        let engine = self.route(peer_address);
        let peer_address = peer_address.to_string();
        async move {
            let engine = engine
                .ok_or_else(|| DhtError::Transport(format!("no route to {peer_address}")))?;
            match engine.handle_message(message).await {
                Ok(Some(reply)) => Ok(reply),
                Ok(None) => Err(DhtError::Transport("peer produced no reply".into())),
                Err(e) => Err(e),
            }
        }
    }
}

/// A node under test: its engine, identity key and public record.
pub struct TestNode {
    pub engine: Arc<TestEngine>,
    pub identity: IdentityKey,
    pub system: System,
}

/// Build a System record with derivation-consistent class and companions.
///
/// The sponsor id is fresh, so receivers validate coordinates leniently.
pub fn make_system(name: &str, address: &str, identity: &IdentityKey) -> System {
    let id = Uuid::new_v4();
    let (binary_star, trinary_star) = companion_flags(&id);
    let now = unix_now();
    System {
        id,
        name: name.to_string(),
        coords: Coordinates::new(150.0, -75.0, 220.0),
        star_class: expected_star_class(&id),
        binary_star,
        trinary_star,
        peer_address: address.to_string(),
        sponsor_id: Some(Uuid::new_v4()),
        public_key: identity.public_key(),
        info_version: 1,
        created_at: now,
        last_seen_at: now,
    }
}

/// Spin up a node and register it on the mesh.
pub fn spawn_node(mesh: &MeshTransport, name: &str, address: &str) -> TestNode {
    spawn_node_with_config(mesh, name, address, DhtConfig::default())
}

/// Spin up a node with a custom engine configuration.
pub fn spawn_node_with_config(
    mesh: &MeshTransport,
    name: &str,
    address: &str,
    config: DhtConfig,
) -> TestNode {
    let identity = IdentityKey::generate();
    let system = make_system(name, address, &identity);
    let engine = DhtEngine::new(
        system.clone(),
        identity.clone(),
        mesh.clone(),
        InMemoryStorage::new(),
        config,
    );
    mesh.register(address, Arc::clone(&engine));
    TestNode {
        engine,
        identity,
        system,
    }
}

/// Ids of the systems a node is currently willing to share.
pub async fn shareable_ids(node: &TestNode) -> Vec<SystemId> {
    node.engine
        .full_sync_snapshot()
        .await
        .systems
        .iter()
        .map(|s| s.id)
        .collect()
}
