//! astral-daemon: the Astral overlay node.
//!
//! Single OS process on a Tokio runtime: SQLite state, the DHT engine with
//! its maintenance loops, and the JSON-over-HTTP wire listener.

mod config;
mod identity;
mod store;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use astral_dht::cache::CachedSystem;
use astral_dht::engine::DhtEngine;
use astral_dht::storage::Storage;
use astral_starfield::{companion_flags, expected_star_class, place_system};
use astral_transport::HttpTransport;
use astral_types::{unix_now, Coordinates, StarClass, System, SystemId, GENESIS_SYSTEM_ID};

use crate::config::DaemonConfig;
use crate::store::SqliteStorage;

type Engine = DhtEngine<HttpTransport, SqliteStorage>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("astral={}", config.log.level).parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Astral daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    // Unrecoverable startup failures: storage open, key load, bind.
    let conn = astral_db::open_in(&data_dir)
        .with_context(|| format!("opening peer-state database in {}", data_dir.display()))?;
    let storage = SqliteStorage::new(conn);

    let node_key = identity::load_or_create_identity(&data_dir.join("identity.key"))?;
    let system_id = identity::derive_system_id(&config.identity);
    info!(%system_id, "Local identity ready");

    let transport = HttpTransport::new(config.dht_config().request_timeout)
        .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;

    let local = build_local_system(&config, &storage, &transport, system_id, &node_key).await?;
    info!(
        name = %local.name,
        star_class = %local.star_class,
        x = local.coords.x,
        y = local.coords.y,
        z = local.coords.z,
        "Local system record"
    );

    let engine: Arc<Engine> = DhtEngine::new(
        local.clone(),
        node_key,
        transport.clone(),
        storage,
        config.dht_config(),
    );

    let restored = engine
        .warm_start()
        .await
        .map_err(|e| anyhow::anyhow!("loading persisted state: {e}"))?;
    info!(restored, "Engine state loaded");

    // Persist our own record so created_at and info_version survive restarts.
    let now = unix_now();
    engine
        .storage()
        .save_peer_system(&CachedSystem {
            system: local.clone(),
            learned_at: local.created_at,
            learned_from: local.id,
            verified: true,
            last_verified: Some(now),
            last_gossip_heard: now,
            fail_count: 0,
        })
        .map_err(|e| anyhow::anyhow!("persisting local record: {e}"))?;

    let listener = tokio::net::TcpListener::bind(&config.network.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.network.listen_addr))?;

    let maintenance = engine.spawn_maintenance();

    let server_engine = Arc::clone(&engine);
    let server = tokio::spawn(async move { astral_transport::serve(server_engine, listener).await });

    bootstrap_from_seeds(&engine, &transport, &config).await;

    let mut shutdown_rx = engine.subscribe_shutdown();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
    }

    engine.trigger_shutdown();
    for handle in maintenance {
        let _ = handle.await;
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Wire listener exited with error"),
        Err(e) => warn!(error = %e, "Wire listener task failed"),
    }

    info!("Daemon stopped");
    Ok(())
}

/// Construct the local System record.
///
/// Placement follows the sponsor chain: a configured sponsor fixes the
/// coordinates via the deterministic offset; without one, the node may only
/// start as the genesis X root (or an isolated-network root).
async fn build_local_system(
    config: &DaemonConfig,
    storage: &SqliteStorage,
    transport: &HttpTransport,
    system_id: SystemId,
    node_key: &astral_crypto::ed25519::IdentityKey,
) -> anyhow::Result<System> {
    let now = unix_now();

    // A previous run's record keeps created_at and info_version stable.
    let prior = storage
        .get_all_peer_systems_with_meta()
        .map_err(|e| anyhow::anyhow!("loading persisted state: {e}"))?
        .into_iter()
        .find(|row| row.system.id == system_id);
    let (created_at, info_version) = prior
        .as_ref()
        .map(|row| (row.system.created_at, row.system.info_version))
        .unwrap_or((now, 1));

    let name = identity::display_name(&config.identity);
    let peer_address = config.advertise_address();

    if config.identity.sponsor_id.is_empty() {
        if system_id != GENESIS_SYSTEM_ID && !config.dht.isolated_network {
            anyhow::bail!(
                "no sponsor configured: set [identity].sponsor_id, or enable \
                 [dht].isolated_network to root a private network"
            );
        }
        return Ok(System {
            id: system_id,
            name,
            coords: Coordinates::ORIGIN,
            star_class: StarClass::X,
            binary_star: false,
            trinary_star: false,
            peer_address,
            sponsor_id: None,
            public_key: node_key.public_key(),
            info_version,
            created_at,
            last_seen_at: now,
        });
    }

    let sponsor_id: SystemId = config
        .identity
        .sponsor_id
        .parse()
        .context("parsing [identity].sponsor_id")?;
    let sponsor = locate_sponsor(storage, transport, config, sponsor_id).await?;
    let coords = place_system(&system_id, &sponsor_id, &sponsor.coords);
    let (binary_star, trinary_star) = companion_flags(&system_id);

    Ok(System {
        id: system_id,
        name,
        coords,
        star_class: expected_star_class(&system_id),
        binary_star,
        trinary_star,
        peer_address,
        sponsor_id: Some(sponsor_id),
        public_key: node_key.public_key(),
        info_version,
        created_at,
        last_seen_at: now,
    })
}

/// Find the sponsor's record: persisted state first, then seed snapshots.
async fn locate_sponsor(
    storage: &SqliteStorage,
    transport: &HttpTransport,
    config: &DaemonConfig,
    sponsor_id: SystemId,
) -> anyhow::Result<System> {
    if let Some(row) = storage
        .get_all_peer_systems_with_meta()
        .map_err(|e| anyhow::anyhow!("loading persisted state: {e}"))?
        .into_iter()
        .find(|row| row.system.id == sponsor_id)
    {
        return Ok(row.system);
    }

    for seed in &config.network.bootstrap_seeds {
        match transport.fetch_full_sync(seed).await {
            Ok(snapshot) => {
                if snapshot.local_system.id == sponsor_id {
                    return Ok(snapshot.local_system);
                }
                if let Some(system) = snapshot.systems.into_iter().find(|s| s.id == sponsor_id) {
                    return Ok(system);
                }
            }
            Err(e) => warn!(seed, error = %e, "Seed snapshot fetch failed"),
        }
    }

    anyhow::bail!("sponsor {sponsor_id} not found in persisted state or any seed snapshot")
}

/// One-shot seed bootstrap: pull snapshots, then make ourselves known.
async fn bootstrap_from_seeds(
    engine: &Arc<Engine>,
    transport: &HttpTransport,
    config: &DaemonConfig,
) {
    for seed in &config.network.bootstrap_seeds {
        let snapshot = match transport.fetch_full_sync(seed).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(seed, error = %e, "Bootstrap snapshot fetch failed");
                continue;
            }
        };
        let seed_system = snapshot.local_system.clone();
        match engine.apply_snapshot(snapshot).await {
            Ok(learned) => info!(seed, learned, "Bootstrap snapshot applied"),
            Err(e) => {
                warn!(seed, error = %e, "Bootstrap snapshot rejected");
                continue;
            }
        }
        if let Err(e) = engine.announce_to(&seed_system).await {
            warn!(seed, error = %e, "Announce to seed failed");
        }
    }
}
