//! Full-sync bootstrap.
//!
//! A joining node asks a seed for a one-shot snapshot: the seed's own record
//! plus everything the seed can vouch for (verified within the cutoff). The
//! receiver treats every snapshot entry as Pending (liveness is never
//! inherited), and the gossip-validation loop re-verifies each system by ping
//! before it is promoted or shared onward.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use astral_starfield::validate_star_class;
use astral_types::{unix_now, System, PROTOCOL_VERSION};

use crate::engine::{DhtEngine, Transport};
use crate::storage::Storage;
use crate::validation::check_version;
use crate::Result;

/// The bootstrap snapshot exchanged over `/api/full-sync`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullSyncSnapshot {
    pub protocol_version: String,
    pub timestamp: u64,
    pub local_system: System,
    pub systems: Vec<System>,
    pub total_count: usize,
}

impl<T: Transport, S: Storage> DhtEngine<T, S> {
    /// Build the snapshot this node serves to joining peers.
    pub async fn full_sync_snapshot(&self) -> FullSyncSnapshot {
        let local_system = self.local_system().await;
        let systems = self.cache.read().await.shareable(unix_now());
        let total_count = systems.len() + 1;
        FullSyncSnapshot {
            protocol_version: PROTOCOL_VERSION.to_string(),
            timestamp: unix_now(),
            local_system,
            systems,
            total_count,
        }
    }

    /// Ingest a seed's snapshot. Every entry lands as Pending; records whose
    /// star class fails derivation are skipped. Returns the number of newly
    /// learned systems.
    pub async fn apply_snapshot(&self, snapshot: FullSyncSnapshot) -> Result<usize> {
        check_version(&snapshot.protocol_version)?;

        let seed_id = snapshot.local_system.id;
        let now = unix_now();
        let mut inserted = 0usize;

        let mut all = snapshot.systems;
        all.push(snapshot.local_system);

        for system in all {
            if let Err(e) = validate_star_class(&system, self.config.isolated_network) {
                debug!(system_id = %system.id, error = %e, "Skipping snapshot entry");
                continue;
            }
            if self.cache_gossip(system, seed_id, now).await? {
                inserted += 1;
            }
        }

        info!(seed = %seed_id, learned = inserted, "Applied full-sync snapshot");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serde_shape() {
        let json = serde_json::json!({
            "protocol_version": "1.0",
            "timestamp": 1_750_000_000u64,
            "local_system": {
                "id": "2a0b8b5e-4d5f-4a0e-9c8f-0f3b5d1c2a3b",
                "name": "seed",
                "coords": {"x": 0.0, "y": 0.0, "z": 0.0},
                "star_class": "M",
                "peer_address": "192.0.2.10:4817",
                "public_key": "11".repeat(32),
                "created_at": 0,
                "last_seen_at": 0,
            },
            "systems": [],
            "total_count": 1,
        });
        let snapshot: FullSyncSnapshot = serde_json::from_value(json).expect("parse");
        assert_eq!(snapshot.protocol_version, "1.0");
        assert_eq!(snapshot.total_count, 1);
        assert!(snapshot.systems.is_empty());
    }
}
