//! SQLite-backed implementation of the engine's storage contract.

use std::sync::Mutex;

use rusqlite::Connection;

use astral_db::queries::{attestations, connections, identity, peers};
use astral_db::DbError;
use astral_dht::cache::CachedSystem;
use astral_dht::storage::{BindingCheck, ConnectionEdge, Storage};
use astral_dht::{DhtError, Result};
use astral_types::{Attestation, SystemId};

/// Storage over a single SQLite connection.
///
/// The engine treats storage as externally synchronized; the mutex provides
/// that here.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> astral_db::Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DhtError::Storage("database lock poisoned".into()))?;
        f(&conn).map_err(map_db_error)
    }
}

fn map_db_error(e: DbError) -> DhtError {
    match e {
        DbError::NotFound(what) => DhtError::NotFound(what),
        other => DhtError::Storage(other.to_string()),
    }
}

fn to_row(entry: &CachedSystem) -> peers::PeerRow {
    peers::PeerRow {
        system: entry.system.clone(),
        learned_at: entry.learned_at,
        learned_from: entry.learned_from,
        verified: entry.verified,
        last_verified: entry.last_verified,
        last_gossip_heard: entry.last_gossip_heard,
        fail_count: entry.fail_count,
    }
}

fn from_row(row: peers::PeerRow) -> CachedSystem {
    CachedSystem {
        system: row.system,
        learned_at: row.learned_at,
        learned_from: row.learned_from,
        verified: row.verified,
        last_verified: row.last_verified,
        last_gossip_heard: row.last_gossip_heard,
        fail_count: row.fail_count,
    }
}

impl Storage for SqliteStorage {
    fn save_peer_system(&self, entry: &CachedSystem) -> Result<()> {
        self.with_conn(|conn| peers::upsert(conn, &to_row(entry)))
    }

    fn touch_peer_system(&self, id: &SystemId, last_seen_at: u64) -> Result<()> {
        self.with_conn(|conn| peers::touch(conn, id, last_seen_at))
    }

    fn get_all_peer_systems_with_meta(&self) -> Result<Vec<CachedSystem>> {
        let rows = self.with_conn(peers::all)?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    fn save_attestation(
        &self,
        attestation: &Attestation,
        receiver: &SystemId,
        received_at: u64,
    ) -> Result<()> {
        self.with_conn(|conn| attestations::insert(conn, attestation, receiver, received_at))
    }

    fn get_attestations(&self, id: &SystemId) -> Result<Vec<Attestation>> {
        self.with_conn(|conn| attestations::for_sender(conn, id))
    }

    fn save_peer_connections(
        &self,
        from: &SystemId,
        peers: &[SystemId],
        observed_at: u64,
    ) -> Result<()> {
        self.with_conn(|conn| connections::record(conn, from, peers, observed_at))
    }

    fn get_connections(&self, max_age_secs: u64, now: u64) -> Result<Vec<ConnectionEdge>> {
        let edges = self.with_conn(|conn| connections::all_recent(conn, max_age_secs, now))?;
        Ok(edges
            .into_iter()
            .map(|e| ConnectionEdge {
                from: e.from,
                peer: e.peer,
                observed_at: e.observed_at,
            })
            .collect())
    }

    fn validate_identity_binding(
        &self,
        id: &SystemId,
        public_key: &[u8; 32],
        now: u64,
    ) -> Result<BindingCheck> {
        let check = self.with_conn(|conn| identity::validate_binding(conn, id, public_key, now))?;
        Ok(BindingCheck {
            ok: check.ok,
            is_new: check.is_new,
        })
    }

    fn delete_peer_system(&self, id: &SystemId) -> Result<()> {
        self.with_conn(|conn| peers::delete(conn, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astral_starfield::expected_star_class;
    use astral_types::{Coordinates, System};
    use uuid::Uuid;

    fn storage() -> SqliteStorage {
        SqliteStorage::new(astral_db::open_memory().expect("open memory db"))
    }

    fn entry(id: SystemId) -> CachedSystem {
        CachedSystem {
            system: System {
                id,
                name: "sqlite-test".to_string(),
                coords: Coordinates::new(4.0, 5.0, 6.0),
                star_class: expected_star_class(&id),
                binary_star: false,
                trinary_star: false,
                peer_address: "203.0.113.4:4817".to_string(),
                sponsor_id: Some(Uuid::new_v4()),
                public_key: [8u8; 32],
                info_version: 2,
                created_at: 50,
                last_seen_at: 60,
            },
            learned_at: 55,
            learned_from: id,
            verified: true,
            last_verified: Some(60),
            last_gossip_heard: 60,
            fail_count: 0,
        }
    }

    #[test]
    fn test_peer_roundtrip_through_sqlite() {
        let storage = storage();
        let id = Uuid::new_v4();
        storage.save_peer_system(&entry(id)).expect("save");

        let all = storage.get_all_peer_systems_with_meta().expect("load");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].system.id, id);
        assert_eq!(all[0].last_verified, Some(60));

        storage.delete_peer_system(&id).expect("delete");
        assert!(storage
            .get_all_peer_systems_with_meta()
            .expect("load")
            .is_empty());
    }

    #[test]
    fn test_binding_through_sqlite() {
        let storage = storage();
        let id = Uuid::new_v4();
        let first = storage
            .validate_identity_binding(&id, &[1u8; 32], 100)
            .expect("bind");
        assert!(first.ok && first.is_new);
        let spoof = storage
            .validate_identity_binding(&id, &[2u8; 32], 200)
            .expect("check");
        assert!(!spoof.ok);
    }

    #[test]
    fn test_touch_missing_is_not_found() {
        let storage = storage();
        let result = storage.touch_peer_system(&Uuid::new_v4(), 1);
        assert!(matches!(result, Err(DhtError::NotFound(_))));
    }
}
