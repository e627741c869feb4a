//! The narrow persistence contract the engine depends on.
//!
//! Storage is externally synchronized: implementations must be safe to call
//! from concurrent tasks. The daemon backs this with SQLite; tests use the
//! in-memory implementation below.

use std::collections::HashMap;
use std::sync::Mutex;

use astral_types::{Attestation, SystemId};

use crate::cache::CachedSystem;
use crate::{DhtError, Result};

/// Outcome of an identity-binding check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingCheck {
    /// The claimed key is acceptable (newly bound or matching).
    pub ok: bool,
    /// This check created the binding.
    pub is_new: bool,
}

/// An observed peer-connection edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEdge {
    pub from: SystemId,
    pub peer: SystemId,
    pub observed_at: u64,
}

/// Persistence operations required by the engine.
pub trait Storage: Send + Sync {
    /// Upsert a peer system together with its cache metadata.
    fn save_peer_system(&self, entry: &CachedSystem) -> Result<()>;

    /// Refresh a peer's last-seen timestamp.
    fn touch_peer_system(&self, id: &SystemId, last_seen_at: u64) -> Result<()>;

    /// Load every persisted peer row, for cache warm-up.
    fn get_all_peer_systems_with_meta(&self) -> Result<Vec<CachedSystem>>;

    /// Append a received attestation.
    fn save_attestation(
        &self,
        attestation: &Attestation,
        receiver: &SystemId,
        received_at: u64,
    ) -> Result<()>;

    /// All attestations received from a sender.
    fn get_attestations(&self, id: &SystemId) -> Result<Vec<Attestation>>;

    /// Record the peers a responder reported knowing.
    fn save_peer_connections(
        &self,
        from: &SystemId,
        peers: &[SystemId],
        observed_at: u64,
    ) -> Result<()>;

    /// Edges observed within `max_age_secs` of `now`.
    fn get_connections(&self, max_age_secs: u64, now: u64) -> Result<Vec<ConnectionEdge>>;

    /// First-write-wins identity binding check.
    fn validate_identity_binding(
        &self,
        id: &SystemId,
        public_key: &[u8; 32],
        now: u64,
    ) -> Result<BindingCheck>;

    /// Remove a peer row (eviction, address reassignment).
    fn delete_peer_system(&self, id: &SystemId) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    peers: HashMap<SystemId, CachedSystem>,
    attestations: Vec<(SystemId, Attestation, u64)>,
    connections: HashMap<(SystemId, SystemId), u64>,
    bindings: HashMap<SystemId, [u8; 32]>,
}

/// In-memory storage, for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| DhtError::Storage("storage lock poisoned".into()))
    }
}

impl Storage for InMemoryStorage {
    fn save_peer_system(&self, entry: &CachedSystem) -> Result<()> {
        self.lock()?.peers.insert(entry.system.id, entry.clone());
        Ok(())
    }

    fn touch_peer_system(&self, id: &SystemId, last_seen_at: u64) -> Result<()> {
        let mut inner = self.lock()?;
        let entry = inner
            .peers
            .get_mut(id)
            .ok_or_else(|| DhtError::NotFound(format!("peer system {id}")))?;
        entry.system.last_seen_at = last_seen_at;
        Ok(())
    }

    fn get_all_peer_systems_with_meta(&self) -> Result<Vec<CachedSystem>> {
        Ok(self.lock()?.peers.values().cloned().collect())
    }

    fn save_attestation(
        &self,
        attestation: &Attestation,
        receiver: &SystemId,
        received_at: u64,
    ) -> Result<()> {
        self.lock()?
            .attestations
            .push((*receiver, attestation.clone(), received_at));
        Ok(())
    }

    fn get_attestations(&self, id: &SystemId) -> Result<Vec<Attestation>> {
        Ok(self
            .lock()?
            .attestations
            .iter()
            .filter(|(_, att, _)| att.from_system_id == *id)
            .map(|(_, att, _)| att.clone())
            .collect())
    }

    fn save_peer_connections(
        &self,
        from: &SystemId,
        peers: &[SystemId],
        observed_at: u64,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        for peer in peers {
            inner.connections.insert((*from, *peer), observed_at);
        }
        Ok(())
    }

    fn get_connections(&self, max_age_secs: u64, now: u64) -> Result<Vec<ConnectionEdge>> {
        let cutoff = now.saturating_sub(max_age_secs);
        Ok(self
            .lock()?
            .connections
            .iter()
            .filter(|(_, observed)| **observed >= cutoff)
            .map(|((from, peer), observed)| ConnectionEdge {
                from: *from,
                peer: *peer,
                observed_at: *observed,
            })
            .collect())
    }

    fn validate_identity_binding(
        &self,
        id: &SystemId,
        public_key: &[u8; 32],
        _now: u64,
    ) -> Result<BindingCheck> {
        let mut inner = self.lock()?;
        match inner.bindings.get(id) {
            Some(bound) => Ok(BindingCheck {
                ok: bound == public_key,
                is_new: false,
            }),
            None => {
                inner.bindings.insert(*id, *public_key);
                Ok(BindingCheck {
                    ok: true,
                    is_new: true,
                })
            }
        }
    }

    fn delete_peer_system(&self, id: &SystemId) -> Result<()> {
        self.lock()?.peers.remove(id);
        Ok(())
    }
}
