//! The DHT protocol engine.
//!
//! Owns the routing cache, the pending-request table and the local identity.
//! Inbound messages flow decode → validate → identity binding → dispatch;
//! outbound exchanges are signed, correlated by request id and bounded by the
//! request timeout.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use astral_crypto::ed25519::IdentityKey;
use astral_starfield::validate_coordinates;
use astral_types::{unix_now, System, SystemId, PROTOCOL_VERSION};

use crate::cache::{peer_limit, RoutingCache};
use crate::correlation::PendingRequests;
use crate::messages::{DhtMessage, MessageKind};
use crate::storage::Storage;
use crate::validation;
use crate::{DhtConfig, DhtError, Result};

/// Cooldown between repeated per-source warnings, in seconds.
const WARN_COOLDOWN_SECS: u64 = 3600;

/// Network transport for request/response exchanges.
///
/// Implementations carry a signed envelope to `peer_address` and return the
/// peer's reply. The engine validates the reply; transports only move bytes.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        peer_address: &str,
        message: DhtMessage,
    ) -> impl Future<Output = Result<DhtMessage>> + Send;
}

/// Result of an iterative find-node lookup.
#[derive(Clone, Debug, Default)]
pub struct FindNodeOutcome {
    /// The exact target, when discovered.
    pub found: Option<System>,
    /// Query rounds performed.
    pub hops: usize,
    /// Individual peers queried.
    pub queried: usize,
}

/// The overlay maintenance engine.
pub struct DhtEngine<T, S> {
    local: RwLock<System>,
    identity: IdentityKey,
    pub(crate) cache: RwLock<RoutingCache>,
    pending: PendingRequests,
    transport: T,
    storage: S,
    pub config: DhtConfig,
    shutdown_tx: broadcast::Sender<()>,
    pub(crate) started_at: u64,
    pub(crate) last_inbound: RwLock<Option<u64>>,
    version_warned_at: StdMutex<HashMap<SystemId, u64>>,
    crypto_warned_at: StdMutex<HashMap<SystemId, u64>>,
}

impl<T: Transport, S: Storage> DhtEngine<T, S> {
    /// Create an engine for `local`, whose star class sets the verified-peer
    /// capacity.
    pub fn new(
        local: System,
        identity: IdentityKey,
        transport: T,
        storage: S,
        config: DhtConfig,
    ) -> Arc<Self> {
        let max_verified = peer_limit(local.star_class, local.binary_star, local.trinary_star);
        let cache = RoutingCache::new(
            local.id,
            max_verified,
            config.verification_cutoff.as_secs(),
            config.max_fail_count,
            config.cache_max_age.as_secs(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            local: RwLock::new(local),
            identity,
            cache: RwLock::new(cache),
            pending: PendingRequests::new(),
            transport,
            storage,
            config,
            shutdown_tx,
            started_at: unix_now(),
            last_inbound: RwLock::new(None),
            version_warned_at: StdMutex::new(HashMap::new()),
            crypto_warned_at: StdMutex::new(HashMap::new()),
        })
    }

    /// Bind the local identity and restore persisted peers into the cache.
    ///
    /// Returns the number of restored entries.
    pub async fn warm_start(&self) -> Result<usize> {
        let local = self.local.read().await.clone();
        let check = self
            .storage
            .validate_identity_binding(&local.id, &local.public_key, unix_now())?;
        if !check.ok {
            return Err(DhtError::Internal(
                "local identity conflicts with a stored binding".into(),
            ));
        }

        let rows = self.storage.get_all_peer_systems_with_meta()?;
        let count = rows.len();
        let mut cache = self.cache.write().await;
        for row in rows {
            cache.restore(row);
        }
        info!(restored = count, "Routing cache warm start complete");
        Ok(count)
    }

    /// The local system record.
    pub async fn local_system(&self) -> System {
        self.local.read().await.clone()
    }

    /// Access the storage layer.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every loop and listener to stop.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A copy of one cache entry, for diagnostics.
    pub async fn peer_entry(&self, id: &SystemId) -> Option<crate::cache::CachedSystem> {
        self.cache.read().await.get(id).cloned()
    }

    /// Lifecycle state of one cached peer at this moment.
    pub async fn peer_status(&self, id: &SystemId) -> Option<crate::cache::PeerStatus> {
        let now = unix_now();
        self.cache.read().await.get(id).map(|entry| {
            entry.status(
                now,
                self.config.verification_cutoff.as_secs(),
                self.config.max_fail_count,
            )
        })
    }

    /// Shareable systems ordered nearest-first to the local position,
    /// suitable as sponsor candidates for joining nodes.
    pub async fn discovery_candidates(&self) -> Vec<System> {
        let local = self.local.read().await.clone();
        let now = unix_now();
        let mut candidates = self.cache.read().await.shareable(now);
        candidates.sort_by(|a, b| {
            let da = a.coords.distance(&local.coords);
            let db = b.coords.distance(&local.coords);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    // -----------------------------------------------------------------
    // Inbound path
    // -----------------------------------------------------------------

    /// Handle a decoded inbound envelope.
    ///
    /// Requests return `Ok(Some(response))`. Responses are routed to their
    /// rendezvous slot and return `Ok(None)`; unmatched responses are dropped.
    pub async fn handle_message(&self, msg: DhtMessage) -> Result<Option<DhtMessage>> {
        let now = unix_now();
        let from = self.admit_message(&msg, now).await?;

        if msg.is_response {
            let request_id = msg.request_id.clone();
            self.pending.complete(&request_id, msg);
            return Ok(None);
        }

        *self.last_inbound.write().await = Some(now);

        // A valid signed request is direct contact: the sender is promoted to
        // Active and persisted.
        self.cache_direct(from.clone(), now).await?;
        if let Some(attestation) = msg.attestation.as_ref() {
            let local_id = self.local.read().await.id;
            self.storage.save_attestation(attestation, &local_id, now)?;
        }

        let local = self.local.read().await.clone();
        let response = match msg.kind {
            MessageKind::Ping => DhtMessage::response(
                MessageKind::Ping,
                &local,
                &self.identity,
                from.id,
                msg.request_id,
            ),
            MessageKind::Announce => DhtMessage::response(
                MessageKind::Announce,
                &local,
                &self.identity,
                from.id,
                msg.request_id,
            ),
            MessageKind::FindNode => {
                let target = msg.target_id.ok_or_else(|| {
                    DhtError::Internal("validated find_node lost its target".into())
                })?;
                let closest = self.closest_shareable(&target, now).await;
                let mut response = DhtMessage::response(
                    MessageKind::FindNode,
                    &local,
                    &self.identity,
                    from.id,
                    msg.request_id,
                );
                response.target_id = Some(target);
                response.closest_nodes = Some(closest);
                response
            }
        };
        Ok(Some(response))
    }

    /// Run every acceptance check an inbound envelope must pass, returning
    /// the sender record.
    async fn admit_message(&self, msg: &DhtMessage, now: u64) -> Result<System> {
        validation::check_version(&msg.version)?;

        let local_id = self.local.read().await.id;
        if let Err(e) = validation::validate(msg, local_id, now, self.config.isolated_network) {
            if matches!(e, DhtError::InvalidAttestation(_)) {
                if let Some(claimed) = msg.from_system.as_ref() {
                    self.note_crypto_failure(&claimed.id, &e, now);
                }
            }
            return Err(e);
        }

        let from = msg
            .from_system
            .clone()
            .ok_or_else(|| DhtError::Internal("validated message lost its sender".into()))?;

        if msg.version != PROTOCOL_VERSION {
            self.note_old_version(&from.id, &msg.version, now);
        }

        let check = self
            .storage
            .validate_identity_binding(&from.id, &from.public_key, now)?;
        if !check.ok {
            warn!(
                system_id = %from.id,
                peer_address = %from.peer_address,
                "Rejecting message: public key differs from bound identity"
            );
            return Err(DhtError::InvalidMessage("identity mismatch".into()));
        }
        if check.is_new {
            debug!(system_id = %from.id, "Bound new identity");
        }

        // With the sponsor's placement known, the coordinates must agree with
        // the derivation.
        let sponsor_coords = match from.sponsor_id {
            Some(sponsor_id) => self
                .cache
                .read()
                .await
                .get(&sponsor_id)
                .map(|entry| entry.system.coords),
            None => None,
        };
        validate_coordinates(&from, sponsor_coords.as_ref())
            .map_err(|e| DhtError::InvalidMessage(e.to_string()))?;

        Ok(from)
    }

    /// Warn (rate-limited per source) about failed signature checks.
    fn note_crypto_failure(&self, id: &SystemId, error: &DhtError, now: u64) {
        let Ok(mut warned) = self.crypto_warned_at.lock() else {
            return;
        };
        let due = warned.get(id).map_or(true, |last| {
            now.saturating_sub(*last) >= WARN_COOLDOWN_SECS
        });
        if due {
            warned.insert(*id, now);
            warn!(system_id = %id, error = %error, "Rejected cryptographically invalid message");
        }
    }

    /// Warn (rate-limited per source) about peers on old compatible versions.
    fn note_old_version(&self, id: &SystemId, version: &str, now: u64) {
        let Ok(mut warned) = self.version_warned_at.lock() else {
            return;
        };
        let due = warned
            .get(id)
            .map_or(true, |last| {
                now.saturating_sub(*last) >= WARN_COOLDOWN_SECS
            });
        if due {
            warned.insert(*id, now);
            warn!(system_id = %id, version, "Peer speaks an old protocol version");
        }
    }

    /// Shareable systems for a find-node response: the exact target first if
    /// we can vouch for it, then the freshest entries, capped at K.
    async fn closest_shareable(&self, target: &SystemId, now: u64) -> Vec<System> {
        let mut nodes = self.cache.read().await.shareable(now);
        if let Some(position) = nodes.iter().position(|s| s.id == *target) {
            nodes.swap(0, position);
        }
        nodes.truncate(self.config.k);
        nodes
    }

    // -----------------------------------------------------------------
    // Outbound path
    // -----------------------------------------------------------------

    /// Send a request and await its correlated response.
    async fn exchange(&self, peer_address: &str, msg: DhtMessage) -> Result<DhtMessage> {
        let request_id = msg.request_id.clone();
        let rx = self.pending.register(&request_id);

        let exchange = async {
            let reply = self.transport.send(peer_address, msg).await?;
            let now = unix_now();
            // Replies pass the same acceptance checks as unsolicited inbound
            // traffic before they reach the rendezvous.
            self.admit_message(&reply, now).await?;
            if !reply.is_response || reply.request_id != request_id {
                return Err(DhtError::InvalidMessage(
                    "reply does not correlate with the request".into(),
                ));
            }
            self.pending.complete(&request_id, reply);
            rx.await.map_err(|_| DhtError::Timeout)
        };

        let outcome = tokio::time::timeout(self.config.request_timeout, exchange).await;
        self.pending.cancel(&request_id);
        match outcome {
            Ok(result) => result,
            Err(_) => Err(DhtError::Timeout),
        }
    }

    /// Direct liveness check.
    ///
    /// On success the responder is cached Active. When the responder turns
    /// out to be a different system than expected, the stale entry is removed
    /// (the address has been reassigned) and the call still succeeds.
    pub async fn ping(&self, peer: &System) -> Result<System> {
        let local = self.local.read().await.clone();
        let msg = DhtMessage::request(MessageKind::Ping, &local, &self.identity, peer.id);

        match self.exchange(&peer.peer_address, msg).await {
            Ok(reply) => {
                let responder = reply
                    .from_system
                    .ok_or_else(|| DhtError::Internal("validated reply lost its sender".into()))?;
                let now = unix_now();
                if !peer.id.is_nil() && responder.id != peer.id {
                    info!(
                        expected = %peer.id,
                        got = %responder.id,
                        peer_address = %peer.peer_address,
                        "Address reassigned; replacing cached system"
                    );
                    self.forget_peer(&peer.id).await?;
                }
                self.cache_direct(responder.clone(), now).await?;
                Ok(responder)
            }
            Err(e) => {
                self.note_failure(&peer.id).await;
                Err(e)
            }
        }
    }

    /// Advertise the local system to a peer.
    pub async fn announce_to(&self, peer: &System) -> Result<()> {
        let local = self.local.read().await.clone();
        let msg = DhtMessage::request(MessageKind::Announce, &local, &self.identity, peer.id);

        match self.exchange(&peer.peer_address, msg).await {
            Ok(reply) => {
                if let Some(responder) = reply.from_system {
                    self.cache_direct(responder, unix_now()).await?;
                }
                Ok(())
            }
            Err(e) => {
                self.note_failure(&peer.id).await;
                Err(e)
            }
        }
    }

    /// Record a confirmed exchange with `system` and persist the result.
    pub(crate) async fn cache_direct(&self, system: System, now: u64) -> Result<()> {
        let id = system.id;
        let (effect, entry) = {
            let mut cache = self.cache.write().await;
            let effect = cache.observe_direct(system, now);
            (effect, cache.get(&id).cloned())
        };
        if let Some(entry) = entry {
            self.storage.save_peer_system(&entry)?;
        }
        if let Some(displaced) = effect.displaced {
            debug!(system_id = %displaced, "Displaced verified peer over capacity");
            self.storage.delete_peer_system(&displaced)?;
        }
        Ok(())
    }

    /// Record gossip about `system` and persist new or updated entries.
    pub(crate) async fn cache_gossip(
        &self,
        system: System,
        learned_from: SystemId,
        now: u64,
    ) -> Result<bool> {
        let id = system.id;
        let (effect, entry) = {
            let mut cache = self.cache.write().await;
            let effect = cache.observe_gossip(system, learned_from, now);
            (effect, cache.get(&id).cloned())
        };
        if effect.inserted || effect.info_updated {
            if let Some(entry) = entry {
                self.storage.save_peer_system(&entry)?;
            }
        } else if effect.liveness_refreshed {
            match self.storage.touch_peer_system(&id, now) {
                Ok(()) | Err(DhtError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(effect.inserted)
    }

    /// Count an outbound failure against a peer.
    pub(crate) async fn note_failure(&self, id: &SystemId) {
        let count = self.cache.write().await.record_failure(id);
        if let Some(count) = count {
            debug!(system_id = %id, fail_count = count, "Outbound exchange failed");
        }
    }

    /// Drop a peer from cache and storage.
    pub(crate) async fn forget_peer(&self, id: &SystemId) -> Result<()> {
        self.cache.write().await.remove(id);
        self.storage.delete_peer_system(id)
    }
}

impl<T, S> DhtEngine<T, S>
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    /// Iterative find-node lookup.
    ///
    /// Full-visibility mode needs no distance metric: the shortlist seeds
    /// with any known systems and grows with every response. Per-peer
    /// failures only count against that peer; an unroutable network yields an
    /// empty outcome, not an error.
    pub async fn find_node(self: &Arc<Self>, target: SystemId) -> Result<FindNodeOutcome> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&target) {
                return Ok(FindNodeOutcome {
                    found: Some(entry.system.clone()),
                    hops: 0,
                    queried: 0,
                });
            }
        }

        let local_id = self.local.read().await.id;
        let mut shortlist: Vec<System> = {
            let cache = self.cache.read().await;
            let now = unix_now();
            let mut seeds = cache.shareable(now);
            if seeds.len() < self.config.alpha {
                for system in cache.all_systems() {
                    if !seeds.iter().any(|s| s.id == system.id) {
                        seeds.push(system);
                    }
                }
            }
            seeds
        };

        let mut queried: HashSet<SystemId> = HashSet::new();
        let mut known: HashSet<SystemId> = shortlist.iter().map(|s| s.id).collect();
        let mut outcome = FindNodeOutcome::default();

        while outcome.hops < self.config.hop_limit {
            let batch: Vec<System> = shortlist
                .iter()
                .filter(|s| !queried.contains(&s.id))
                .take(self.config.alpha)
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }
            outcome.hops += 1;

            let mut tasks = JoinSet::new();
            for peer in batch {
                queried.insert(peer.id);
                outcome.queried += 1;
                let engine = Arc::clone(self);
                tasks.spawn(async move {
                    let local = engine.local.read().await.clone();
                    let mut msg =
                        DhtMessage::request(MessageKind::FindNode, &local, &engine.identity, peer.id);
                    msg.target_id = Some(target);
                    let result = engine.exchange(&peer.peer_address, msg).await;
                    (peer, result)
                });
            }

            let mut learned_this_round = false;
            while let Some(joined) = tasks.join_next().await {
                let Ok((peer, result)) = joined else {
                    continue;
                };
                let reply = match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!(system_id = %peer.id, error = %e, "Lookup query failed");
                        self.note_failure(&peer.id).await;
                        continue;
                    }
                };

                let Some(responder) = reply.from_system else {
                    continue;
                };
                let now = unix_now();
                self.cache_direct(responder.clone(), now).await?;

                let returned = reply.closest_nodes.unwrap_or_default();
                let returned_ids: Vec<SystemId> = returned.iter().map(|s| s.id).collect();
                if !returned_ids.is_empty() {
                    self.storage
                        .save_peer_connections(&responder.id, &returned_ids, now)?;
                }

                for system in returned {
                    if system.id == local_id {
                        continue;
                    }
                    if system.id == target {
                        outcome.found = Some(system.clone());
                    }
                    self.cache_gossip(system.clone(), responder.id, now).await?;
                    if known.insert(system.id) {
                        shortlist.push(system);
                        learned_this_round = true;
                    }
                }
            }

            if outcome.found.is_some() {
                break;
            }
            let top_queried = shortlist
                .iter()
                .take(self.config.k)
                .all(|s| queried.contains(&s.id));
            if !learned_this_round && top_queried {
                break;
            }
        }

        Ok(outcome)
    }
}
