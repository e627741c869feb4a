//! Full-visibility routing cache.
//!
//! Unlike Kademlia's distance-sliced k-buckets, every heard-of system is kept
//! in one map keyed by system id. What is bounded is the number of *verified*
//! entries, with a capacity drawn from the local system's own star class.
//!
//! Two rules keep the cache honest:
//!
//! - **Info versioning**: a system's record is replaced only by a strictly
//!   newer `info_version` (with legacy-zero handling), so gossip races settle
//!   deterministically.
//! - **Ghost guard**: `last_gossip_heard` advances only for entries this node
//!   has itself verified recently, or when the gossip carries strictly newer
//!   info. Combined with the fresh-only sharing rule, dead nodes age out even
//!   while stale copies keep circulating elsewhere.

use std::collections::HashMap;

use astral_types::{StarClass, System, SystemId};

/// Derived lifecycle state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    /// Heard of, never verified by direct exchange.
    Pending,
    /// Verified recently, no outstanding failures.
    Active,
    /// Verified, but accumulating outbound failures.
    Degraded,
    /// Verified too long ago to vouch for.
    Stale,
    /// Failed out; removed on the next sweep.
    Evicted,
}

/// One routing-table entry.
#[derive(Clone, Debug)]
pub struct CachedSystem {
    pub system: System,
    /// When this node first heard of the system.
    pub learned_at: u64,
    /// Who told us (the system's own id for direct contact).
    pub learned_from: SystemId,
    /// Ever confirmed by a signed request/response exchange.
    pub verified: bool,
    /// Most recent direct confirmation.
    pub last_verified: Option<u64>,
    /// Most recent accepted gossip mention.
    pub last_gossip_heard: u64,
    /// Consecutive outbound failures.
    pub fail_count: u32,
}

impl CachedSystem {
    /// Derive the lifecycle state at `now`.
    pub fn status(&self, now: u64, verification_cutoff_secs: u64, max_fail_count: u32) -> PeerStatus {
        if self.fail_count >= max_fail_count {
            return PeerStatus::Evicted;
        }
        if !self.verified {
            return PeerStatus::Pending;
        }
        let fresh = self
            .last_verified
            .is_some_and(|t| now.saturating_sub(t) <= verification_cutoff_secs);
        if !fresh {
            PeerStatus::Stale
        } else if self.fail_count > 0 {
            PeerStatus::Degraded
        } else {
            PeerStatus::Active
        }
    }

    fn verified_within(&self, now: u64, cutoff_secs: u64) -> bool {
        self.verified
            && self
                .last_verified
                .is_some_and(|t| now.saturating_sub(t) <= cutoff_secs)
    }
}

/// Verified-peer capacity for a system of the given class and companions.
pub fn peer_limit(class: StarClass, binary: bool, trinary: bool) -> usize {
    let base = match class {
        StarClass::X => 20,
        StarClass::O => 18,
        StarClass::B => 16,
        StarClass::A => 15,
        StarClass::F => 14,
        StarClass::G => 12,
        StarClass::K => 11,
        StarClass::M => 10,
    };
    base + if trinary { 5 } else if binary { 3 } else { 0 }
}

/// Effect of a gossip observation, for callers deciding what to persist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GossipEffect {
    pub inserted: bool,
    pub info_updated: bool,
    pub liveness_refreshed: bool,
}

/// Effect of a direct (signed-exchange) observation.
#[derive(Clone, Debug, Default)]
pub struct DirectEffect {
    /// The entry moved from unverified to verified.
    pub newly_verified: bool,
    /// A verified entry displaced to stay within capacity.
    pub displaced: Option<SystemId>,
}

/// The routing cache.
#[derive(Debug)]
pub struct RoutingCache {
    local_id: SystemId,
    entries: HashMap<SystemId, CachedSystem>,
    max_verified: usize,
    verification_cutoff_secs: u64,
    max_fail_count: u32,
    max_age_secs: u64,
}

impl RoutingCache {
    pub fn new(
        local_id: SystemId,
        max_verified: usize,
        verification_cutoff_secs: u64,
        max_fail_count: u32,
        max_age_secs: u64,
    ) -> Self {
        Self {
            local_id,
            entries: HashMap::new(),
            max_verified,
            verification_cutoff_secs,
            max_fail_count,
            max_age_secs,
        }
    }

    pub fn local_id(&self) -> SystemId {
        self.local_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &SystemId) -> Option<&CachedSystem> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &SystemId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove an entry outright (address reassignment, explicit eviction).
    pub fn remove(&mut self, id: &SystemId) -> Option<CachedSystem> {
        self.entries.remove(id)
    }

    /// Restore an entry loaded from storage, bypassing the update rules.
    pub fn restore(&mut self, entry: CachedSystem) {
        if entry.system.id != self.local_id {
            self.entries.insert(entry.system.id, entry);
        }
    }

    /// Whether an incoming version may replace stored info via gossip.
    ///
    /// Legacy records carry `info_version == 0`: zero never displaces
    /// non-zero, non-zero upgrades zero, and zero-vs-zero is settled only by
    /// direct verified contact.
    fn version_supersedes(incoming: u64, stored: u64) -> bool {
        if incoming == 0 {
            false
        } else if stored == 0 {
            true
        } else {
            incoming > stored
        }
    }

    /// Record a system heard through gossip (find-node responses, snapshots).
    pub fn observe_gossip(
        &mut self,
        incoming: System,
        learned_from: SystemId,
        now: u64,
    ) -> GossipEffect {
        if incoming.id == self.local_id {
            return GossipEffect::default();
        }

        match self.entries.entry(incoming.id) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(CachedSystem {
                    system: incoming,
                    learned_at: now,
                    learned_from,
                    verified: false,
                    last_verified: None,
                    last_gossip_heard: now,
                    fail_count: 0,
                });
                GossipEffect {
                    inserted: true,
                    info_updated: false,
                    liveness_refreshed: true,
                }
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let newer =
                    Self::version_supersedes(incoming.info_version, entry.system.info_version);
                if newer {
                    entry.system = incoming;
                }
                // Ghost guard: re-gossip of an old record refreshes liveness
                // only for entries we have vouched for ourselves.
                let refresh =
                    newer || entry.verified_within(now, self.verification_cutoff_secs);
                if refresh {
                    entry.last_gossip_heard = now;
                }
                GossipEffect {
                    inserted: false,
                    info_updated: newer,
                    liveness_refreshed: refresh,
                }
            }
        }
    }

    /// Record a system confirmed by a signed request/response exchange.
    ///
    /// Promotes to verified, resets failures, and enforces the verified-peer
    /// capacity by displacing the least-recently-verified entry if needed.
    pub fn observe_direct(&mut self, incoming: System, now: u64) -> DirectEffect {
        if incoming.id == self.local_id {
            return DirectEffect::default();
        }

        let id = incoming.id;
        let newly_verified = match self.entries.entry(id) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(CachedSystem {
                    system: incoming,
                    learned_at: now,
                    learned_from: id,
                    verified: true,
                    last_verified: Some(now),
                    last_gossip_heard: now,
                    fail_count: 0,
                });
                true
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let stored = entry.system.info_version;
                // Direct contact also settles the zero-vs-zero legacy case.
                if Self::version_supersedes(incoming.info_version, stored)
                    || (incoming.info_version == 0 && stored == 0)
                {
                    entry.system = incoming;
                } else {
                    entry.system.last_seen_at = entry.system.last_seen_at.max(now);
                }
                let was_verified = entry.verified;
                entry.verified = true;
                entry.last_verified = Some(now);
                entry.last_gossip_heard = now;
                entry.fail_count = 0;
                !was_verified
            }
        };

        let displaced = if newly_verified {
            self.displace_over_capacity(&id)
        } else {
            None
        };

        DirectEffect {
            newly_verified,
            displaced,
        }
    }

    /// Drop the least-recently-verified entry when over capacity.
    fn displace_over_capacity(&mut self, keep: &SystemId) -> Option<SystemId> {
        let verified = self.entries.values().filter(|e| e.verified).count();
        if verified <= self.max_verified {
            return None;
        }
        let victim = self
            .entries
            .values()
            .filter(|e| e.verified && e.system.id != *keep)
            .min_by_key(|e| e.last_verified.unwrap_or(0))
            .map(|e| e.system.id)?;
        self.entries.remove(&victim);
        Some(victim)
    }

    /// Count one outbound failure; returns the new count.
    pub fn record_failure(&mut self, id: &SystemId) -> Option<u32> {
        let entry = self.entries.get_mut(id)?;
        entry.fail_count = entry.fail_count.saturating_add(1);
        Some(entry.fail_count)
    }

    /// Systems this node is willing to share: verified within the cutoff.
    ///
    /// Sharing only freshly verified entries breaks the loop where nodes keep
    /// each other's stale records alive forever.
    pub fn shareable(&self, now: u64) -> Vec<System> {
        let mut fresh: Vec<&CachedSystem> = self
            .entries
            .values()
            .filter(|e| e.verified_within(now, self.verification_cutoff_secs))
            .collect();
        fresh.sort_by_key(|e| std::cmp::Reverse(e.last_verified.unwrap_or(0)));
        fresh.into_iter().map(|e| e.system.clone()).collect()
    }

    /// Entries the liveness loop should probe: Degraded or Stale.
    pub fn liveness_candidates(&self, now: u64) -> Vec<System> {
        self.entries
            .values()
            .filter(|e| {
                matches!(
                    e.status(now, self.verification_cutoff_secs, self.max_fail_count),
                    PeerStatus::Degraded | PeerStatus::Stale
                )
            })
            .map(|e| e.system.clone())
            .collect()
    }

    /// Oldest unverified entries, for the gossip-validation loop.
    pub fn pending_oldest(&self, limit: usize) -> Vec<System> {
        let mut pending: Vec<&CachedSystem> =
            self.entries.values().filter(|e| !e.verified).collect();
        pending.sort_by_key(|e| e.learned_at);
        pending
            .into_iter()
            .take(limit)
            .map(|e| e.system.clone())
            .collect()
    }

    /// All entries, for lookup seeding and diagnostics.
    pub fn all_systems(&self) -> Vec<System> {
        self.entries.values().map(|e| e.system.clone()).collect()
    }

    /// Remove dead weight. Returns the removed ids so callers can delete the
    /// persisted rows.
    ///
    /// - Evicted entries (`fail_count` at the limit)
    /// - Unverified entries whose gossip went quiet for `max_age`
    /// - Verified entries not confirmed within `max_age`
    pub fn prune(&mut self, now: u64) -> Vec<SystemId> {
        let cutoff = now.saturating_sub(self.max_age_secs);
        let doomed: Vec<SystemId> = self
            .entries
            .values()
            .filter(|e| {
                if e.fail_count >= self.max_fail_count {
                    return true;
                }
                if !e.verified {
                    return e.last_gossip_heard < cutoff;
                }
                e.last_verified.unwrap_or(e.learned_at) < cutoff
            })
            .map(|e| e.system.id)
            .collect();
        for id in &doomed {
            self.entries.remove(id);
        }
        doomed
    }

    /// Status breakdown for logging.
    pub fn status_counts(&self, now: u64) -> HashMap<PeerStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.values() {
            *counts
                .entry(entry.status(now, self.verification_cutoff_secs, self.max_fail_count))
                .or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astral_types::Coordinates;
    use uuid::Uuid;

    const NOW: u64 = 1_750_000_000;
    const CUTOFF: u64 = 36 * 3600;
    const MAX_FAIL: u32 = 6;
    const MAX_AGE: u64 = 48 * 3600;

    fn system(id: Uuid, info_version: u64) -> System {
        System {
            id,
            name: format!("sys-{}", &id.to_string()[..8]),
            coords: Coordinates::new(1.0, 2.0, 3.0),
            star_class: StarClass::G,
            binary_star: false,
            trinary_star: false,
            peer_address: "192.0.2.1:4817".to_string(),
            sponsor_id: Some(Uuid::new_v4()),
            public_key: [1u8; 32],
            info_version,
            created_at: NOW - 1000,
            last_seen_at: NOW - 10,
        }
    }

    fn cache() -> RoutingCache {
        RoutingCache::new(Uuid::new_v4(), 12, CUTOFF, MAX_FAIL, MAX_AGE)
    }

    #[test]
    fn test_peer_limit_table() {
        assert_eq!(peer_limit(StarClass::X, false, false), 20);
        assert_eq!(peer_limit(StarClass::O, false, false), 18);
        assert_eq!(peer_limit(StarClass::B, false, false), 16);
        assert_eq!(peer_limit(StarClass::A, false, false), 15);
        assert_eq!(peer_limit(StarClass::F, false, false), 14);
        assert_eq!(peer_limit(StarClass::G, false, false), 12);
        assert_eq!(peer_limit(StarClass::K, false, false), 11);
        assert_eq!(peer_limit(StarClass::M, false, false), 10);
        assert_eq!(peer_limit(StarClass::M, true, false), 13);
        assert_eq!(peer_limit(StarClass::M, false, true), 15);
    }

    #[test]
    fn test_gossip_inserts_pending() {
        let mut cache = cache();
        let sys = system(Uuid::new_v4(), 1);
        let teller = Uuid::new_v4();
        let effect = cache.observe_gossip(sys.clone(), teller, NOW);
        assert!(effect.inserted);

        let entry = cache.get(&sys.id).expect("entry present");
        assert!(!entry.verified);
        assert_eq!(entry.learned_from, teller);
        assert_eq!(entry.status(NOW, CUTOFF, MAX_FAIL), PeerStatus::Pending);
    }

    #[test]
    fn test_gossip_ignores_self() {
        let mut cache = cache();
        let own = system(cache.local_id(), 1);
        let effect = cache.observe_gossip(own, Uuid::new_v4(), NOW);
        assert_eq!(effect, GossipEffect::default());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_older_version_never_overwrites() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        let mut v10 = system(id, 10);
        v10.name = "current".to_string();
        cache.observe_gossip(v10, Uuid::new_v4(), NOW);

        let mut v5 = system(id, 5);
        v5.name = "stale".to_string();
        let effect = cache.observe_gossip(v5, Uuid::new_v4(), NOW + 10);
        assert!(!effect.info_updated);
        assert_eq!(cache.get(&id).expect("entry").system.name, "current");
    }

    #[test]
    fn test_newer_version_overwrites_and_refreshes() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_gossip(system(id, 1), Uuid::new_v4(), NOW);

        let mut v2 = system(id, 2);
        v2.name = "renamed".to_string();
        let effect = cache.observe_gossip(v2, Uuid::new_v4(), NOW + 50);
        assert!(effect.info_updated);
        assert!(effect.liveness_refreshed);
        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.system.name, "renamed");
        assert_eq!(entry.last_gossip_heard, NOW + 50);
    }

    #[test]
    fn test_zero_version_rules() {
        let mut cache = cache();
        let id = Uuid::new_v4();

        // Zero never displaces non-zero.
        cache.observe_gossip(system(id, 3), Uuid::new_v4(), NOW);
        let effect = cache.observe_gossip(system(id, 0), Uuid::new_v4(), NOW + 1);
        assert!(!effect.info_updated);

        // Non-zero upgrades zero.
        let legacy = Uuid::new_v4();
        cache.observe_gossip(system(legacy, 0), Uuid::new_v4(), NOW);
        let effect = cache.observe_gossip(system(legacy, 1), Uuid::new_v4(), NOW + 1);
        assert!(effect.info_updated);

        // Zero-vs-zero settles only on direct contact.
        let frozen = Uuid::new_v4();
        let mut original = system(frozen, 0);
        original.name = "original".to_string();
        cache.observe_gossip(original, Uuid::new_v4(), NOW);
        let mut regossiped = system(frozen, 0);
        regossiped.name = "regossiped".to_string();
        cache.observe_gossip(regossiped, Uuid::new_v4(), NOW + 1);
        assert_eq!(cache.get(&frozen).expect("entry").system.name, "original");

        let mut direct = system(frozen, 0);
        direct.name = "direct".to_string();
        cache.observe_direct(direct, NOW + 2);
        assert_eq!(cache.get(&frozen).expect("entry").system.name, "direct");
    }

    #[test]
    fn test_ghost_guard_blocks_refresh() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_gossip(system(id, 10), Uuid::new_v4(), NOW);

        // Same-version re-gossip of an unverified entry: liveness must NOT
        // advance, or dead nodes would circulate forever.
        let effect = cache.observe_gossip(system(id, 10), Uuid::new_v4(), NOW + 1000);
        assert!(!effect.liveness_refreshed);
        assert_eq!(cache.get(&id).expect("entry").last_gossip_heard, NOW);
    }

    #[test]
    fn test_verified_entry_accepts_refresh() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_direct(system(id, 10), NOW);

        let effect = cache.observe_gossip(system(id, 10), Uuid::new_v4(), NOW + 1000);
        assert!(effect.liveness_refreshed);
        assert_eq!(
            cache.get(&id).expect("entry").last_gossip_heard,
            NOW + 1000
        );
    }

    #[test]
    fn test_direct_promotes_and_resets() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_gossip(system(id, 1), Uuid::new_v4(), NOW);
        cache.record_failure(&id);
        cache.record_failure(&id);

        let effect = cache.observe_direct(system(id, 1), NOW + 5);
        assert!(effect.newly_verified);
        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.fail_count, 0);
        assert_eq!(entry.last_verified, Some(NOW + 5));
        assert_eq!(entry.status(NOW + 5, CUTOFF, MAX_FAIL), PeerStatus::Active);
    }

    #[test]
    fn test_repeat_direct_keeps_info_version() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_direct(system(id, 7), NOW);
        // Re-announce with the same version: info untouched, liveness fresh.
        cache.observe_direct(system(id, 7), NOW + 100);
        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.system.info_version, 7);
        assert_eq!(entry.last_verified, Some(NOW + 100));
    }

    #[test]
    fn test_status_transitions() {
        let mut cache = cache();
        let id = Uuid::new_v4();
        cache.observe_direct(system(id, 1), NOW);

        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.status(NOW, CUTOFF, MAX_FAIL), PeerStatus::Active);
        // Past the cutoff: stale.
        assert_eq!(
            entry.status(NOW + CUTOFF + 1, CUTOFF, MAX_FAIL),
            PeerStatus::Stale
        );

        cache.record_failure(&id);
        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.status(NOW, CUTOFF, MAX_FAIL), PeerStatus::Degraded);

        for _ in 0..MAX_FAIL {
            cache.record_failure(&id);
        }
        let entry = cache.get(&id).expect("entry");
        assert_eq!(entry.status(NOW, CUTOFF, MAX_FAIL), PeerStatus::Evicted);
    }

    #[test]
    fn test_shareable_excludes_unverified_and_stale() {
        let mut cache = cache();
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let pending = Uuid::new_v4();

        cache.observe_direct(system(fresh, 1), NOW);
        cache.observe_direct(system(stale, 1), NOW - CUTOFF - 100);
        cache.observe_gossip(system(pending, 1), Uuid::new_v4(), NOW);

        let shared = cache.shareable(NOW);
        let ids: Vec<SystemId> = shared.iter().map(|s| s.id).collect();
        assert!(ids.contains(&fresh));
        assert!(!ids.contains(&stale));
        assert!(!ids.contains(&pending));
    }

    #[test]
    fn test_prune_rules() {
        let mut cache = cache();
        let evicted = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        let expired = Uuid::new_v4();
        let alive = Uuid::new_v4();

        cache.observe_direct(system(evicted, 1), NOW);
        for _ in 0..MAX_FAIL {
            cache.record_failure(&evicted);
        }
        cache.observe_gossip(system(ghost, 1), Uuid::new_v4(), NOW - MAX_AGE - 100);
        cache.observe_direct(system(expired, 1), NOW - MAX_AGE - 100);
        cache.observe_direct(system(alive, 1), NOW);

        let removed = cache.prune(NOW);
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&evicted));
        assert!(removed.contains(&ghost));
        assert!(removed.contains(&expired));
        assert!(cache.contains(&alive));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_displaces_least_recent() {
        let mut cache = RoutingCache::new(Uuid::new_v4(), 3, CUTOFF, MAX_FAIL, MAX_AGE);
        let oldest = Uuid::new_v4();
        cache.observe_direct(system(oldest, 1), NOW - 300);
        cache.observe_direct(system(Uuid::new_v4(), 1), NOW - 200);
        cache.observe_direct(system(Uuid::new_v4(), 1), NOW - 100);

        let newcomer = Uuid::new_v4();
        let effect = cache.observe_direct(system(newcomer, 1), NOW);
        assert_eq!(effect.displaced, Some(oldest));
        assert!(cache.contains(&newcomer));
        assert!(!cache.contains(&oldest));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_pending_oldest_ordering() {
        let mut cache = cache();
        let newer = Uuid::new_v4();
        let older = Uuid::new_v4();
        cache.observe_gossip(system(newer, 1), Uuid::new_v4(), NOW + 100);
        cache.observe_gossip(system(older, 1), Uuid::new_v4(), NOW);

        let pending = cache.pending_oldest(10);
        assert_eq!(pending[0].id, older);
        assert_eq!(pending[1].id, newer);

        assert_eq!(cache.pending_oldest(1).len(), 1);
    }

    #[test]
    fn test_liveness_candidates() {
        let mut cache = cache();
        let degraded = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let active = Uuid::new_v4();

        cache.observe_direct(system(degraded, 1), NOW);
        cache.record_failure(&degraded);
        cache.observe_direct(system(stale, 1), NOW - CUTOFF - 100);
        cache.observe_direct(system(active, 1), NOW);

        let candidates: Vec<SystemId> = cache
            .liveness_candidates(NOW)
            .iter()
            .map(|s| s.id)
            .collect();
        assert!(candidates.contains(&degraded));
        assert!(candidates.contains(&stale));
        assert!(!candidates.contains(&active));
    }
}
