//! # astral-dht
//!
//! The overlay maintenance engine for the Astral network.
//!
//! This crate implements:
//! - A full-visibility routing cache: every heard-of system is kept, with a
//!   verification lifecycle (Pending / Active / Degraded / Stale / Evicted)
//!   and gossip-freshness rules that stop dead nodes from being kept alive by
//!   re-gossip ("ghost propagation")
//! - The typed DHT message layer with signed attestations and ordered
//!   validation
//! - Request/response correlation with per-request rendezvous slots
//! - The protocol engine: ping, announce, iterative find-node
//! - Maintenance loops: announce, peer liveness, gossip validation, cache
//!   pruning, inbound watchdog
//! - Full-sync snapshots for bootstrapping new nodes
//!
//! ## Key Parameters
//!
//! | Parameter | Default |
//! |---|---|
//! | alpha (lookup parallelism) | 3 |
//! | K (response fan-out) | 20 |
//! | Request timeout | 5 seconds |
//! | Announce interval | 30 minutes |
//! | Verification cutoff | 36 hours |
//! | Cache max age | 48 hours |
//! | Max consecutive failures | 6 |
//! | Max inbound body | 1 MiB |

pub mod bootstrap;
pub mod cache;
pub mod correlation;
pub mod engine;
pub mod maintenance;
pub mod messages;
pub mod storage;
pub mod validation;

use std::time::Duration;

/// Lookup parallelism factor.
pub const ALPHA: usize = 3;

/// Response fan-out and lookup termination width.
pub const K: usize = 20;

/// Hop limit for iterative lookups.
pub const HOP_LIMIT: usize = 20;

/// Error type for all DHT operations.
///
/// Wire-visible rejections carry one of the stable error codes; transport,
/// storage and shutdown conditions surface as 500 when they cross the wire.
#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    /// Structurally invalid or identity-violating message (code 400).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The message carries no attestation (code 401).
    #[error("missing attestation")]
    MissingAttestation,

    /// The attestation failed verification (code 402).
    #[error("invalid attestation: {0}")]
    InvalidAttestation(String),

    /// The peer speaks an incompatible protocol version (code 403).
    #[error("incompatible protocol version: {0}")]
    IncompatibleVersion(String),

    /// The requested entity is unknown (code 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal failure (code 500).
    #[error("internal error: {0}")]
    Internal(String),

    /// The remote exchange timed out.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure reaching a peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The engine is shutting down.
    #[error("shutting down")]
    Shutdown,
}

impl DhtError {
    /// Stable wire code for this error.
    pub fn code(&self) -> u16 {
        match self {
            DhtError::InvalidMessage(_) => 400,
            DhtError::MissingAttestation => 401,
            DhtError::InvalidAttestation(_) => 402,
            DhtError::IncompatibleVersion(_) => 403,
            DhtError::NotFound(_) => 404,
            DhtError::Internal(_)
            | DhtError::Timeout
            | DhtError::Transport(_)
            | DhtError::Storage(_)
            | DhtError::Shutdown => 500,
        }
    }

    /// Reconstruct a typed error from a wire `{code, message}` pair.
    pub fn from_wire(code: u16, message: String) -> Self {
        match code {
            400 => DhtError::InvalidMessage(message),
            401 => DhtError::MissingAttestation,
            402 => DhtError::InvalidAttestation(message),
            403 => DhtError::IncompatibleVersion(message),
            404 => DhtError::NotFound(message),
            _ => DhtError::Internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, DhtError>;

/// Engine configuration. Every knob is overridable; defaults match the
/// protocol constants.
#[derive(Clone, Debug)]
pub struct DhtConfig {
    /// Parallelism of iterative lookups.
    pub alpha: usize,
    /// Fan-out of find-node responses; also the lookup termination width.
    pub k: usize,
    /// Per-exchange timeout.
    pub request_timeout: Duration,
    /// How often the node re-announces itself.
    pub announce_interval: Duration,
    /// Cadence of the Degraded/Stale liveness probe.
    pub liveness_interval: Duration,
    /// Cadence of the Pending-entry verification probe.
    pub gossip_validation_interval: Duration,
    /// Cadence of cache pruning.
    pub cache_prune_interval: Duration,
    /// Entries unheard-of for this long are pruned.
    pub cache_max_age: Duration,
    /// Maximum age of `last_verified` for an entry to stay Active/shareable.
    pub verification_cutoff: Duration,
    /// Consecutive outbound failures before eviction.
    pub max_fail_count: u32,
    /// Inbound bodies above this size are rejected without parsing.
    pub max_body_bytes: usize,
    /// Hop limit for iterative lookups.
    pub hop_limit: usize,
    /// Permit a non-genesis X root (private, isolated networks only).
    pub isolated_network: bool,
    /// Delay before the first no-inbound-traffic warning.
    pub watchdog_initial_delay: Duration,
    /// Interval between subsequent no-inbound-traffic warnings.
    pub watchdog_interval: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            k: K,
            request_timeout: Duration::from_secs(5),
            announce_interval: Duration::from_secs(30 * 60),
            liveness_interval: Duration::from_secs(5 * 60),
            gossip_validation_interval: Duration::from_secs(5 * 60),
            cache_prune_interval: Duration::from_secs(2 * 3600),
            cache_max_age: Duration::from_secs(48 * 3600),
            verification_cutoff: Duration::from_secs(36 * 3600),
            max_fail_count: 6,
            max_body_bytes: 1024 * 1024,
            hop_limit: HOP_LIMIT,
            isolated_network: false,
            watchdog_initial_delay: Duration::from_secs(10 * 60),
            watchdog_interval: Duration::from_secs(6 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = DhtConfig::default();
        assert_eq!(config.alpha, 3);
        assert_eq!(config.k, 20);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.verification_cutoff, Duration::from_secs(129_600));
        assert_eq!(config.cache_max_age, Duration::from_secs(172_800));
        assert_eq!(config.max_fail_count, 6);
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(DhtError::InvalidMessage("x".into()).code(), 400);
        assert_eq!(DhtError::MissingAttestation.code(), 401);
        assert_eq!(DhtError::InvalidAttestation("x".into()).code(), 402);
        assert_eq!(DhtError::IncompatibleVersion("2.0".into()).code(), 403);
        assert_eq!(DhtError::NotFound("x".into()).code(), 404);
        assert_eq!(DhtError::Internal("x".into()).code(), 500);
        assert_eq!(DhtError::Timeout.code(), 500);
    }

    #[test]
    fn test_error_wire_roundtrip() {
        let original = DhtError::InvalidAttestation("bad signature".into());
        let rebuilt = DhtError::from_wire(original.code(), "bad signature".into());
        assert!(matches!(rebuilt, DhtError::InvalidAttestation(_)));
        assert_eq!(rebuilt.code(), 402);
    }
}
