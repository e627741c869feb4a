//! SQL schema definitions.

/// Complete schema for the Astral v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Peer systems: one row per known system, including cache meta
-- ============================================================

CREATE TABLE IF NOT EXISTS peer_systems (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    z REAL NOT NULL,
    star_class TEXT NOT NULL,
    binary_star INTEGER NOT NULL DEFAULT 0,
    trinary_star INTEGER NOT NULL DEFAULT 0,
    peer_address TEXT NOT NULL,
    sponsor_id TEXT,
    public_key BLOB NOT NULL,
    info_version INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    learned_at INTEGER NOT NULL,
    learned_from TEXT NOT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    last_verified INTEGER,
    last_gossip_heard INTEGER NOT NULL DEFAULT 0,
    fail_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_peer_systems_verified
    ON peer_systems(verified, last_verified);

-- ============================================================
-- Attestation log: signed proofs received from peers
-- ============================================================

CREATE TABLE IF NOT EXISTS attestations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    from_system_id TEXT NOT NULL,
    to_system_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    message_type TEXT NOT NULL,
    signature BLOB NOT NULL,
    public_key BLOB NOT NULL,
    received_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attestations_from
    ON attestations(from_system_id, received_at);

-- ============================================================
-- Peer-connection edges observed during lookups
-- ============================================================

CREATE TABLE IF NOT EXISTS peer_connections (
    from_id TEXT NOT NULL,
    peer_id TEXT NOT NULL,
    observed_at INTEGER NOT NULL,
    PRIMARY KEY (from_id, peer_id)
);

-- ============================================================
-- Identity bindings: first-write-wins (id -> public key)
-- ============================================================

CREATE TABLE IF NOT EXISTS identity_bindings (
    system_id TEXT PRIMARY KEY,
    public_key BLOB NOT NULL,
    bound_at INTEGER NOT NULL
);
"#;
