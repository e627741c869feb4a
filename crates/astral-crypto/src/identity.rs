//! Stable system-id derivation.
//!
//! A system id is a 128-bit UUID. Two derivations are supported:
//!
//! - **Random** (v4): a fresh identity on every generation.
//! - **Host-stable** (v5-shaped): SHA-256 over the host's hardware address,
//!   hostname, machine id and an optional user seed, folded into a UUID with
//!   the version nibble set to 5. The same host re-derives the same id across
//!   restarts, so a reinstalled node keeps its place in the overlay.

use uuid::Uuid;

use crate::sha256;

/// Host properties fed into stable id derivation.
///
/// Empty fields are hashed as empty strings; the derivation is total.
#[derive(Clone, Debug, Default)]
pub struct HostMaterial {
    /// Primary interface hardware address, empty when unknown.
    pub mac_address: String,
    /// Host name.
    pub hostname: String,
    /// OS machine id (e.g. `/etc/machine-id` contents).
    pub machine_id: String,
    /// Optional user-chosen seed, mixed in last.
    pub user_seed: Option<String>,
}

/// Generate a random v4 system id.
pub fn random_system_id() -> Uuid {
    Uuid::new_v4()
}

/// Derive a stable, v5-shaped system id from host material.
pub fn system_id_from_host(material: &HostMaterial) -> Uuid {
    let seed = material.user_seed.as_deref().unwrap_or("");
    let digest = sha256::hash_parts(&[
        material.mac_address.as_bytes(),
        material.hostname.as_bytes(),
        material.machine_id.as_bytes(),
        seed.as_bytes(),
    ]);

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // Stamp version 5 and the RFC 4122 variant.
    bytes[6] = (bytes[6] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid::from_bytes(bytes)
}
