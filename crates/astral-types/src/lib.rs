//! # astral-types
//!
//! Shared domain types for the Astral overlay: the `System` record, its star
//! classification and coordinates, and the signed `Attestation` that binds
//! every wire message to a sender identity.

pub mod attestation;
pub mod serde_hex;
pub mod system;

pub use attestation::{Attestation, AttestationError};
pub use system::{Coordinates, StarClass, System};

use uuid::{uuid, Uuid};

/// A system's 128-bit stable identifier.
pub type SystemId = Uuid;

/// Wire protocol version string. Peers must agree on the major component.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Maximum length of a system name in UTF-8 bytes.
pub const MAX_NAME_BYTES: usize = 64;

/// Maximum accepted clock skew for attestation timestamps, in seconds.
pub const ATTESTATION_MAX_SKEW_SECS: u64 = 300;

/// The protected genesis system. The only identity allowed to carry star
/// class X on a public network; it sits at the origin and has no sponsor.
pub const GENESIS_SYSTEM_ID: Uuid = uuid!("f467e75d-9f1c-4d3a-b2f5-6f3e8a7c0d21");

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
