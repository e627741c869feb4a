//! Message validation.
//!
//! Pure functions over a decoded envelope. Checks run in a fixed order so a
//! message fails with the most specific applicable code; nothing here touches
//! the cache or storage (identity-binding and sponsor-aware coordinate checks
//! happen at the engine boundary, where that state lives).

use astral_starfield::{validate_coordinates, validate_star_class};
use astral_types::{SystemId, PROTOCOL_VERSION};

use crate::messages::{DhtMessage, MessageKind};
use crate::{DhtError, Result};

/// Check protocol-version compatibility: major components must match.
pub fn check_version(version: &str) -> Result<()> {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    if major(version) != major(PROTOCOL_VERSION) {
        return Err(DhtError::IncompatibleVersion(version.to_string()));
    }
    Ok(())
}

/// Validate a decoded message.
///
/// Order: sender presence, attestation presence, signature, sender binding
/// within the message, timestamp window, name budget, star-class derivation,
/// structural coordinate rules, find-node target, impersonation.
pub fn validate(
    msg: &DhtMessage,
    local_id: SystemId,
    now: u64,
    isolated_network: bool,
) -> Result<()> {
    let from = msg
        .from_system
        .as_ref()
        .ok_or_else(|| DhtError::InvalidMessage("missing from_system".into()))?;

    let attestation = msg.attestation.as_ref().ok_or(DhtError::MissingAttestation)?;

    attestation
        .verify(now)
        .map_err(|e| DhtError::InvalidAttestation(e.to_string()))?;

    attestation
        .check_sender(from.id)
        .map_err(|e| DhtError::InvalidAttestation(e.to_string()))?;

    if attestation.public_key != from.public_key {
        return Err(DhtError::InvalidAttestation(
            "attestation key does not match sender record".into(),
        ));
    }

    let expected_type = msg.kind.attestation_type(msg.is_response);
    if attestation.message_type != expected_type {
        return Err(DhtError::InvalidAttestation(format!(
            "attestation type {} does not match {} message",
            attestation.message_type, expected_type,
        )));
    }

    if !from.name_is_valid() {
        return Err(DhtError::InvalidMessage(
            "system name missing or over 64 bytes".into(),
        ));
    }

    validate_star_class(from, isolated_network)
        .map_err(|e| DhtError::InvalidMessage(e.to_string()))?;

    // Structural coordinate rules only: the sponsor's placement is looked up
    // by the engine, which owns the cache.
    validate_coordinates(from, None).map_err(|e| DhtError::InvalidMessage(e.to_string()))?;

    if msg.kind == MessageKind::FindNode && !msg.is_response && msg.target_id.is_none() {
        return Err(DhtError::InvalidMessage(
            "find_node request requires target_id".into(),
        ));
    }

    if !msg.is_response && from.id == local_id {
        return Err(DhtError::InvalidMessage(
            "request claims the local system id".into(),
        ));
    }

    Ok(())
}
