//! Signed, typed, timestamped attestations.
//!
//! Every DHT message embeds an attestation proving that the sender holds the
//! private key for its claimed system id. The signature covers the exact byte
//! layout `from (16) ‖ to (16) ‖ be_u64(timestamp) ‖ utf8(message_type)`;
//! any layout mismatch fails verification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use astral_crypto::ed25519::{verify_detached, IdentityKey};
use astral_crypto::CryptoError;

use crate::{SystemId, ATTESTATION_MAX_SKEW_SECS};

/// Attestation message-type strings for the DHT operations.
pub const MSG_DHT_PING: &str = "dht_ping";
pub const MSG_DHT_PING_RESPONSE: &str = "dht_ping_response";
pub const MSG_DHT_FIND_NODE: &str = "dht_find_node";
pub const MSG_DHT_FIND_NODE_RESPONSE: &str = "dht_find_node_response";
pub const MSG_DHT_ANNOUNCE: &str = "dht_announce";
pub const MSG_DHT_ANNOUNCE_RESPONSE: &str = "dht_announce_response";

/// Attestation validity failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed public key")]
    MalformedKey,

    #[error("timestamp out of window: skew {skew_secs}s exceeds {max_secs}s")]
    TimestampOutOfWindow { skew_secs: u64, max_secs: u64 },

    #[error("attestation sender {attested} does not match message sender {claimed}")]
    SenderMismatch { attested: Uuid, claimed: Uuid },
}

/// A signed proof that `from_system_id` produced a message of `message_type`
/// for `to_system_id` at `timestamp`.
///
/// `to_system_id` may be the nil UUID for broadcast-style messages and first
/// contacts where the recipient id is not yet known.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attestation {
    pub from_system_id: SystemId,
    pub to_system_id: SystemId,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub message_type: String,
    #[serde(with = "crate::serde_hex::hex64")]
    pub signature: [u8; 64],
    #[serde(with = "crate::serde_hex::hex32")]
    pub public_key: [u8; 32],
}

impl Attestation {
    /// The exact byte layout covered by the signature.
    pub fn signing_bytes(
        from: &SystemId,
        to: &SystemId,
        timestamp: u64,
        message_type: &str,
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16 + 16 + 8 + message_type.len());
        bytes.extend_from_slice(from.as_bytes());
        bytes.extend_from_slice(to.as_bytes());
        bytes.extend_from_slice(&timestamp.to_be_bytes());
        bytes.extend_from_slice(message_type.as_bytes());
        bytes
    }

    /// Create and sign an attestation with the node's identity key.
    pub fn sign(
        key: &IdentityKey,
        from: SystemId,
        to: SystemId,
        message_type: &str,
        timestamp: u64,
    ) -> Self {
        let payload = Self::signing_bytes(&from, &to, timestamp, message_type);
        Self {
            from_system_id: from,
            to_system_id: to,
            timestamp,
            message_type: message_type.to_string(),
            signature: key.sign(&payload),
            public_key: key.public_key(),
        }
    }

    /// Verify the embedded signature and the timestamp window against `now`.
    ///
    /// Identity binding (whether `public_key` is the key bound to
    /// `from_system_id`) is the caller's concern; this checks only what the
    /// attestation itself asserts.
    pub fn verify(&self, now: u64) -> Result<(), AttestationError> {
        let payload = Self::signing_bytes(
            &self.from_system_id,
            &self.to_system_id,
            self.timestamp,
            &self.message_type,
        );
        verify_detached(&self.public_key, &payload, &self.signature).map_err(|e| match e {
            CryptoError::MalformedKey => AttestationError::MalformedKey,
            CryptoError::BadSignature => AttestationError::InvalidSignature,
        })?;

        let skew = now.abs_diff(self.timestamp);
        if skew > ATTESTATION_MAX_SKEW_SECS {
            return Err(AttestationError::TimestampOutOfWindow {
                skew_secs: skew,
                max_secs: ATTESTATION_MAX_SKEW_SECS,
            });
        }
        Ok(())
    }

    /// Check that this attestation's sender matches the message's claimed
    /// sender id.
    pub fn check_sender(&self, claimed: SystemId) -> Result<(), AttestationError> {
        if self.from_system_id != claimed {
            return Err(AttestationError::SenderMismatch {
                attested: self.from_system_id,
                claimed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_750_000_000;

    fn signed(key: &IdentityKey, message_type: &str, timestamp: u64) -> Attestation {
        Attestation::sign(
            key,
            Uuid::new_v4(),
            Uuid::new_v4(),
            message_type,
            timestamp,
        )
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = IdentityKey::generate();
        let att = signed(&kp, MSG_DHT_PING, NOW);
        assert!(att.verify(NOW).is_ok());
    }

    #[test]
    fn test_tampered_type_fails() {
        let kp = IdentityKey::generate();
        let mut att = signed(&kp, MSG_DHT_PING, NOW);
        att.message_type = MSG_DHT_ANNOUNCE.to_string();
        assert_eq!(att.verify(NOW), Err(AttestationError::InvalidSignature));
    }

    #[test]
    fn test_tampered_timestamp_fails() {
        let kp = IdentityKey::generate();
        let mut att = signed(&kp, MSG_DHT_PING, NOW);
        att.timestamp += 1;
        assert_eq!(att.verify(NOW), Err(AttestationError::InvalidSignature));
    }

    #[test]
    fn test_tampered_sender_fails() {
        let kp = IdentityKey::generate();
        let mut att = signed(&kp, MSG_DHT_PING, NOW);
        att.from_system_id = Uuid::new_v4();
        assert_eq!(att.verify(NOW), Err(AttestationError::InvalidSignature));
    }

    #[test]
    fn test_skew_window() {
        let kp = IdentityKey::generate();
        // Exactly at the edge of the window: accepted.
        let att = signed(&kp, MSG_DHT_PING, NOW - ATTESTATION_MAX_SKEW_SECS);
        assert!(att.verify(NOW).is_ok());

        // One past the edge, in either direction: rejected.
        let stale = signed(&kp, MSG_DHT_PING, NOW - ATTESTATION_MAX_SKEW_SECS - 1);
        assert!(matches!(
            stale.verify(NOW),
            Err(AttestationError::TimestampOutOfWindow { .. })
        ));
        let future = signed(&kp, MSG_DHT_PING, NOW + ATTESTATION_MAX_SKEW_SECS + 1);
        assert!(matches!(
            future.verify(NOW),
            Err(AttestationError::TimestampOutOfWindow { .. })
        ));
    }

    #[test]
    fn test_sender_mismatch() {
        let kp = IdentityKey::generate();
        let att = signed(&kp, MSG_DHT_PING, NOW);
        assert!(att.check_sender(att.from_system_id).is_ok());
        let other = Uuid::new_v4();
        assert!(matches!(
            att.check_sender(other),
            Err(AttestationError::SenderMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp = IdentityKey::generate();
        let other = IdentityKey::generate();
        let mut att = signed(&kp, MSG_DHT_PING, NOW);
        att.public_key = other.public_key();
        assert_eq!(att.verify(NOW), Err(AttestationError::InvalidSignature));
    }

    #[test]
    fn test_json_roundtrip() {
        let kp = IdentityKey::generate();
        let att = signed(&kp, MSG_DHT_FIND_NODE, NOW);
        let json = serde_json::to_string(&att).expect("serialize");
        let back: Attestation = serde_json::from_str(&json).expect("deserialize");
        assert!(back.verify(NOW).is_ok());
        assert_eq!(back.message_type, MSG_DHT_FIND_NODE);
    }
}
