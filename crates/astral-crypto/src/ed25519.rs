//! Ed25519 identity keys.
//!
//! A node signs exactly one kind of payload: the attestation byte layout
//! bound to its system id. That keeps key handling deliberately small. The
//! node holds a single [`IdentityKey`]; everything that leaves it is plain
//! bytes (a 32-byte public key inside the System record, a 64-byte detached
//! signature inside the attestation). Peers are verified straight from those
//! raw bytes with [`verify_detached`], so no key or signature wrapper types
//! ever cross a crate boundary or the wire.

use ed25519_dalek::{Signer, Verifier};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// The node's Ed25519 signing identity.
///
/// The secret is zeroized on drop and never printed; the public half is what
/// System records advertise and observers bind first-write-wins.
pub struct IdentityKey {
    secret: ed25519_dalek::SigningKey,
}

impl IdentityKey {
    /// Generate a fresh identity from the OS entropy source.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            secret: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Rebuild an identity from its stored 32-byte secret.
    ///
    /// Every 32-byte string is a valid Ed25519 secret, so this cannot fail;
    /// guarding the key file against corruption is the caller's job.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// The raw secret, for writing to the key file.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The raw public key, as embedded in System records and attestations.
    pub fn public_key(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Produce a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.secret.sign(message).to_bytes()
    }
}

impl Clone for IdentityKey {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(&self.secret.to_bytes())
    }
}

impl Drop for IdentityKey {
    fn drop(&mut self) {
        let mut bytes = self.secret.to_bytes();
        bytes.zeroize();
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret stays out of logs; eight hex chars of the public key are
        // plenty to tell two identities apart.
        write!(f, "IdentityKey({}..)", &hex::encode(self.public_key())[..8])
    }
}

/// Verify a detached signature under a raw public key.
///
/// Rejects byte strings that do not decode to a curve point before touching
/// the signature, so a garbage key in a forged record cannot panic the
/// receive path.
pub fn verify_detached(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public_key)
        .map_err(|_| CryptoError::MalformedKey)?;
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    key.verify(message, &signature)
        .map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = IdentityKey::generate();
        let signature = key.sign(b"attestation payload");
        assert!(verify_detached(&key.public_key(), b"attestation payload", &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let key = IdentityKey::generate();
        let signature = key.sign(b"signed");
        assert_eq!(
            verify_detached(&key.public_key(), b"altered", &signature),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = IdentityKey::generate();
        let other = IdentityKey::generate();
        let signature = key.sign(b"payload");
        assert_eq!(
            verify_detached(&other.public_key(), b"payload", &signature),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_key_rejected_before_verify() {
        // All-ones does not decode to a curve point; the error must be the
        // key, not the signature.
        let key = IdentityKey::generate();
        let signature = key.sign(b"payload");
        assert_eq!(
            verify_detached(&[0xFF; 32], b"payload", &signature),
            Err(CryptoError::MalformedKey)
        );
    }

    #[test]
    fn test_secret_roundtrip_keeps_identity() {
        let key = IdentityKey::generate();
        let restored = IdentityKey::from_secret_bytes(&key.secret_bytes());
        assert_eq!(key.public_key(), restored.public_key());

        let signature = restored.sign(b"payload");
        assert!(verify_detached(&key.public_key(), b"payload", &signature).is_ok());
    }

    #[test]
    fn test_distinct_secrets_distinct_keys() {
        let a = IdentityKey::from_secret_bytes(&[7u8; 32]);
        let b = IdentityKey::from_secret_bytes(&[8u8; 32]);
        assert_ne!(a.public_key(), b.public_key());
        // Same secret, same identity.
        let a2 = IdentityKey::from_secret_bytes(&[7u8; 32]);
        assert_eq!(a.public_key(), a2.public_key());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = IdentityKey::from_secret_bytes(&[9u8; 32]);
        let printed = format!("{key:?}");
        assert!(printed.starts_with("IdentityKey("));
        assert!(!printed.contains(&hex::encode([9u8; 32])));
    }
}
