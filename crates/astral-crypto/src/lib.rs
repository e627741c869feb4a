//! # astral-crypto
//!
//! Cryptographic primitives for the Astral overlay:
//! - Ed25519 identity keys and detached-signature verification over the raw
//!   key bytes that System records carry
//! - SHA-256 helpers (all deterministic derivations hash with SHA-256)
//! - Stable system-id derivation from host material

pub mod ed25519;
pub mod identity;
pub mod sha256;

/// Cryptographic error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The public key bytes do not decode to a curve point.
    #[error("malformed public key")]
    MalformedKey,

    /// The signature does not verify under the given key.
    #[error("signature verification failed")]
    BadSignature,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
