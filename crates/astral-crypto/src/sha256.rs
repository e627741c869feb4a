//! SHA-256 helpers.
//!
//! Every deterministic derivation in Astral (star class, companion flags,
//! sponsor-relative placement, stable system ids) is defined over SHA-256.

use sha2::{Digest, Sha256};

/// Hash a byte slice with SHA-256.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of several byte slices with SHA-256.
pub fn hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Read a big-endian u64 from an 8-byte window of a digest.
///
/// `word` selects which consecutive 8-byte window to read (0..=3 for a
/// 32-byte digest).
pub fn digest_word(digest: &[u8; 32], word: usize) -> u64 {
    let start = word * 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[start..start + 8]);
    u64::from_be_bytes(buf)
}
