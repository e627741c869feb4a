//! Deterministic star classification.
//!
//! The primary class is drawn from SHA-256(`id ‖ "primary_star"`) reduced
//! modulo 100 000 and bucketed by rarity tier. Companion (binary/trinary)
//! flags come from a distinct salt so the two rolls are independent.

use uuid::Uuid;

use astral_crypto::sha256;
use astral_types::{StarClass, System, GENESIS_SYSTEM_ID};

use crate::{Result, StarfieldError};

/// Salt for the primary-class roll.
const PRIMARY_SALT: &[u8] = b"primary_star";

/// Salt for the companion-flags roll.
const COMPANION_SALT: &[u8] = b"companions";

/// Roll range; tier thresholds below are cumulative counts out of this.
const ROLL_MODULUS: u64 = 100_000;

/// Cumulative rarity tiers: M 40%, K 25%, G 17.5%, F 10%, A 5%, B 2%, O 0.5%.
const TIER_M: u64 = 40_000;
const TIER_K: u64 = 65_000;
const TIER_G: u64 = 82_500;
const TIER_F: u64 = 92_500;
const TIER_A: u64 = 97_500;
const TIER_B: u64 = 99_500;

/// Companion thresholds: 5% trinary, a further 15% binary.
const TRINARY_BELOW: u64 = 5_000;
const BINARY_BELOW: u64 = 20_000;

fn roll(id: &Uuid, salt: &[u8]) -> u64 {
    let digest = sha256::hash_parts(&[id.as_bytes(), salt]);
    sha256::digest_word(&digest, 0) % ROLL_MODULUS
}

/// The star class every honest record for `id` must carry.
///
/// Never returns [`StarClass::X`]; X is the protected genesis singleton and
/// is handled by [`validate_star_class`].
pub fn expected_star_class(id: &Uuid) -> StarClass {
    match roll(id, PRIMARY_SALT) {
        v if v < TIER_M => StarClass::M,
        v if v < TIER_K => StarClass::K,
        v if v < TIER_G => StarClass::G,
        v if v < TIER_F => StarClass::F,
        v if v < TIER_A => StarClass::A,
        v if v < TIER_B => StarClass::B,
        _ => StarClass::O,
    }
}

/// Derived `(binary, trinary)` companion flags. At most one flag is set.
pub fn companion_flags(id: &Uuid) -> (bool, bool) {
    match roll(id, COMPANION_SALT) {
        v if v < TRINARY_BELOW => (false, true),
        v if v < BINARY_BELOW => (true, false),
        _ => (false, false),
    }
}

/// Validate that a record's class and companion flags match the derivation.
///
/// Class X is accepted only for the genesis id, or for any sponsorless record
/// when `isolated_network` is set (a private network bootstrapping its own
/// genesis).
pub fn validate_star_class(system: &System, isolated_network: bool) -> Result<()> {
    if system.star_class == StarClass::X {
        let genesis = system.id == GENESIS_SYSTEM_ID;
        let isolated_root = isolated_network && system.sponsor_id.is_none();
        if !genesis && !isolated_root {
            return Err(StarfieldError::ProtectedClass);
        }
        return Ok(());
    }

    let expected = expected_star_class(&system.id);
    if system.star_class != expected {
        return Err(StarfieldError::ClassMismatch {
            expected,
            claimed: system.star_class,
        });
    }

    let (binary, trinary) = companion_flags(&system.id);
    if system.binary_star != binary || system.trinary_star != trinary {
        return Err(StarfieldError::CompanionMismatch { id: system.id });
    }
    Ok(())
}
