//! Sponsor-relative spherical placement.
//!
//! A new system's coordinates are a deterministic offset from its sponsor:
//! SHA-256(`id ‖ sponsor_id`) yields three words interpreted as spherical
//! coordinates (distance, azimuth θ, inclination φ). The inclination uses the
//! arccos transform so points distribute uniformly over the sphere rather
//! than bunching at the poles.

use uuid::Uuid;

use astral_crypto::sha256;
use astral_types::{Coordinates, StarClass, System};

use crate::{Result, StarfieldError};

/// Tolerance for comparing received coordinates to the derivation (L-infinity).
pub const COORDINATE_EPSILON: f64 = 0.01;

/// Minimum offset distance from the sponsor.
const MIN_DISTANCE: f64 = 100.0;

/// Size of the distance band above the minimum.
const DISTANCE_RANGE: f64 = 400.0;

/// Derive the placement of `id` sponsored by `sponsor_id` at `sponsor_coords`.
pub fn place_system(id: &Uuid, sponsor_id: &Uuid, sponsor_coords: &Coordinates) -> Coordinates {
    let digest = sha256::hash_parts(&[id.as_bytes(), sponsor_id.as_bytes()]);
    let unit = |word: usize| sha256::digest_word(&digest, word) as f64 / u64::MAX as f64;

    let distance = unit(0) * DISTANCE_RANGE + MIN_DISTANCE;
    let theta = unit(1) * std::f64::consts::TAU;
    let phi = (2.0 * unit(2) - 1.0).acos();

    Coordinates {
        x: sponsor_coords.x + distance * phi.sin() * theta.cos(),
        y: sponsor_coords.y + distance * phi.sin() * theta.sin(),
        z: sponsor_coords.z + distance * phi.cos(),
    }
}

/// Validate a record's coordinates against its sponsor chain.
///
/// - Sponsorless records must be the genesis X node at the origin.
/// - With a known sponsor, the coordinates must sit within
///   [`COORDINATE_EPSILON`] of the derived placement.
/// - An unknown sponsor cannot be checked; the record is accepted leniently
///   and re-validated once the sponsor is learned.
pub fn validate_coordinates(system: &System, sponsor_coords: Option<&Coordinates>) -> Result<()> {
    let Some(sponsor_id) = system.sponsor_id else {
        let at_origin = system.coords.chebyshev_distance(&Coordinates::ORIGIN) <= COORDINATE_EPSILON;
        if system.star_class != StarClass::X || !at_origin {
            return Err(StarfieldError::InvalidGenesis);
        }
        return Ok(());
    };

    let Some(sponsor_coords) = sponsor_coords else {
        return Ok(());
    };

    let expected = place_system(&system.id, &sponsor_id, sponsor_coords);
    let deviation = system.coords.chebyshev_distance(&expected);
    if deviation > COORDINATE_EPSILON {
        return Err(StarfieldError::CoordinateMismatch { deviation });
    }
    Ok(())
}
