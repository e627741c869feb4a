//! # astral-starfield
//!
//! Deterministic placement and classification for the synthetic starfield.
//!
//! A system's star class, companion flags and coordinates are all pure
//! functions of its id (and its sponsor's placement). Any observer can
//! recompute them, which turns the visual layer into an anti-spoofing check:
//! a record whose class or coordinates disagree with the derivation is
//! rejected at the message boundary.

pub mod placement;
pub mod starclass;

pub use placement::{place_system, validate_coordinates, COORDINATE_EPSILON};
pub use starclass::{companion_flags, expected_star_class, validate_star_class};

/// Classification / placement validation failures.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum StarfieldError {
    #[error("star class mismatch: derived {expected}, record claims {claimed}")]
    ClassMismatch {
        expected: astral_types::StarClass,
        claimed: astral_types::StarClass,
    },

    #[error("companion flags mismatch for {id}")]
    CompanionMismatch { id: uuid::Uuid },

    #[error("star class X is reserved for the genesis system")]
    ProtectedClass,

    #[error("sponsorless system must be the genesis X node at the origin")]
    InvalidGenesis,

    #[error("coordinates deviate from sponsor-derived placement by {deviation}")]
    CoordinateMismatch { deviation: f64 },
}

pub type Result<T> = std::result::Result<T, StarfieldError>;
