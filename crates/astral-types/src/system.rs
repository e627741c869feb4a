//! The `System` record: one participant in the overlay.

use serde::{Deserialize, Serialize};

use crate::{SystemId, MAX_NAME_BYTES};

/// A position in the synthetic 3-D starfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinates {
    pub const ORIGIN: Coordinates = Coordinates {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Coordinates) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Chebyshev (L-infinity) distance, used for placement tolerance checks.
    pub fn chebyshev_distance(&self, other: &Coordinates) -> f64 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }
}

/// Primary star classification.
///
/// Classes O through M follow the deterministic derivation over the system id;
/// X is the protected genesis singleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StarClass {
    O,
    B,
    A,
    F,
    G,
    K,
    M,
    X,
}

impl StarClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StarClass::O => "O",
            StarClass::B => "B",
            StarClass::A => "A",
            StarClass::F => "F",
            StarClass::G => "G",
            StarClass::K => "K",
            StarClass::M => "M",
            StarClass::X => "X",
        }
    }
}

impl std::fmt::Display for StarClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StarClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "O" => Ok(StarClass::O),
            "B" => Ok(StarClass::B),
            "A" => Ok(StarClass::A),
            "F" => Ok(StarClass::F),
            "G" => Ok(StarClass::G),
            "K" => Ok(StarClass::K),
            "M" => Ok(StarClass::M),
            "X" => Ok(StarClass::X),
            other => Err(format!("unknown star class: {other}")),
        }
    }
}

/// The canonical participant entity.
///
/// A `System` is both an identity (id + public key) and a record (name,
/// placement, address, version stamp). `info_version` is a monotonic counter
/// that settles gossip races: a strictly smaller incoming version never
/// overwrites locally held info.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub name: String,
    pub coords: Coordinates,
    pub star_class: StarClass,
    #[serde(default)]
    pub binary_star: bool,
    #[serde(default)]
    pub trinary_star: bool,
    /// Transport-level address, `host:port`.
    pub peer_address: String,
    /// The system that placed this one. Absent only for the genesis X node.
    #[serde(default)]
    pub sponsor_id: Option<SystemId>,
    #[serde(with = "crate::serde_hex::hex32")]
    pub public_key: [u8; 32],
    #[serde(default)]
    pub info_version: u64,
    pub created_at: u64,
    pub last_seen_at: u64,
}

impl System {
    /// Whether the name fits the 64-byte UTF-8 budget.
    pub fn name_is_valid(&self) -> bool {
        !self.name.is_empty() && self.name.len() <= MAX_NAME_BYTES
    }
}
