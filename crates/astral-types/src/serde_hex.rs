//! Serde support for fixed-size byte arrays as hex strings.
//!
//! The wire protocol is JSON; keys and signatures travel as lowercase hex.

/// `[u8; 32]` as a hex string.
pub mod hex32 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 hex-encoded bytes"))
    }
}

/// `[u8; 64]` as a hex string.
pub mod hex64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 hex-encoded bytes"))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrap32(#[serde(with = "super::hex32")] [u8; 32]);

    #[derive(Serialize, Deserialize)]
    struct Wrap64(#[serde(with = "super::hex64")] [u8; 64]);

    #[test]
    fn test_hex32_roundtrip() {
        let value = Wrap32([0xAB; 32]);
        let json = serde_json::to_string(&value).expect("serialize");
        assert!(json.contains(&"ab".repeat(32)));
        let back: Wrap32 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.0, [0xAB; 32]);
    }

    #[test]
    fn test_hex64_roundtrip() {
        let value = Wrap64([0x01; 64]);
        let json = serde_json::to_string(&value).expect("serialize");
        let back: Wrap64 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.0[0], 0x01);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = serde_json::from_str::<Wrap32>("\"abcd\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_non_hex_rejected() {
        let err = serde_json::from_str::<Wrap32>(&format!("\"{}\"", "zz".repeat(32)));
        assert!(err.is_err());
    }
}
