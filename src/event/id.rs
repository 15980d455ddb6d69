// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Event ID

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// [`EventId`] error
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Hex decoding error
    #[error("invalid hex string")]
    Hex,
    /// Invalid event ID length
    #[error("invalid event ID length")]
    InvalidLength,
}

/// Event ID
///
/// 32-byte content-addressed identifier, treated as an opaque unique key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Event ID size (bytes)
    pub const LEN: usize = 32;

    /// Construct from a 32-byte array
    #[inline]
    pub const fn from_byte_array(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from hex string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let bytes: Vec<u8> = hex::decode(hex.as_ref()).map_err(|_| Error::Hex)?;
        Self::from_slice(&bytes)
    }

    /// Parse from bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; Self::LEN] = slice.try_into().map_err(|_| Error::InvalidLength)?;
        Ok(Self(bytes))
    }

    /// All zeros
    #[inline]
    pub const fn all_zeros() -> Self {
        Self([0u8; Self::LEN])
    }

    /// Get as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Get as hex string
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex: String = String::deserialize(deserializer)?;
        Self::from_hex(hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_HEX: &str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";

    #[test]
    fn test_hex_round_trip() {
        let id = EventId::from_hex(ID_HEX).unwrap();
        assert_eq!(id.to_hex(), ID_HEX);
    }

    #[test]
    fn test_invalid_hex() {
        assert_eq!(EventId::from_hex("not-hex"), Err(Error::Hex));
        assert_eq!(EventId::from_hex("aabb"), Err(Error::InvalidLength));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let smaller = EventId::from_byte_array([0u8; 32]);
        let bigger = EventId::from_byte_array([255u8; 32]);
        assert!(smaller < bigger);
    }
}
