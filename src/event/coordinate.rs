// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Replaceable event coordinate

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::kind::Kind;
use super::public_key::PublicKey;

/// [`Coordinate`] error
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid coordinate string
    #[error("invalid coordinate")]
    InvalidCoordinate,
}

/// Coordinate of a replaceable or addressable event
///
/// Serialized form: `<kind>:<pubkey>:<identifier>`, with an empty
/// identifier for plain replaceable kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    /// Kind
    pub kind: Kind,
    /// Author public key
    pub public_key: PublicKey,
    /// `d` tag identifier (empty if absent)
    pub identifier: String,
}

impl Coordinate {
    /// Construct new coordinate with an empty identifier.
    #[inline]
    pub fn new(kind: Kind, public_key: PublicKey) -> Self {
        Self {
            kind,
            public_key,
            identifier: String::new(),
        }
    }

    /// Set the identifier.
    #[inline]
    pub fn identifier<S>(mut self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.identifier = identifier.into();
        self
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.public_key, self.identifier)
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.splitn(3, ':');
        let kind: Kind = split
            .next()
            .and_then(|k| k.parse().ok())
            .ok_or(Error::InvalidCoordinate)?;
        let public_key: PublicKey = split
            .next()
            .and_then(|pk| PublicKey::from_hex(pk).ok())
            .ok_or(Error::InvalidCoordinate)?;
        let identifier: String = split.next().unwrap_or_default().to_string();
        Ok(Self {
            kind,
            public_key,
            identifier,
        })
    }
}

impl Serialize for Coordinate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let coordinate: String = String::deserialize(deserializer)?;
        Self::from_str(&coordinate).map_err(serde::de::Error::custom)
    }
}
