// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Event kind

use core::fmt;
use core::num::ParseIntError;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Event kind
///
/// Unsigned integer discriminator in `[0, 65535]`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Kind(u16);

impl Kind {
    /// Metadata (profile)
    pub const METADATA: Self = Self(0);
    /// Short text note
    pub const TEXT_NOTE: Self = Self(1);
    /// Contact list
    pub const CONTACT_LIST: Self = Self(3);
    /// Event deletion request
    pub const EVENT_DELETION: Self = Self(5);

    /// Construct from `u16`
    #[inline]
    pub const fn new(kind: u16) -> Self {
        Self(kind)
    }

    /// Get kind as `u16`
    #[inline]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Check if it's a replaceable kind
    ///
    /// A single logical "latest" version exists per `(kind, pubkey)`.
    #[inline]
    pub const fn is_replaceable(&self) -> bool {
        matches!(self.0, 0 | 3 | 10_000..=19_999)
    }

    /// Check if it's an addressable (parameterized replaceable) kind
    ///
    /// A single logical "latest" version exists per `(kind, pubkey, d-tag)`.
    #[inline]
    pub const fn is_addressable(&self) -> bool {
        matches!(self.0, 30_000..=39_999)
    }

    /// Check if it's an ephemeral kind
    #[inline]
    pub const fn is_ephemeral(&self) -> bool {
        matches!(self.0, 20_000..=29_999)
    }

    /// Check if it's a regular kind
    #[inline]
    pub const fn is_regular(&self) -> bool {
        !self.is_replaceable() && !self.is_addressable() && !self.is_ephemeral()
    }
}

impl From<u16> for Kind {
    fn from(kind: u16) -> Self {
        Self(kind)
    }
}

impl From<Kind> for u16 {
    fn from(kind: Kind) -> Self {
        kind.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Kind {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
