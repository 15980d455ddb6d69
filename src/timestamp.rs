// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Time

use core::fmt;
use core::ops::{Add, Sub};
use core::str::FromStr;
use core::time::Duration;
use std::num::ParseIntError;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// UNIX timestamp in seconds
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from seconds
    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Compose `0` timestamp
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The minimum representable timestamp
    #[inline]
    pub const fn min() -> Self {
        Self(i64::MIN)
    }

    /// The maximum representable timestamp
    #[inline]
    pub const fn max() -> Self {
        Self(i64::MAX)
    }

    /// Get current UNIX timestamp
    pub fn now() -> Self {
        let secs: i64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self(secs)
    }

    /// Get timestamp as [`i64`]
    #[inline]
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Duration from `earlier` until this timestamp, or zero if this one is not later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        if self.0 > earlier.0 {
            Duration::from_secs((self.0 - earlier.0) as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

impl Add<i64> for Timestamp {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub<i64> for Timestamp {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let t = Timestamp::from_secs(1_000);
        assert_eq!(t + 5, Timestamp::from_secs(1_005));
        assert_eq!(t - 5, Timestamp::from_secs(995));
    }

    #[test]
    fn test_saturating_duration_since() {
        let earlier = Timestamp::from_secs(10);
        let later = Timestamp::from_secs(13);
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_secs(3)
        );
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp::min() < Timestamp::zero());
        assert!(Timestamp::zero() < Timestamp::max());
    }
}
