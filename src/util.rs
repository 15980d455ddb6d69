// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Utilities

use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON round-trip helpers
pub trait JsonUtil: Sized + Serialize + DeserializeOwned
where
    <Self as JsonUtil>::Err: From<serde_json::Error>,
{
    /// Error
    type Err;

    /// Deserialize JSON
    #[inline]
    fn from_json<T>(json: T) -> Result<Self, Self::Err>
    where
        T: AsRef<[u8]>,
    {
        Ok(serde_json::from_slice(json.as_ref())?)
    }

    /// Serialize to JSON string
    ///
    /// Serialization of these types can't fail.
    #[inline]
    fn as_json(&self) -> String {
        serde_json::to_string(self).expect("failed to serialize to JSON")
    }
}
