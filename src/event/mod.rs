// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Event

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub mod coordinate;
pub mod id;
pub mod kind;
pub mod public_key;
pub mod tag;

pub use self::coordinate::Coordinate;
pub use self::id::EventId;
pub use self::kind::Kind;
pub use self::public_key::PublicKey;
pub use self::tag::{Tag, Tags};
pub use crate::timestamp::Timestamp;
use crate::util::JsonUtil;

/// Event
///
/// Immutable signed record. The store treats `sig` as opaque bytes and
/// never verifies it itself; verification is an injected predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// ID
    pub id: EventId,
    /// Author
    pub pubkey: PublicKey,
    /// UNIX timestamp (seconds)
    pub created_at: Timestamp,
    /// Kind
    pub kind: Kind,
    /// Tag list
    pub tags: Tags,
    /// Content
    pub content: String,
    /// Signature (opaque)
    pub sig: String,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.created_at != other.created_at {
            // Descending timeline order
            self.created_at.cmp(&other.created_at).reverse()
        } else {
            self.id.cmp(&other.id).reverse()
        }
    }
}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Event {
    /// Compose event
    pub fn new<I, S1, S2>(
        id: EventId,
        pubkey: PublicKey,
        created_at: Timestamp,
        kind: Kind,
        tags: I,
        content: S1,
        sig: S2,
    ) -> Self
    where
        I: IntoIterator<Item = Tag>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            id,
            pubkey,
            created_at,
            kind,
            tags: Tags::new(tags.into_iter().collect()),
            content: content.into(),
            sig: sig.into(),
        }
    }

    /// Get the replaceable coordinate of this event.
    ///
    /// `None` for kinds that are neither replaceable nor addressable.
    /// The identifier is the first `d` tag value, or empty if absent.
    pub fn coordinate(&self) -> Option<Coordinate> {
        if self.kind.is_replaceable() {
            Some(Coordinate::new(self.kind, self.pubkey))
        } else if self.kind.is_addressable() {
            Some(
                Coordinate::new(self.kind, self.pubkey)
                    .identifier(self.tags.identifier().unwrap_or_default()),
            )
        } else {
            None
        }
    }

    /// Get the expiration timestamp, if an `expiration` tag exists.
    #[inline]
    pub fn expiration(&self) -> Result<Option<Timestamp>, tag::Error> {
        self.tags.expiration()
    }

    /// Check if the event is expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(&Timestamp::now())
    }

    /// Check if the event is expired at a specific timestamp.
    ///
    /// An expiration exactly equal to `now` counts as expired. A missing
    /// or malformed expiration tag counts as not expired.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        matches!(self.tags.expiration(), Ok(Some(t)) if t <= *now)
    }
}

impl JsonUtil for Event {
    type Err = serde_json::Error;
}
