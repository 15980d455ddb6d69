// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Test helpers

use crate::event::{Event, EventId, Kind, PublicKey, Tag};
use crate::timestamp::Timestamp;

/// Deterministic event ID from a marker byte.
pub(crate) fn event_id(marker: u8) -> EventId {
    EventId::from_byte_array([marker; 32])
}

/// Deterministic public key from a marker byte.
pub(crate) fn pubkey(marker: u8) -> PublicKey {
    PublicKey::from_byte_array([marker; 32])
}

/// Build an event with fabricated identifiers.
///
/// The signature is a placeholder: the store never verifies signatures
/// itself, verification is injected.
pub(crate) fn build_event(
    id: u8,
    author: u8,
    kind: u16,
    created_at: i64,
    tags: Vec<Vec<&str>>,
) -> Event {
    Event::new(
        event_id(id),
        pubkey(author),
        Timestamp::from_secs(created_at),
        Kind::new(kind),
        tags.into_iter()
            .map(|tag| Tag::parse(tag).expect("non-empty tag")),
        "",
        hex::encode([id; 64]),
    )
}
