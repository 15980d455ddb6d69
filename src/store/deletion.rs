// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Deletion manager
//!
//! Tombstones derived from deletion request events (kind 5): a set of
//! deleted IDs plus per-coordinate deletion timestamps.

use core::str::FromStr;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::event::{Coordinate, Event, EventId, Kind, Timestamp};

/// Target of a deletion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeleteTarget {
    /// A specific event ID
    Event(EventId),
    /// A replaceable coordinate
    Address(Coordinate),
}

/// Notification emitted for each target of a processed deletion event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeletionNotice {
    /// What was deleted
    pub target: DeleteTarget,
    /// Deletion timestamp: for coordinates, versions strictly older than
    /// this are gone
    pub until: Timestamp,
}

/// Tombstone state
#[derive(Debug, Clone, Default)]
pub struct DeletionManager {
    deleted_ids: HashSet<EventId>,
    deleted_coordinates: HashMap<Coordinate, Timestamp>,
}

impl DeletionManager {
    /// New empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a deletion request event and record its tombstones.
    ///
    /// Targets are taken from `e` tags (event IDs) and `a` tags
    /// (coordinates). Coordinate tombstones are monotonic: an older
    /// deletion never lowers a recorded timestamp. Targets owned by a
    /// different author than the deletion event are skipped, as are
    /// malformed tag values.
    ///
    /// Ownership of an `e` target can only be enforced when the event is
    /// known: `resolve` maps an ID to the stored event, if any.
    pub fn add<F>(&mut self, delete_event: &Event, resolve: F) -> Vec<DeletionNotice>
    where
        F: Fn(&EventId) -> Option<Arc<Event>>,
    {
        debug_assert_eq!(delete_event.kind, Kind::EVENT_DELETION);

        let until: Timestamp = delete_event.created_at;
        let mut notices: Vec<DeletionNotice> = Vec::new();

        for tag in delete_event.tags.iter() {
            match (tag.name(), tag.content()) {
                ("e", Some(content)) => match EventId::from_hex(content) {
                    Ok(id) => {
                        if let Some(stored) = resolve(&id) {
                            if stored.pubkey != delete_event.pubkey {
                                tracing::warn!(%id, "skipping deletion of non-owned event");
                                continue;
                            }
                        }
                        if self.deleted_ids.insert(id) {
                            notices.push(DeletionNotice {
                                target: DeleteTarget::Event(id),
                                until,
                            });
                        }
                    }
                    Err(..) => tracing::warn!(value = %content, "malformed e tag in deletion"),
                },
                ("a", Some(content)) => match Coordinate::from_str(content) {
                    Ok(coordinate) => {
                        if coordinate.public_key != delete_event.pubkey {
                            tracing::warn!(%coordinate, "skipping deletion of non-owned coordinate");
                            continue;
                        }
                        let recorded: &mut Timestamp = self
                            .deleted_coordinates
                            .entry(coordinate.clone())
                            .and_modify(|t| {
                                if until > *t {
                                    *t = until;
                                }
                            })
                            .or_insert(until);
                        notices.push(DeletionNotice {
                            target: DeleteTarget::Address(coordinate),
                            until: *recorded,
                        });
                    }
                    Err(..) => tracing::warn!(value = %content, "malformed a tag in deletion"),
                },
                _ => {}
            }
        }

        notices
    }

    /// Check if the event is considered deleted.
    ///
    /// True when its ID is tombstoned, or when it is a replaceable event
    /// strictly older than its coordinate tombstone. A version with
    /// `created_at` equal to the tombstone survives.
    pub fn check(&self, event: &Event) -> bool {
        if self.deleted_ids.contains(&event.id) {
            return true;
        }

        match event.coordinate() {
            Some(coordinate) => match self.deleted_coordinates.get(&coordinate) {
                Some(until) => event.created_at < *until,
                None => false,
            },
            None => false,
        }
    }

    /// Check if the event ID is tombstoned.
    #[inline]
    pub fn is_id_deleted(&self, id: &EventId) -> bool {
        self.deleted_ids.contains(id)
    }

    /// Get the deletion timestamp recorded for a coordinate.
    #[inline]
    pub fn deleted_until(&self, coordinate: &Coordinate) -> Option<Timestamp> {
        self.deleted_coordinates.get(coordinate).copied()
    }

    /// Drop the deleted events from a sequence.
    pub fn filter<'a, I>(&'a self, events: I) -> impl Iterator<Item = Arc<Event>> + 'a
    where
        I: IntoIterator<Item = Arc<Event>> + 'a,
    {
        events.into_iter().filter(|event| !self.check(event))
    }

    /// Drop all tombstones
    pub(crate) fn clear(&mut self) {
        self.deleted_ids.clear();
        self.deleted_coordinates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_event, event_id, pubkey};

    fn delete_event(id: u8, author: u8, created_at: i64, tags: Vec<Vec<String>>) -> Event {
        build_event(
            id,
            author,
            5,
            created_at,
            tags.iter()
                .map(|tag| tag.iter().map(|v| v.as_str()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_id_tombstone() {
        let mut manager = DeletionManager::new();
        let target = build_event(1, 7, 1, 1_000, vec![]);
        let delete = delete_event(
            2,
            7,
            2_000,
            vec![vec!["e".into(), target.id.to_hex()]],
        );

        let notices = manager.add(&delete, |_| None);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].target, DeleteTarget::Event(target.id));
        assert!(manager.check(&target));
        assert!(manager.is_id_deleted(&target.id));

        // Re-processing emits no duplicate notice
        assert!(manager.add(&delete, |_| None).is_empty());
    }

    #[test]
    fn test_coordinate_tombstone_strictly_older() {
        let mut manager = DeletionManager::new();
        let older = build_event(1, 7, 30_000, 1_000, vec![vec!["d", "slug"]]);
        let equal = build_event(2, 7, 30_000, 1_500, vec![vec!["d", "slug"]]);
        let newer = build_event(3, 7, 30_000, 2_000, vec![vec!["d", "slug"]]);

        let coordinate: String = older.coordinate().unwrap().to_string();
        let delete = delete_event(4, 7, 1_500, vec![vec!["a".into(), coordinate]]);
        manager.add(&delete, |_| None);

        assert!(manager.check(&older));
        // Equal timestamp is not shadowed
        assert!(!manager.check(&equal));
        assert!(!manager.check(&newer));
    }

    #[test]
    fn test_coordinate_tombstone_monotonic() {
        let mut manager = DeletionManager::new();
        let coordinate = Coordinate::new(Kind::new(30_000), pubkey(7)).identifier("slug");
        let serialized: String = coordinate.to_string();

        manager.add(
            &delete_event(1, 7, 2_000, vec![vec!["a".into(), serialized.clone()]]),
            |_| None,
        );
        // Older tombstone does not lower the recorded timestamp
        let notices = manager.add(
            &delete_event(2, 7, 1_000, vec![vec!["a".into(), serialized]]),
            |_| None,
        );
        assert_eq!(
            manager.deleted_until(&coordinate),
            Some(Timestamp::from_secs(2_000))
        );
        assert_eq!(notices[0].until, Timestamp::from_secs(2_000));
    }

    #[test]
    fn test_non_owned_targets_are_skipped() {
        let mut manager = DeletionManager::new();
        let target = Arc::new(build_event(1, 7, 1, 1_000, vec![]));
        let foreign_coordinate = Coordinate::new(Kind::new(30_000), pubkey(7)).identifier("slug");

        let delete = delete_event(
            2,
            8,
            2_000,
            vec![
                vec!["e".into(), target.id.to_hex()],
                vec!["a".into(), foreign_coordinate.to_string()],
            ],
        );
        let resolve = {
            let target = Arc::clone(&target);
            move |id: &EventId| (id == &target.id).then(|| Arc::clone(&target))
        };
        let notices = manager.add(&delete, resolve);

        assert!(notices.is_empty());
        assert!(!manager.check(&target));
        assert!(manager.deleted_until(&foreign_coordinate).is_none());
    }

    #[test]
    fn test_malformed_targets_are_skipped() {
        let mut manager = DeletionManager::new();
        let delete = delete_event(
            1,
            7,
            1_000,
            vec![
                vec!["e".into(), "not-hex".into()],
                vec!["a".into(), "nonsense".into()],
            ],
        );
        assert!(manager.add(&delete, |_| None).is_empty());
    }

    #[test]
    fn test_filter() {
        let mut manager = DeletionManager::new();
        let kept = Arc::new(build_event(1, 7, 1, 1_000, vec![]));
        let dropped = Arc::new(build_event(2, 7, 1, 1_000, vec![]));
        manager.add(
            &delete_event(3, 7, 2_000, vec![vec!["e".into(), dropped.id.to_hex()]]),
            |_| None,
        );

        let remaining: Vec<Arc<Event>> = manager
            .filter(vec![kept.clone(), dropped.clone()])
            .collect();
        assert_eq!(remaining, vec![kept]);
    }

    #[test]
    fn test_unknown_id_is_tombstoned() {
        // Ownership can't be checked for events never stored
        let mut manager = DeletionManager::new();
        let delete = delete_event(1, 7, 1_000, vec![vec!["e".into(), event_id(9).to_hex()]]);
        manager.add(&delete, |_| None);
        assert!(manager.is_id_deleted(&event_id(9)));
    }
}
