// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! In-memory indexed event set
//!
//! Canonical set of currently-stored events plus the secondary indexes
//! that accelerate filter queries: by ID, kind, author, (kind, author)
//! and single-letter tag. The timeline is the descending `created_at`
//! view all query results are ordered by.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::claims::ClaimTracker;
use crate::event::{Event, EventId, Kind, PublicKey};
use crate::filter::{Filter, SingleLetterTag};

/// Upper bound on `|kinds| * |authors|` for which the composite
/// (kind, author) index is preferred over single-key indexes.
const MAX_COMPOSITE_PRODUCT: usize = 10;

enum Candidates<'a> {
    /// Scan the full timeline
    Timeline,
    /// Pre-selected superset of the matches, in timeline order
    Set(BTreeSet<&'a Arc<Event>>),
}

enum IndexPick<'a> {
    Kinds,
    Authors,
    TagOr(SingleLetterTag, Vec<&'a String>),
    TagAnd(SingleLetterTag, &'a String),
}

/// Indexed event set
#[derive(Debug, Default)]
pub struct EventMemory {
    ids: HashMap<EventId, Arc<Event>>,
    timeline: BTreeSet<Arc<Event>>,
    kind_index: HashMap<Kind, BTreeSet<Arc<Event>>>,
    author_index: HashMap<PublicKey, BTreeSet<Arc<Event>>>,
    kind_author_index: HashMap<(Kind, PublicKey), BTreeSet<Arc<Event>>>,
    tag_index: HashMap<SingleLetterTag, HashMap<String, BTreeSet<Arc<Event>>>>,
    claims: ClaimTracker,
}

impl EventMemory {
    /// New empty memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event into every index it qualifies for.
    ///
    /// If an event with the same ID is already present, the stored
    /// instance is returned and the second element is `false`; the caller
    /// merges side metadata.
    pub fn add(&mut self, event: Event) -> (Arc<Event>, bool) {
        if let Some(existing) = self.ids.get(&event.id) {
            return (Arc::clone(existing), false);
        }

        let event: Arc<Event> = Arc::new(event);

        self.ids.insert(event.id, Arc::clone(&event));
        self.timeline.insert(Arc::clone(&event));
        self.kind_index
            .entry(event.kind)
            .or_default()
            .insert(Arc::clone(&event));
        self.author_index
            .entry(event.pubkey)
            .or_default()
            .insert(Arc::clone(&event));
        self.kind_author_index
            .entry((event.kind, event.pubkey))
            .or_default()
            .insert(Arc::clone(&event));

        for (letter, values) in event.tags.indexes().iter() {
            let by_value = self.tag_index.entry(*letter).or_default();
            for value in values.iter() {
                by_value
                    .entry(value.clone())
                    .or_default()
                    .insert(Arc::clone(&event));
            }
        }

        self.claims.track(event.id);

        (event, true)
    }

    /// Remove an event from every index. Returns the removed instance.
    pub fn remove(&mut self, id: &EventId) -> Option<Arc<Event>> {
        let event: Arc<Event> = self.ids.remove(id)?;

        self.timeline.remove(&event);

        if let Some(set) = self.kind_index.get_mut(&event.kind) {
            set.remove(&event);
            if set.is_empty() {
                self.kind_index.remove(&event.kind);
            }
        }

        if let Some(set) = self.author_index.get_mut(&event.pubkey) {
            set.remove(&event);
            if set.is_empty() {
                self.author_index.remove(&event.pubkey);
            }
        }

        if let Some(set) = self.kind_author_index.get_mut(&(event.kind, event.pubkey)) {
            set.remove(&event);
            if set.is_empty() {
                self.kind_author_index.remove(&(event.kind, event.pubkey));
            }
        }

        for (letter, values) in event.tags.indexes().iter() {
            if let Some(by_value) = self.tag_index.get_mut(letter) {
                for value in values.iter() {
                    if let Some(set) = by_value.get_mut(value) {
                        set.remove(&event);
                        if set.is_empty() {
                            by_value.remove(value);
                        }
                    }
                }
                if by_value.is_empty() {
                    self.tag_index.remove(letter);
                }
            }
        }

        self.claims.forget(id);

        Some(event)
    }

    /// Check if an event with the given ID is stored.
    #[inline]
    pub fn has_event(&self, id: &EventId) -> bool {
        self.ids.contains_key(id)
    }

    /// Get the stored instance by ID.
    #[inline]
    pub fn event_by_id(&self, id: &EventId) -> Option<&Arc<Event>> {
        self.ids.get(id)
    }

    /// Number of stored events
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the memory is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate all stored events in timeline order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.timeline.iter()
    }

    fn tag_bucket_len(&self, letter: &SingleLetterTag, value: &str) -> usize {
        self.tag_index
            .get(letter)
            .and_then(|by_value| by_value.get(value))
            .map_or(0, |set| set.len())
    }

    /// Choose the smallest available index superset for the filter.
    fn candidates(&self, filter: &Filter) -> Candidates<'_> {
        // IDs bound the result directly
        if let Some(ids) = &filter.ids {
            if !ids.is_empty() {
                return Candidates::Set(ids.iter().filter_map(|id| self.ids.get(id)).collect());
            }
        }

        // Composite index when the (kind, author) product is small
        if let (Some(kinds), Some(authors)) = (&filter.kinds, &filter.authors) {
            if !kinds.is_empty()
                && !authors.is_empty()
                && kinds.len().saturating_mul(authors.len()) <= MAX_COMPOSITE_PRODUCT
            {
                let mut set: BTreeSet<&Arc<Event>> = BTreeSet::new();
                for kind in kinds.iter() {
                    for author in authors.iter() {
                        if let Some(bucket) = self.kind_author_index.get(&(*kind, *author)) {
                            set.extend(bucket.iter());
                        }
                    }
                }
                return Candidates::Set(set);
            }
        }

        let mut best: Option<(usize, IndexPick<'_>)> = None;

        if let Some(kinds) = &filter.kinds {
            if !kinds.is_empty() {
                let cost: usize = kinds
                    .iter()
                    .map(|kind| self.kind_index.get(kind).map_or(0, |set| set.len()))
                    .sum();
                best = Some((cost, IndexPick::Kinds));
            }
        }

        if let Some(authors) = &filter.authors {
            if !authors.is_empty() {
                let cost: usize = authors
                    .iter()
                    .map(|author| self.author_index.get(author).map_or(0, |set| set.len()))
                    .sum();
                if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                    best = Some((cost, IndexPick::Authors));
                }
            }
        }

        // Any single AND value bounds the matches
        for (letter, values) in filter.and_tags.iter() {
            if let Some((cost, value)) = values
                .iter()
                .map(|value| (self.tag_bucket_len(letter, value), value))
                .min_by_key(|(cost, _)| *cost)
            {
                if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                    best = Some((cost, IndexPick::TagAnd(*letter, value)));
                }
            }
        }

        // OR values need the union of their buckets; values already
        // required by `&x` on the same letter are not part of the OR
        for (letter, values) in filter.generic_tags.iter() {
            let required: Option<&BTreeSet<String>> = filter.and_tags.get(letter);
            let effective: Vec<&String> = values
                .iter()
                .filter(|value| required.map_or(true, |r| !r.contains(*value)))
                .collect();
            if effective.is_empty() {
                continue;
            }
            let cost: usize = effective
                .iter()
                .map(|value| self.tag_bucket_len(letter, value))
                .sum();
            if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                best = Some((cost, IndexPick::TagOr(*letter, effective)));
            }
        }

        match best {
            Some((_, IndexPick::Kinds)) => {
                let mut set: BTreeSet<&Arc<Event>> = BTreeSet::new();
                for kind in filter.kinds.iter().flatten() {
                    if let Some(bucket) = self.kind_index.get(kind) {
                        set.extend(bucket.iter());
                    }
                }
                Candidates::Set(set)
            }
            Some((_, IndexPick::Authors)) => {
                let mut set: BTreeSet<&Arc<Event>> = BTreeSet::new();
                for author in filter.authors.iter().flatten() {
                    if let Some(bucket) = self.author_index.get(author) {
                        set.extend(bucket.iter());
                    }
                }
                Candidates::Set(set)
            }
            Some((_, IndexPick::TagOr(letter, values))) => {
                let mut set: BTreeSet<&Arc<Event>> = BTreeSet::new();
                if let Some(by_value) = self.tag_index.get(&letter) {
                    for value in values.into_iter() {
                        if let Some(bucket) = by_value.get(value) {
                            set.extend(bucket.iter());
                        }
                    }
                }
                Candidates::Set(set)
            }
            Some((_, IndexPick::TagAnd(letter, value))) => {
                let mut set: BTreeSet<&Arc<Event>> = BTreeSet::new();
                if let Some(bucket) = self
                    .tag_index
                    .get(&letter)
                    .and_then(|by_value| by_value.get(value))
                {
                    set.extend(bucket.iter());
                }
                Candidates::Set(set)
            }
            None => Candidates::Timeline,
        }
    }

    /// Events matching the filter, in timeline order, capped by `limit`.
    pub fn query(&self, filter: &Filter) -> Vec<Arc<Event>> {
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Vec::new();
            }
        }

        let limit: usize = filter.limit.unwrap_or(usize::MAX);
        match self.candidates(filter) {
            Candidates::Timeline => self
                .timeline
                .iter()
                .filter(|event| filter.match_event(event.as_ref()))
                .take(limit)
                .cloned()
                .collect(),
            Candidates::Set(set) => set
                .into_iter()
                .filter(|event| filter.match_event(event.as_ref()))
                .take(limit)
                .cloned()
                .collect(),
        }
    }

    /// Count events matching the filter (capped by `limit`, like `query`).
    pub fn count(&self, filter: &Filter) -> usize {
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return 0;
            }
        }

        let limit: usize = filter.limit.unwrap_or(usize::MAX);
        match self.candidates(filter) {
            Candidates::Timeline => self
                .timeline
                .iter()
                .filter(|event| filter.match_event(event.as_ref()))
                .take(limit)
                .count(),
            Candidates::Set(set) => set
                .into_iter()
                .filter(|event| filter.match_event(event.as_ref()))
                .take(limit)
                .count(),
        }
    }

    /// Remove all events matching the filter. Returns the removed instances.
    pub fn delete(&mut self, filter: &Filter) -> Vec<Arc<Event>> {
        let ids: Vec<EventId> = self.query(filter).iter().map(|event| event.id).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Increment the claim count of a stored event.
    pub fn claim(&mut self, id: EventId) {
        if self.ids.contains_key(&id) {
            self.claims.claim(id);
        }
    }

    /// Decrement the claim count (never below zero).
    #[inline]
    pub fn remove_claim(&mut self, id: &EventId) {
        self.claims.remove_claim(id);
    }

    /// Reset the claim count to zero.
    #[inline]
    pub fn clear_claim(&mut self, id: &EventId) {
        self.claims.clear_claim(id);
    }

    /// Check if the event has at least one claim.
    #[inline]
    pub fn is_claimed(&self, id: &EventId) -> bool {
        self.claims.is_claimed(id)
    }

    /// Mark the event as recently used.
    #[inline]
    pub fn touch(&mut self, id: &EventId) {
        self.claims.touch(id);
    }

    /// Unclaimed events, least recently used first.
    pub fn unclaimed(&self) -> Vec<Arc<Event>> {
        self.claims
            .unclaimed()
            .iter()
            .filter_map(|id| self.ids.get(id))
            .cloned()
            .collect()
    }

    /// Remove unclaimed events in least-recently-used order, up to `limit`
    /// (all of them when `None`). Returns the removed instances.
    pub fn prune(&mut self, limit: Option<usize>) -> Vec<Arc<Event>> {
        let mut victims: Vec<EventId> = self.claims.unclaimed();
        if let Some(limit) = limit {
            victims.truncate(limit);
        }
        victims.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
