// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Query result collection

use std::collections::btree_set::IntoIter;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::event::Event;
use crate::filter::Filter;

/// Descending sorted collection of events
///
/// When built from a filter with a `limit`, the collection is capped: once
/// full, an event older than the oldest kept one is not inserted.
#[derive(Debug, Clone)]
pub struct Events {
    set: BTreeSet<Arc<Event>>,
    capacity: Option<usize>,
    hash: u64,
    prev_not_match: bool,
}

impl PartialEq for Events {
    fn eq(&self, other: &Self) -> bool {
        self.set == other.set
    }
}

impl Eq for Events {}

impl Events {
    /// New collection, capped by the filter's `limit`.
    pub fn new(filter: &Filter) -> Self {
        let mut hasher = DefaultHasher::new();
        filter.hash(&mut hasher);
        let hash: u64 = hasher.finish();

        Self {
            set: BTreeSet::new(),
            capacity: filter.limit,
            hash,
            prev_not_match: false,
        }
    }

    /// Returns the number of events in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Checks if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Check if contains [`Event`]
    #[inline]
    pub fn contains(&self, event: &Event) -> bool {
        self.set.iter().any(|e| e.as_ref() == event)
    }

    /// Insert [`Event`]
    ///
    /// If the set did not previously contain an equal value, `true` is returned.
    pub fn insert(&mut self, event: Arc<Event>) -> bool {
        match self.capacity {
            Some(max) if self.set.len() >= max => {
                // Full: keep only if newer than the oldest kept event
                match self.set.last() {
                    Some(last) if &event < last => {
                        let inserted: bool = self.set.insert(event);
                        while self.set.len() > max {
                            self.set.pop_last();
                        }
                        inserted
                    }
                    _ => false,
                }
            }
            _ => self.set.insert(event),
        }
    }

    /// Insert events
    pub fn extend<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Arc<Event>>,
    {
        for event in events.into_iter() {
            self.insert(event);
        }
    }

    /// Merge events collections into a single one.
    ///
    /// Capacity is dropped if the two collections were built from different
    /// filters. In other words, the limit is respected only when merging
    /// results of the same filter.
    pub fn merge(mut self, other: Self) -> Self {
        if self.hash != other.hash || self.prev_not_match || other.prev_not_match {
            self.capacity = None;
            self.hash = 0;
            self.prev_not_match = true;
        }

        self.extend(other.set);
        self
    }

    /// Get first [`Event`] (newest)
    #[inline]
    pub fn first(&self) -> Option<&Arc<Event>> {
        self.set.first()
    }

    /// Get last [`Event`] (oldest)
    #[inline]
    pub fn last(&self) -> Option<&Arc<Event>> {
        self.set.last()
    }

    /// Iterate events in descending order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.set.iter()
    }

    /// Convert the collection to a vector of events.
    #[inline]
    pub fn to_vec(self) -> Vec<Arc<Event>> {
        self.into_iter().collect()
    }
}

impl IntoIterator for Events {
    type Item = Arc<Event>;
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.set.into_iter()
    }
}
