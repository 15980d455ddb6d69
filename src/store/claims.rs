// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Claim tracker
//!
//! Refcount-style lifecycle for memory pressure management: claimed events
//! are protected from pruning, unclaimed ones are pruned in
//! least-recently-used order.

use core::fmt;
use std::collections::HashMap;

use lru::LruCache;

use crate::event::EventId;

/// Claim counts and recency order for stored events
pub struct ClaimTracker {
    /// Non-zero claim counts (absent means unclaimed)
    counts: HashMap<EventId, usize>,
    /// Recency order; value is unused
    recency: LruCache<EventId, ()>,
}

impl fmt::Debug for ClaimTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimTracker")
            .field("claimed", &self.counts.len())
            .field("tracked", &self.recency.len())
            .finish()
    }
}

impl Default for ClaimTracker {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
            recency: LruCache::unbounded(),
        }
    }
}

impl ClaimTracker {
    /// New empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an event (initially unclaimed, most recently used).
    pub(crate) fn track(&mut self, id: EventId) {
        self.recency.put(id, ());
    }

    /// Stop tracking an event, dropping its claims.
    pub(crate) fn forget(&mut self, id: &EventId) {
        self.counts.remove(id);
        self.recency.pop(id);
    }

    /// Increment the claim count.
    pub fn claim(&mut self, id: EventId) {
        *self.counts.entry(id).or_insert(0) += 1;
    }

    /// Decrement the claim count (never below zero).
    pub fn remove_claim(&mut self, id: &EventId) {
        if let Some(count) = self.counts.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(id);
            }
        }
    }

    /// Reset the claim count to zero.
    pub fn clear_claim(&mut self, id: &EventId) {
        self.counts.remove(id);
    }

    /// Check if the event has at least one claim.
    #[inline]
    pub fn is_claimed(&self, id: &EventId) -> bool {
        self.counts.contains_key(id)
    }

    /// Mark the event as recently used.
    pub fn touch(&mut self, id: &EventId) {
        self.recency.promote(id);
    }

    /// Unclaimed event IDs, least recently used first.
    pub fn unclaimed(&self) -> Vec<EventId> {
        self.recency
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !self.is_claimed(id))
            .rev()
            .collect()
    }

    /// Number of tracked events
    #[inline]
    pub fn len(&self) -> usize {
        self.recency.len()
    }

    /// Check if nothing is tracked
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }
}
