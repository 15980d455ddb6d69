// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Replaceable event registry
//!
//! Per-coordinate version history, newest first. Ties on `created_at` are
//! broken by ascending event ID: the smaller ID wins.

use core::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::event::{Coordinate, Event};

fn version_order(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Registry of replaceable/addressable event histories
#[derive(Debug, Clone, Default)]
pub struct ReplaceableRegistry {
    histories: HashMap<Coordinate, Vec<Arc<Event>>>,
}

impl ReplaceableRegistry {
    /// New empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a version at its position in the coordinate history.
    ///
    /// Returns `false` for non-replaceable kinds and for already-known IDs.
    pub fn add(&mut self, event: &Arc<Event>) -> bool {
        let coordinate: Coordinate = match event.coordinate() {
            Some(coordinate) => coordinate,
            None => return false,
        };

        let history: &mut Vec<Arc<Event>> = self.histories.entry(coordinate).or_default();
        match history.binary_search_by(|probe| version_order(probe, event)) {
            // Same `(created_at, id)` position means the same event
            Ok(..) => false,
            Err(position) => {
                history.insert(position, Arc::clone(event));
                true
            }
        }
    }

    /// Remove a specific version.
    pub fn remove(&mut self, event: &Event) -> bool {
        let coordinate: Coordinate = match event.coordinate() {
            Some(coordinate) => coordinate,
            None => return false,
        };

        match self.histories.get_mut(&coordinate) {
            Some(history) => {
                let len: usize = history.len();
                history.retain(|version| version.id != event.id);
                let removed: bool = history.len() != len;
                if history.is_empty() {
                    self.histories.remove(&coordinate);
                }
                removed
            }
            None => false,
        }
    }

    /// Check if the coordinate has at least one version.
    #[inline]
    pub fn has(&self, coordinate: &Coordinate) -> bool {
        self.histories.contains_key(coordinate)
    }

    /// Latest version for the coordinate.
    #[inline]
    pub fn latest(&self, coordinate: &Coordinate) -> Option<&Arc<Event>> {
        self.histories
            .get(coordinate)
            .and_then(|history| history.first())
    }

    /// Full version history for the coordinate, newest first.
    #[inline]
    pub fn history(&self, coordinate: &Coordinate) -> Option<&[Arc<Event>]> {
        self.histories.get(coordinate).map(|history| &history[..])
    }

    /// Versions of the event's coordinate strictly older than the event.
    pub fn older_versions(&self, event: &Event) -> Vec<Arc<Event>> {
        match event.coordinate().and_then(|c| self.histories.get(&c)) {
            Some(history) => history
                .iter()
                .filter(|version| version.created_at < event.created_at)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop all histories
    pub(crate) fn clear(&mut self) {
        self.histories.clear();
    }
}
