// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Pluggable event database backend

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::collections::events::Events;
use crate::error::DatabaseError;
use crate::event::{Event, EventId};
use crate::filter::Filter;
use crate::store::memory::EventMemory;

/// Read/write event database
///
/// The store facade owns event identity: backends may return fresh
/// instances, which the facade canonicalizes through its in-memory cache.
#[async_trait]
pub trait EventDatabase: fmt::Debug + Send + Sync {
    /// Save [`Event`] into the backend.
    ///
    /// This method assumes the event already passed the ingest protocol.
    async fn save_event(&self, event: &Event) -> Result<(), DatabaseError>;

    /// Remove the event with the given ID. Returns whether something was removed.
    async fn remove_event(&self, event_id: &EventId) -> Result<bool, DatabaseError>;

    /// Get [`Event`] by [`EventId`]
    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, DatabaseError>;

    /// Check if an event with the given ID exists.
    async fn has_event(&self, event_id: &EventId) -> Result<bool, DatabaseError>;

    /// Query the backend with filters.
    async fn query(&self, filters: Vec<Filter>) -> Result<Vec<Event>, DatabaseError>;

    /// Count events matching the filters.
    async fn count(&self, filters: Vec<Filter>) -> Result<usize, DatabaseError> {
        Ok(self.query(filters).await?.len())
    }

    /// Wipe all data
    async fn wipe(&self) -> Result<(), DatabaseError>;
}

/// Memory (RAM) backend
///
/// Standalone [`EventDatabase`] implementation over the same indexed
/// in-memory set the store facade uses. Claim and touch state is a facade
/// concern and is not maintained here.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    helper: Arc<RwLock<EventMemory>>,
}

impl MemoryDatabase {
    /// New empty memory database
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventDatabase for MemoryDatabase {
    async fn save_event(&self, event: &Event) -> Result<(), DatabaseError> {
        let mut helper = self.helper.write().await;
        helper.add(event.clone());
        Ok(())
    }

    async fn remove_event(&self, event_id: &EventId) -> Result<bool, DatabaseError> {
        let mut helper = self.helper.write().await;
        Ok(helper.remove(event_id).is_some())
    }

    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, DatabaseError> {
        let helper = self.helper.read().await;
        Ok(helper.event_by_id(event_id).map(|e| e.as_ref().clone()))
    }

    async fn has_event(&self, event_id: &EventId) -> Result<bool, DatabaseError> {
        let helper = self.helper.read().await;
        Ok(helper.has_event(event_id))
    }

    #[tracing::instrument(skip_all, level = "trace")]
    async fn query(&self, filters: Vec<Filter>) -> Result<Vec<Event>, DatabaseError> {
        let helper = self.helper.read().await;
        let mut merged: Option<Events> = None;
        for filter in filters.into_iter() {
            let mut events = Events::new(&filter);
            events.extend(helper.query(&filter));
            merged = Some(match merged {
                Some(acc) => acc.merge(events),
                None => events,
            });
        }
        Ok(merged
            .map(|events| {
                events
                    .into_iter()
                    .map(|e| e.as_ref().clone())
                    .collect::<Vec<Event>>()
            })
            .unwrap_or_default())
    }

    async fn wipe(&self) -> Result<(), DatabaseError> {
        let mut helper = self.helper.write().await;
        helper.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_event;

    #[tokio::test]
    async fn test_save_query_remove() {
        let db = MemoryDatabase::new();
        let event = build_event(1, 1, 1, 1_000, vec![]);

        db.save_event(&event).await.unwrap();
        assert!(db.has_event(&event.id).await.unwrap());
        assert_eq!(db.count(vec![Filter::new()]).await.unwrap(), 1);

        // Returned instances are fresh clones
        let queried = db.query(vec![Filter::new()]).await.unwrap();
        assert_eq!(queried, vec![event.clone()]);

        assert!(db.remove_event(&event.id).await.unwrap());
        assert!(!db.remove_event(&event.id).await.unwrap());
        assert!(db.query(vec![Filter::new()]).await.unwrap().is_empty());
    }
}
