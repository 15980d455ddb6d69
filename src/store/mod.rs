// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Event store
//!
//! Facade composing the in-memory indexed set, the replaceable registry,
//! the deletion manager and the expiration manager. It enforces the
//! ingest protocol (version replacement, tombstones, expiration,
//! verification) and multicasts change streams for inserted, updated and
//! removed events.

use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tokio::sync::Notify;
use tokio::sync::RwLock;
use url::Url;

pub mod claims;
pub mod deletion;
pub mod expiration;
pub mod memory;
pub mod replaceable;

pub use self::claims::ClaimTracker;
pub use self::deletion::{DeleteTarget, DeletionManager, DeletionNotice};
pub use self::expiration::ExpirationManager;
pub use self::memory::EventMemory;
pub use self::replaceable::ReplaceableRegistry;
use crate::collections::events::Events;
use crate::database::EventDatabase;
use crate::error::Error;
use crate::event::{Coordinate, Event, EventId, Kind};
use crate::filter::Filter;
use crate::timestamp::Timestamp;

/// Change stream channel capacity
const CHANNEL_SIZE: usize = 4096;

/// Reason why an event was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectedReason {
    /// The event (or its coordinate, for an older version) is tombstoned
    Deleted,
    /// The event is expired and `keep_expired` is off
    Expired,
    /// The injected verifier refused the event
    InvalidSignature,
}

/// Outcome of an ingest
///
/// Callers distinguish the three cases by variant and, for the first two,
/// by identity of the returned instance: [`Saved`][Self::Saved] carries
/// the freshly stored instance, [`Existing`][Self::Existing] the already
/// stored one (duplicate or superseding version, side metadata merged).
#[derive(Debug, Clone)]
pub enum SaveEventOutcome {
    /// True insert: the event is now stored
    Saved(Arc<Event>),
    /// An instance for this event (or a newer version of its coordinate)
    /// was already stored
    Existing(Arc<Event>),
    /// The event was not stored
    Rejected(RejectedReason),
}

impl SaveEventOutcome {
    /// Check if the event was freshly stored.
    #[inline]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(..))
    }

    /// Get the stored instance, if any.
    #[inline]
    pub fn stored(&self) -> Option<&Arc<Event>> {
        match self {
            Self::Saved(event) | Self::Existing(event) => Some(event),
            Self::Rejected(..) => None,
        }
    }
}

/// Injected signature verifier
pub type VerifyEvent = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Store options
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Keep strictly-older versions of replaceable events (default: false)
    pub keep_old_versions: bool,
    /// Accept events whose expiration already passed (default: false)
    pub keep_expired: bool,
    /// Signature verifier; `None` disables signature checks
    pub verify_event: Option<VerifyEvent>,
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("keep_old_versions", &self.keep_old_versions)
            .field("keep_expired", &self.keep_expired)
            .field("verify_event", &self.verify_event.is_some())
            .finish()
    }
}

impl StoreOptions {
    /// New default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep strictly-older versions of replaceable events.
    pub fn keep_old_versions(mut self, keep: bool) -> Self {
        self.keep_old_versions = keep;
        self
    }

    /// Accept events whose expiration already passed.
    pub fn keep_expired(mut self, keep: bool) -> Self {
        self.keep_expired = keep;
        self
    }

    /// Set the signature verifier.
    pub fn verifier<F>(mut self, verify: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.verify_event = Some(Arc::new(verify));
        self
    }
}

/// Per-store side metadata of an event
///
/// Kept out of the shared event value: annotations are associative, keyed
/// by event identity, and survive duplicate-ingest merges. Duplicate
/// ingest unions the seen-relay set; `from_cache` may only become true.
#[derive(Debug, Clone, Default)]
struct EventMeta {
    /// Relays the event was seen on
    seen_on: HashSet<Url>,
    /// Whether the event came from a local cache
    from_cache: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    memory: EventMemory,
    replaceable: ReplaceableRegistry,
    deletions: DeletionManager,
    meta: HashMap<EventId, EventMeta>,
}

impl StoreState {
    /// Remove an event from the memory, the registry and the metadata map.
    fn purge(&mut self, id: &EventId) -> Option<Arc<Event>> {
        let event: Arc<Event> = self.memory.remove(id)?;
        self.replaceable.remove(&event);
        self.meta.remove(id);
        Some(event)
    }
}

#[derive(Debug)]
struct InnerEventStore {
    state: RwLock<StoreState>,
    expirations: ExpirationManager,
    database: Option<Arc<dyn EventDatabase>>,
    opts: StoreOptions,
    insert_tx: broadcast::Sender<Arc<Event>>,
    update_tx: broadcast::Sender<Arc<Event>>,
    remove_tx: broadcast::Sender<Arc<Event>>,
    deleted_tx: broadcast::Sender<DeletionNotice>,
    expired_tx: broadcast::Sender<EventId>,
}

impl Drop for InnerEventStore {
    fn drop(&mut self) {
        // Let a parked expiration worker observe that the store is gone
        self.expirations.wake();
    }
}

/// Reactive in-memory event store
///
/// Cheap to clone; all clones share the same state. Must be constructed
/// inside a tokio runtime: the expiration timer runs on a spawned task
/// that exits when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct EventStore {
    inner: Arc<InnerEventStore>,
}

impl EventStore {
    /// New store with default options
    pub fn new() -> Self {
        Self::with_opts(StoreOptions::default())
    }

    /// New store with options
    pub fn with_opts(opts: StoreOptions) -> Self {
        Self::build(opts, None)
    }

    /// New store backed by a secondary database
    ///
    /// Saves and removals are mirrored to the backend; query results
    /// coming from it are canonicalized through the in-memory cache, so
    /// identity of stored instances stays with the store.
    pub fn with_database<D>(opts: StoreOptions, database: D) -> Self
    where
        D: EventDatabase + 'static,
    {
        Self::build(opts, Some(Arc::new(database)))
    }

    fn build(opts: StoreOptions, database: Option<Arc<dyn EventDatabase>>) -> Self {
        if opts.verify_event.is_none() {
            tracing::warn!("no event verifier configured: signature checks are disabled");
        }

        let (insert_tx, _) = broadcast::channel(CHANNEL_SIZE);
        let (update_tx, _) = broadcast::channel(CHANNEL_SIZE);
        let (remove_tx, _) = broadcast::channel(CHANNEL_SIZE);
        let (deleted_tx, _) = broadcast::channel(CHANNEL_SIZE);
        let (expired_tx, _) = broadcast::channel(CHANNEL_SIZE);

        let inner: Arc<InnerEventStore> = Arc::new(InnerEventStore {
            state: RwLock::new(StoreState::default()),
            expirations: ExpirationManager::new(),
            database,
            opts,
            insert_tx,
            update_tx,
            remove_tx,
            deleted_tx,
            expired_tx,
        });

        let rearm: Arc<Notify> = inner.expirations.rearm_handle();
        tokio::spawn(expiration_worker(Arc::downgrade(&inner), rearm));

        Self { inner }
    }

    /// Subscribe to inserted events.
    ///
    /// Streams are multicast and start at the point of subscription; past
    /// emissions are not replayed.
    pub fn inserts(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.insert_tx.subscribe()
    }

    /// Subscribe to updated events.
    pub fn updates(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.update_tx.subscribe()
    }

    /// Subscribe to removed events.
    pub fn removals(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.remove_tx.subscribe()
    }

    /// Subscribe to deletion notices.
    ///
    /// A notice is emitted for each target of a processed deletion event,
    /// after all cascaded removals.
    pub fn deletions(&self) -> broadcast::Receiver<DeletionNotice> {
        self.inner.deleted_tx.subscribe()
    }

    /// Subscribe to expired event IDs.
    pub fn expirations(&self) -> broadcast::Receiver<EventId> {
        self.inner.expired_tx.subscribe()
    }

    /// Save an event into the store.
    pub async fn save_event(&self, event: Event) -> Result<SaveEventOutcome, Error> {
        self.save_with_source(event, None).await
    }

    /// Save an event, recording the relay it was seen on.
    pub async fn save_event_seen_on(
        &self,
        event: Event,
        relay_url: Url,
    ) -> Result<SaveEventOutcome, Error> {
        self.save_with_source(event, Some(relay_url)).await
    }

    async fn save_with_source(
        &self,
        event: Event,
        seen_on: Option<Url>,
    ) -> Result<SaveEventOutcome, Error> {
        // A malformed expiration tag is invalid input: surface the error
        // before touching any state.
        let expiration: Option<Timestamp> = event.expiration()?;

        let mut inserted: Option<Arc<Event>> = None;
        let mut removed: Vec<Arc<Event>> = Vec::new();
        let mut notices: Vec<DeletionNotice> = Vec::new();
        let mut track: Option<(EventId, Timestamp)> = None;

        let outcome: SaveEventOutcome = {
            let mut guard = self.inner.state.write().await;
            let state: &mut StoreState = &mut *guard;

            // Deletion requests update tombstones and cascade before the
            // delete event itself goes through the normal ingest below.
            if event.kind == Kind::EVENT_DELETION && !state.memory.has_event(&event.id) {
                let StoreState {
                    memory, deletions, ..
                } = &mut *state;
                notices = deletions.add(&event, |id| memory.event_by_id(id).cloned());
                removed.extend(cascade(state, &notices));
            }

            if state.deletions.check(&event) {
                SaveEventOutcome::Rejected(RejectedReason::Deleted)
            } else if !self.inner.opts.keep_expired
                && expiration.map_or(false, |t| t <= Timestamp::now())
            {
                SaveEventOutcome::Rejected(RejectedReason::Expired)
            } else if let Some(existing) = self.superseding_version(state, &event) {
                // A version of the coordinate at least as new is stored:
                // merge side metadata onto it and hand it back.
                if let Some(url) = seen_on {
                    state.meta.entry(existing.id).or_default().seen_on.insert(url);
                }
                SaveEventOutcome::Existing(existing)
            } else if !self.verify(&event) {
                SaveEventOutcome::Rejected(RejectedReason::InvalidSignature)
            } else {
                let (stored, fresh) = state.memory.add(event);
                if let Some(url) = seen_on {
                    state.meta.entry(stored.id).or_default().seen_on.insert(url);
                }
                if fresh {
                    state.replaceable.add(&stored);
                    if let Some(exp) = expiration {
                        track = Some((stored.id, exp));
                    }
                    if !self.inner.opts.keep_old_versions {
                        for old in state.replaceable.older_versions(&stored) {
                            if let Some(purged) = state.purge(&old.id) {
                                removed.push(purged);
                            }
                        }
                    }
                    inserted = Some(Arc::clone(&stored));
                    SaveEventOutcome::Saved(stored)
                } else {
                    SaveEventOutcome::Existing(stored)
                }
            }
        };

        if let Some((id, exp)) = track {
            self.inner.expirations.track(id, exp).await;
        }
        for event in removed.iter() {
            self.inner.expirations.forget(&event.id).await;
        }

        if let Some(database) = &self.inner.database {
            if let Some(event) = &inserted {
                database.save_event(event).await?;
            }
            for event in removed.iter() {
                database.remove_event(&event.id).await?;
            }
        }

        // Insert first, then the removals it caused, then deletion notices
        if let Some(event) = inserted {
            let _ = self.inner.insert_tx.send(event);
        }
        for event in removed {
            let _ = self.inner.remove_tx.send(event);
        }
        for notice in notices {
            let _ = self.inner.deleted_tx.send(notice);
        }

        Ok(outcome)
    }

    /// Latest stored version of the event's coordinate when it supersedes
    /// the incoming one.
    fn superseding_version(&self, state: &StoreState, event: &Event) -> Option<Arc<Event>> {
        if self.inner.opts.keep_old_versions {
            return None;
        }
        let coordinate: Coordinate = event.coordinate()?;
        let latest: &Arc<Event> = state.replaceable.latest(&coordinate)?;
        if latest.created_at >= event.created_at {
            Some(Arc::clone(latest))
        } else {
            None
        }
    }

    fn verify(&self, event: &Event) -> bool {
        match &self.inner.opts.verify_event {
            Some(verify) => verify(event),
            None => true,
        }
    }

    /// Remove an event. Returns whether something was removed; each actual
    /// removal emits exactly once on the removals stream.
    pub async fn remove_event(&self, id: &EventId) -> Result<bool, Error> {
        let removed: Option<Arc<Event>> = {
            let mut guard = self.inner.state.write().await;
            guard.purge(id)
        };
        match removed {
            Some(event) => {
                self.inner.expirations.forget(id).await;
                if let Some(database) = &self.inner.database {
                    database.remove_event(id).await?;
                }
                let _ = self.inner.remove_tx.send(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Signal that side metadata of an already-stored event changed.
    ///
    /// Reinserts the event (idempotent for the ID) and emits the stored
    /// instance on the updates stream.
    pub async fn update_event(&self, event: Event) -> Arc<Event> {
        let stored: Arc<Event> = {
            let mut guard = self.inner.state.write().await;
            let state: &mut StoreState = &mut *guard;
            let (stored, fresh) = state.memory.add(event);
            if fresh {
                state.replaceable.add(&stored);
            }
            stored
        };
        let _ = self.inner.update_tx.send(Arc::clone(&stored));
        stored
    }

    /// Query the store.
    ///
    /// Filters are OR-composed; each filter's `limit` applies to its own
    /// results before the union.
    #[tracing::instrument(skip_all, level = "trace")]
    pub async fn query(&self, filters: Vec<Filter>) -> Result<Events, Error> {
        // Backend instances are canonicalized through the memory before
        // answering, so the caller always sees store-owned instances.
        if let Some(database) = &self.inner.database {
            let fresh: Vec<Event> = database.query(filters.clone()).await?;
            if !fresh.is_empty() {
                let mut guard = self.inner.state.write().await;
                let state: &mut StoreState = &mut *guard;
                for event in fresh.into_iter() {
                    let (stored, fresh) = state.memory.add(event);
                    if fresh {
                        state.replaceable.add(&stored);
                    }
                }
            }
        }

        let guard = self.inner.state.read().await;
        let mut merged: Option<Events> = None;
        for filter in filters.into_iter() {
            let mut events = Events::new(&filter);
            events.extend(guard.memory.query(&filter));
            merged = Some(match merged {
                Some(acc) => acc.merge(events),
                None => events,
            });
        }
        Ok(merged.unwrap_or_else(|| Events::new(&Filter::new())))
    }

    /// Events matching the filters, in timeline order.
    pub async fn timeline(&self, filters: Vec<Filter>) -> Result<Vec<Arc<Event>>, Error> {
        Ok(self.query(filters).await?.to_vec())
    }

    /// Count events matching the filters.
    pub async fn count(&self, filters: Vec<Filter>) -> Result<usize, Error> {
        Ok(self.query(filters).await?.len())
    }

    /// Remove all events matching the filter. Returns how many were removed.
    pub async fn delete(&self, filter: Filter) -> Result<usize, Error> {
        let removed: Vec<Arc<Event>> = {
            let mut guard = self.inner.state.write().await;
            let state: &mut StoreState = &mut *guard;
            let ids: Vec<EventId> = state.memory.query(&filter).iter().map(|e| e.id).collect();
            ids.iter().filter_map(|id| state.purge(id)).collect()
        };

        for event in removed.iter() {
            self.inner.expirations.forget(&event.id).await;
            if let Some(database) = &self.inner.database {
                database.remove_event(&event.id).await?;
            }
        }
        let count: usize = removed.len();
        for event in removed {
            let _ = self.inner.remove_tx.send(event);
        }
        Ok(count)
    }

    /// Get the stored instance by ID.
    pub async fn event_by_id(&self, id: &EventId) -> Option<Arc<Event>> {
        let guard = self.inner.state.read().await;
        guard.memory.event_by_id(id).cloned()
    }

    /// Check if an event with the given ID is stored.
    pub async fn has_event(&self, id: &EventId) -> bool {
        let guard = self.inner.state.read().await;
        guard.memory.has_event(id)
    }

    /// Number of stored events
    pub async fn len(&self) -> usize {
        let guard = self.inner.state.read().await;
        guard.memory.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.state.read().await;
        guard.memory.is_empty()
    }

    /// Check if the event ID is tombstoned.
    pub async fn has_event_been_deleted(&self, id: &EventId) -> bool {
        let guard = self.inner.state.read().await;
        guard.deletions.is_id_deleted(id)
    }

    /// Check if a version of the coordinate created at `timestamp` would
    /// be considered deleted.
    pub async fn has_coordinate_been_deleted(
        &self,
        coordinate: &Coordinate,
        timestamp: &Timestamp,
    ) -> bool {
        let guard = self.inner.state.read().await;
        guard
            .deletions
            .deleted_until(coordinate)
            .map_or(false, |until| *timestamp < until)
    }

    /// Latest stored version for a replaceable coordinate.
    pub async fn replaceable_latest(&self, coordinate: &Coordinate) -> Option<Arc<Event>> {
        let guard = self.inner.state.read().await;
        guard.replaceable.latest(coordinate).cloned()
    }

    /// Stored version history for a replaceable coordinate, newest first.
    pub async fn replaceable_history(&self, coordinate: &Coordinate) -> Option<Vec<Arc<Event>>> {
        let guard = self.inner.state.read().await;
        guard
            .replaceable
            .history(coordinate)
            .map(|history| history.to_vec())
    }

    /// Increment the claim count of a stored event.
    pub async fn claim(&self, id: EventId) {
        let mut guard = self.inner.state.write().await;
        guard.memory.claim(id);
    }

    /// Decrement the claim count (never below zero).
    pub async fn remove_claim(&self, id: &EventId) {
        let mut guard = self.inner.state.write().await;
        guard.memory.remove_claim(id);
    }

    /// Reset the claim count to zero.
    pub async fn clear_claim(&self, id: &EventId) {
        let mut guard = self.inner.state.write().await;
        guard.memory.clear_claim(id);
    }

    /// Check if the event has at least one claim.
    pub async fn is_claimed(&self, id: &EventId) -> bool {
        let guard = self.inner.state.read().await;
        guard.memory.is_claimed(id)
    }

    /// Mark the event as recently used.
    pub async fn touch(&self, id: &EventId) {
        let mut guard = self.inner.state.write().await;
        guard.memory.touch(id);
    }

    /// Unclaimed events, least recently used first.
    pub async fn unclaimed(&self) -> Vec<Arc<Event>> {
        let guard = self.inner.state.read().await;
        guard.memory.unclaimed()
    }

    /// Remove unclaimed events in least-recently-used order, up to `limit`
    /// (all of them when `None`). Each removal emits on the removals
    /// stream. Returns how many were removed.
    pub async fn prune(&self, limit: Option<usize>) -> Result<usize, Error> {
        let removed: Vec<Arc<Event>> = {
            let mut guard = self.inner.state.write().await;
            let state: &mut StoreState = &mut *guard;
            let victims: Vec<Arc<Event>> = state.memory.prune(limit);
            for victim in victims.iter() {
                state.replaceable.remove(victim);
                state.meta.remove(&victim.id);
            }
            victims
        };

        for event in removed.iter() {
            self.inner.expirations.forget(&event.id).await;
            if let Some(database) = &self.inner.database {
                database.remove_event(&event.id).await?;
            }
        }
        let count: usize = removed.len();
        for event in removed {
            let _ = self.inner.remove_tx.send(event);
        }
        Ok(count)
    }

    /// Record that the event was seen on a relay.
    pub async fn event_id_seen(&self, id: EventId, relay_url: Url) {
        let mut guard = self.inner.state.write().await;
        guard.meta.entry(id).or_default().seen_on.insert(relay_url);
    }

    /// Relays the event was seen on.
    pub async fn event_seen_on_relays(&self, id: &EventId) -> Option<HashSet<Url>> {
        let guard = self.inner.state.read().await;
        guard.meta.get(id).map(|meta| meta.seen_on.clone())
    }

    /// Flag the event as loaded from a local cache.
    pub async fn mark_from_cache(&self, id: EventId) {
        let mut guard = self.inner.state.write().await;
        guard.meta.entry(id).or_default().from_cache = true;
    }

    /// Check if the event was flagged as loaded from a local cache.
    pub async fn is_from_cache(&self, id: &EventId) -> bool {
        let guard = self.inner.state.read().await;
        guard.meta.get(id).map_or(false, |meta| meta.from_cache)
    }

    /// Clear all state, including tombstones, claims, side metadata and
    /// pending expirations. Nothing is emitted.
    pub async fn wipe(&self) -> Result<(), Error> {
        {
            let mut guard = self.inner.state.write().await;
            let state: &mut StoreState = &mut *guard;
            state.memory.reset();
            state.replaceable.clear();
            state.deletions.clear();
            state.meta.clear();
        }
        self.inner.expirations.clear().await;
        if let Some(database) = &self.inner.database {
            database.wipe().await?;
        }
        Ok(())
    }
}

/// Remove the stored events covered by the deletion notices.
fn cascade(state: &mut StoreState, notices: &[DeletionNotice]) -> Vec<Arc<Event>> {
    let mut removed: Vec<Arc<Event>> = Vec::new();
    for notice in notices.iter() {
        match &notice.target {
            DeleteTarget::Event(id) => {
                if let Some(event) = state.purge(id) {
                    removed.push(event);
                }
            }
            DeleteTarget::Address(coordinate) => {
                let victims: Vec<Arc<Event>> = state
                    .replaceable
                    .history(coordinate)
                    .map(|history| {
                        history
                            .iter()
                            .filter(|version| version.created_at < notice.until)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                for victim in victims.into_iter() {
                    if let Some(event) = state.purge(&victim.id) {
                        removed.push(event);
                    }
                }
            }
        }
    }
    removed
}

/// Single coalesced timer: sleeps until the next upcoming expiration,
/// re-arming when an earlier one is tracked, and drains everything due on
/// fire. Exits when the store is dropped.
async fn expiration_worker(store: Weak<InnerEventStore>, rearm: Arc<Notify>) {
    loop {
        let next: Option<Timestamp> = match store.upgrade() {
            Some(inner) => inner.expirations.next_deadline().await,
            None => break,
        };
        match next {
            None => rearm.notified().await,
            Some(deadline) => {
                let delay = deadline.saturating_duration_since(Timestamp::now())
                    + expiration::TIMER_SLACK;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => match store.upgrade() {
                        Some(inner) => reap_expired(&inner).await,
                        None => break,
                    },
                    _ = rearm.notified() => {}
                }
            }
        }
    }
}

/// Emit and remove every tracked event whose expiration has passed.
async fn reap_expired(inner: &Arc<InnerEventStore>) {
    let now: Timestamp = Timestamp::now();
    for id in inner.expirations.take_expired(now).await {
        let _ = inner.expired_tx.send(id);
        let removed: Option<Arc<Event>> = {
            let mut guard = inner.state.write().await;
            guard.purge(&id)
        };
        if let Some(event) = removed {
            if let Some(database) = &inner.database {
                if let Err(e) = database.remove_event(&id).await {
                    tracing::error!(error = %e, "failed to remove expired event from database");
                }
            }
            let _ = inner.remove_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::timeout;

    use super::*;
    use crate::test_utils::{build_event, event_id, pubkey};

    fn relay(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_duplicate() {
        let store = EventStore::new();
        let mut inserts = store.inserts();
        let event = build_event(1, 1, 1, 1_000, vec![]);

        let outcome = store.save_event(event.clone()).await.unwrap();
        assert!(outcome.is_saved());
        let stored = outcome.stored().unwrap().clone();
        assert_eq!(inserts.try_recv().unwrap().id, event.id);

        // Same ID again: same instance, no emission, size unchanged
        let outcome = store.save_event(event).await.unwrap();
        match outcome {
            SaveEventOutcome::Existing(existing) => assert!(Arc::ptr_eq(&existing, &stored)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(inserts.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_remove_save() {
        let store = EventStore::new();
        let mut inserts = store.inserts();
        let mut removals = store.removals();
        let event = build_event(1, 1, 1, 1_000, vec![]);

        assert!(store.save_event(event.clone()).await.unwrap().is_saved());
        assert!(store.remove_event(&event.id).await.unwrap());
        assert!(!store.remove_event(&event.id).await.unwrap());
        // A plain removal is not a tombstone: re-ingest is a true insert
        assert!(store.save_event(event.clone()).await.unwrap().is_saved());

        assert!(inserts.try_recv().is_ok());
        assert!(inserts.try_recv().is_ok());
        assert_eq!(inserts.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(removals.try_recv().unwrap().id, event.id);
        assert_eq!(removals.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_replaceable_latest_wins() {
        let store = EventStore::new();
        let mut removals = store.removals();
        let p1 = build_event(1, 7, 0, 1_000, vec![]);
        let p2 = build_event(2, 7, 0, 2_000, vec![]);
        let p3 = build_event(3, 7, 0, 3_000, vec![]);

        // Out-of-order ingest: P2, P1, P3
        let stored_p2 = store
            .save_event(p2.clone())
            .await
            .unwrap()
            .stored()
            .unwrap()
            .clone();

        // An older version is superseded: the stored newer instance comes back
        match store.save_event(p1).await.unwrap() {
            SaveEventOutcome::Existing(existing) => assert!(Arc::ptr_eq(&existing, &stored_p2)),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // A newer version evicts the stored one
        assert!(store.save_event(p3.clone()).await.unwrap().is_saved());
        assert_eq!(removals.try_recv().unwrap().id, p2.id);

        let coordinate = Coordinate::new(Kind::METADATA, pubkey(7));
        let latest = store.replaceable_latest(&coordinate).await.unwrap();
        assert_eq!(latest.id, p3.id);
        assert_eq!(
            store.replaceable_history(&coordinate).await.unwrap().len(),
            1
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_replaceable_keep_old_versions() {
        let store = EventStore::with_opts(StoreOptions::new().keep_old_versions(true));
        let p1 = build_event(1, 7, 0, 1_000, vec![]);
        let p2 = build_event(2, 7, 0, 2_000, vec![]);
        let p3 = build_event(3, 7, 0, 3_000, vec![]);

        for event in [p2, p1, p3] {
            assert!(store.save_event(event).await.unwrap().is_saved());
        }

        let coordinate = Coordinate::new(Kind::METADATA, pubkey(7));
        let history = store.replaceable_history(&coordinate).await.unwrap();
        let ids: Vec<EventId> = history.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![event_id(3), event_id(2), event_id(1)]);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_delete_event_cascades_and_is_stored() {
        let store = EventStore::new();
        let target = build_event(1, 7, 1, 1_000, vec![]);
        store.save_event(target.clone()).await.unwrap();

        let mut inserts = store.inserts();
        let mut removals = store.removals();
        let mut deletions = store.deletions();

        let delete = build_event(9, 7, 5, 2_000, vec![vec!["e", &target.id.to_hex()]]);
        assert!(store.save_event(delete.clone()).await.unwrap().is_saved());

        // The delete event itself is stored and emitted, then the cascade,
        // then the deletion notice
        assert_eq!(inserts.try_recv().unwrap().id, delete.id);
        assert_eq!(removals.try_recv().unwrap().id, target.id);
        let notice = deletions.try_recv().unwrap();
        assert_eq!(notice.target, DeleteTarget::Event(target.id));
        assert_eq!(notice.until, Timestamp::from_secs(2_000));

        assert!(!store.has_event(&target.id).await);
        assert!(store.has_event(&delete.id).await);
        assert!(store.has_event_been_deleted(&target.id).await);

        // Tombstoned ingest is rejected, nothing is emitted
        match store.save_event(target).await.unwrap() {
            SaveEventOutcome::Rejected(RejectedReason::Deleted) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(inserts.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_addressable_deletion_spares_newer_version() {
        let store = EventStore::with_opts(StoreOptions::new().keep_old_versions(true));
        let a1 = build_event(1, 7, 30_000, 1_000, vec![vec!["d", "slug"]]);
        let a2 = build_event(2, 7, 30_000, 2_000, vec![vec!["d", "slug"]]);
        store.save_event(a1.clone()).await.unwrap();
        store.save_event(a2.clone()).await.unwrap();

        let coordinate = a1.coordinate().unwrap();
        let delete = build_event(9, 7, 5, 1_500, vec![vec!["a", &coordinate.to_string()]]);
        store.save_event(delete).await.unwrap();

        assert!(!store.has_event(&a1.id).await);
        assert!(store.has_event(&a2.id).await);

        // Strictly-older versions of the coordinate can no longer enter
        let a0 = build_event(3, 7, 30_000, 1_200, vec![vec!["d", "slug"]]);
        match store.save_event(a0).await.unwrap() {
            SaveEventOutcome::Rejected(RejectedReason::Deleted) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }

        // A version created exactly at the tombstone timestamp survives
        assert!(store
            .has_coordinate_been_deleted(&coordinate, &Timestamp::from_secs(1_200))
            .await);
        assert!(!store
            .has_coordinate_been_deleted(&coordinate, &Timestamp::from_secs(1_500))
            .await);
    }

    #[tokio::test]
    async fn test_expiration_cascade() {
        let store = EventStore::new();
        let mut expirations = store.expirations();
        let mut removals = store.removals();

        let deadline: String = (Timestamp::now() + 1).to_string();
        let event = build_event(1, 1, 1, 1_000, vec![vec!["expiration", &deadline]]);
        assert!(store.save_event(event.clone()).await.unwrap().is_saved());
        assert_eq!(store.len().await, 1);

        let expired_id = timeout(Duration::from_secs(3), expirations.recv())
            .await
            .expect("expiration fired")
            .unwrap();
        assert_eq!(expired_id, event.id);

        let removed = timeout(Duration::from_secs(1), removals.recv())
            .await
            .expect("removal fired")
            .unwrap();
        assert_eq!(removed.id, event.id);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_expired_ingest() {
        let store = EventStore::new();
        let deadline: String = Timestamp::now().to_string();
        let event = build_event(1, 1, 1, 1_000, vec![vec!["expiration", &deadline]]);

        // Expiration equal to now counts as expired
        match store.save_event(event.clone()).await.unwrap() {
            SaveEventOutcome::Rejected(RejectedReason::Expired) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }

        let keeping = EventStore::with_opts(StoreOptions::new().keep_expired(true));
        assert!(keeping.save_event(event).await.unwrap().is_saved());
    }

    #[tokio::test]
    async fn test_invalid_expiration_is_an_error() {
        let store = EventStore::new();
        let event = build_event(1, 1, 1, 1_000, vec![vec!["expiration", "soon"]]);
        assert!(matches!(
            store.save_event(event).await,
            Err(Error::Tag(..))
        ));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_verifier() {
        let rejecting = EventStore::with_opts(StoreOptions::new().verifier(|_| false));
        let event = build_event(1, 1, 1, 1_000, vec![]);
        match rejecting.save_event(event.clone()).await.unwrap() {
            SaveEventOutcome::Rejected(RejectedReason::InvalidSignature) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(rejecting.len().await, 0);

        let accepting = EventStore::with_opts(StoreOptions::new().verifier(|_| true));
        assert!(accepting.save_event(event).await.unwrap().is_saved());
    }

    #[tokio::test]
    async fn test_update_event() {
        let store = EventStore::new();
        let mut updates = store.updates();
        let event = build_event(1, 1, 1, 1_000, vec![]);

        let stored = store
            .save_event(event.clone())
            .await
            .unwrap()
            .stored()
            .unwrap()
            .clone();
        let updated = store.update_event(event).await;
        assert!(Arc::ptr_eq(&stored, &updated));
        assert!(Arc::ptr_eq(&updates.try_recv().unwrap(), &stored));
    }

    #[tokio::test]
    async fn test_side_metadata_merges() {
        let store = EventStore::new();
        let event = build_event(1, 1, 1, 1_000, vec![]);

        store
            .save_event_seen_on(event.clone(), relay("wss://relay.one/"))
            .await
            .unwrap();
        store
            .save_event_seen_on(event.clone(), relay("wss://relay.two/"))
            .await
            .unwrap();

        let seen_on = store.event_seen_on_relays(&event.id).await.unwrap();
        assert_eq!(seen_on.len(), 2);

        assert!(!store.is_from_cache(&event.id).await);
        store.mark_from_cache(event.id).await;
        assert!(store.is_from_cache(&event.id).await);

        // Metadata goes away with the event
        store.remove_event(&event.id).await.unwrap();
        assert!(store.event_seen_on_relays(&event.id).await.is_none());
    }

    #[tokio::test]
    async fn test_superseded_ingest_merges_metadata_onto_latest() {
        let store = EventStore::new();
        let v2 = build_event(2, 7, 0, 2_000, vec![]);
        store.save_event(v2.clone()).await.unwrap();

        let v1 = build_event(1, 7, 0, 1_000, vec![]);
        store
            .save_event_seen_on(v1, relay("wss://relay.one/"))
            .await
            .unwrap();

        let seen_on = store.event_seen_on_relays(&v2.id).await.unwrap();
        assert!(seen_on.contains(&relay("wss://relay.one/")));
    }

    #[tokio::test]
    async fn test_query_multi_filter_union() {
        let store = EventStore::new();
        store
            .save_event(build_event(1, 1, 1, 1_000, vec![]))
            .await
            .unwrap();
        store
            .save_event(build_event(2, 2, 0, 2_000, vec![]))
            .await
            .unwrap();

        let events = store
            .query(vec![
                Filter::new().kind(Kind::TEXT_NOTE),
                Filter::new().kind(Kind::METADATA),
                // Overlapping filter: results are de-duplicated by ID
                Filter::new().author(pubkey(1)),
            ])
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        let timeline = store
            .timeline(vec![Filter::new()])
            .await
            .unwrap();
        let ids: Vec<EventId> = timeline.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![event_id(2), event_id(1)]);
        assert_eq!(store.count(vec![Filter::new()]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_filter_emits_removals() {
        let store = EventStore::new();
        let mut removals = store.removals();
        store
            .save_event(build_event(1, 1, 1, 1_000, vec![]))
            .await
            .unwrap();
        store
            .save_event(build_event(2, 1, 0, 2_000, vec![]))
            .await
            .unwrap();

        let count = store.delete(Filter::new().kind(Kind::TEXT_NOTE)).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(removals.try_recv().unwrap().id, event_id(1));
        assert_eq!(removals.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_claims_protect_from_prune() {
        let store = EventStore::new();
        let mut removals = store.removals();
        store
            .save_event(build_event(1, 1, 1, 1_000, vec![]))
            .await
            .unwrap();
        store
            .save_event(build_event(2, 1, 1, 2_000, vec![]))
            .await
            .unwrap();

        store.claim(event_id(2)).await;
        assert!(store.is_claimed(&event_id(2)).await);

        let pruned = store.prune(None).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(removals.try_recv().unwrap().id, event_id(1));
        assert!(store.has_event(&event_id(2)).await);

        store.remove_claim(&event_id(2)).await;
        assert_eq!(store.unclaimed().await.len(), 1);
        assert_eq!(store.prune(None).await.unwrap(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_database_backing() {
        let database = crate::database::MemoryDatabase::new();
        let store = EventStore::with_database(StoreOptions::default(), database.clone());
        let event = build_event(1, 1, 1, 1_000, vec![]);

        // Saves and removals are mirrored
        store.save_event(event.clone()).await.unwrap();
        assert!(database.has_event(&event.id).await.unwrap());
        store.remove_event(&event.id).await.unwrap();
        assert!(!database.has_event(&event.id).await.unwrap());

        // Backend results are canonicalized through the cache
        let external = build_event(2, 1, 1, 2_000, vec![]);
        database.save_event(&external).await.unwrap();
        let first = store.query(vec![Filter::new()]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(store.has_event(&external.id).await);
        let second = store.query(vec![Filter::new()]).await.unwrap();
        assert!(Arc::ptr_eq(
            first.first().unwrap(),
            second.first().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_streams_are_multicast() {
        let store = EventStore::new();
        let mut first = store.inserts();
        let mut second = store.inserts();

        store
            .save_event(build_event(1, 1, 1, 1_000, vec![]))
            .await
            .unwrap();
        assert_eq!(first.try_recv().unwrap().id, event_id(1));
        assert_eq!(second.try_recv().unwrap().id, event_id(1));
    }

    #[tokio::test]
    async fn test_wipe() {
        let store = EventStore::new();
        let target = build_event(1, 7, 1, 1_000, vec![]);
        store.save_event(target.clone()).await.unwrap();
        let delete = build_event(9, 7, 5, 2_000, vec![vec!["e", &target.id.to_hex()]]);
        store.save_event(delete).await.unwrap();

        store.wipe().await.unwrap();
        assert!(store.is_empty().await);
        assert!(!store.has_event_been_deleted(&target.id).await);

        // Tombstones are gone: the event can be stored again
        assert!(store.save_event(target).await.unwrap().is_saved());
    }
}
