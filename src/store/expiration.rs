// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Expiration manager
//!
//! Tracks events carrying an `expiration` tag and drives a single
//! coalesced deadline for the whole set: one pending timer fires for the
//! next upcoming expiration, and tracking an earlier expiration re-arms
//! it. The worker loop that sleeps on the deadline lives in the store
//! facade; this module owns the tracked set and the re-arm signal.

use core::time::Duration;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::event::{Event, EventId};
use crate::timestamp::Timestamp;

/// Slack added to each scheduled delay to avoid waking up early, since the
/// countdown runs on the monotonic clock at millisecond precision while
/// expirations are whole wall-clock seconds.
pub(crate) const TIMER_SLACK: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Tracked {
    /// Pending expirations ordered by deadline
    deadlines: BTreeSet<(Timestamp, EventId)>,
    /// Deadline per tracked event
    by_id: HashMap<EventId, Timestamp>,
    /// Deadline the worker is currently sleeping towards
    armed: Option<Timestamp>,
}

/// Expiration tracking state
#[derive(Debug, Default)]
pub struct ExpirationManager {
    tracked: Mutex<Tracked>,
    rearm: Arc<Notify>,
}

impl ExpirationManager {
    /// New empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an event expiration.
    ///
    /// Expirations that are not strictly in the future are dropped
    /// silently; the ingest path rejects such events upstream unless
    /// `keep_expired` is set. Tracking an expiration earlier than the
    /// currently armed deadline re-arms the timer; a later one does not.
    pub async fn track(&self, id: EventId, expiration: Timestamp) {
        if expiration <= Timestamp::now() {
            return;
        }

        let mut tracked = self.tracked.lock().await;
        if let Some(previous) = tracked.by_id.insert(id, expiration) {
            tracked.deadlines.remove(&(previous, id));
        }
        tracked.deadlines.insert((expiration, id));

        if tracked.armed.map_or(true, |armed| expiration < armed) {
            self.rearm.notify_one();
        }
    }

    /// Stop tracking an event.
    pub async fn forget(&self, id: &EventId) {
        let mut tracked = self.tracked.lock().await;
        if let Some(expiration) = tracked.by_id.remove(id) {
            tracked.deadlines.remove(&(expiration, *id));
        }
    }

    /// Check if the event's expiration has passed (current time is at or
    /// beyond it).
    #[inline]
    pub fn check(event: &Event) -> bool {
        event.is_expired()
    }

    /// Number of tracked expirations
    pub async fn len(&self) -> usize {
        self.tracked.lock().await.by_id.len()
    }

    /// Check if nothing is tracked
    pub async fn is_empty(&self) -> bool {
        self.tracked.lock().await.by_id.is_empty()
    }

    /// Drop all tracked expirations and cancel the pending deadline.
    pub async fn clear(&self) {
        let mut tracked = self.tracked.lock().await;
        tracked.deadlines.clear();
        tracked.by_id.clear();
        self.rearm.notify_one();
    }

    /// Next upcoming deadline, recorded as the armed one.
    pub(crate) async fn next_deadline(&self) -> Option<Timestamp> {
        let mut tracked = self.tracked.lock().await;
        let next: Option<Timestamp> = tracked.deadlines.first().map(|(deadline, _)| *deadline);
        tracked.armed = next;
        next
    }

    /// Remove and return all entries expired at `now`.
    pub(crate) async fn take_expired(&self, now: Timestamp) -> Vec<EventId> {
        let mut tracked = self.tracked.lock().await;
        let mut expired: Vec<EventId> = Vec::new();
        while let Some((deadline, id)) = tracked.deadlines.first().copied() {
            if deadline > now {
                break;
            }
            tracked.deadlines.pop_first();
            tracked.by_id.remove(&id);
            expired.push(id);
        }
        expired
    }

    /// Handle used by the worker to wait for re-arms.
    pub(crate) fn rearm_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.rearm)
    }

    /// Wake the worker (used on shutdown so it can observe the store is gone).
    pub(crate) fn wake(&self) {
        self.rearm.notify_one();
    }
}
