//! The single ordered event table backing the scheduler.
//!
//! One map holds every live event, keyed by an insertion sequence number.
//! An entry is either queued (`fire_at` is set) or in flight (`fire_at` is
//! `None`); there is no second table to keep in sync, so cancelling or
//! disposing removes the event everywhere at once.
//!
//! A requeue posted mid-firing sets `fire_at` again while the firing is still
//! running. The entry stays out of [`EventTable::due`] until its [`InFlight`]
//! marker is dropped and its mailbox is empty, so one event never has two
//! firings at once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tokio::time::Instant;

use super::ScheduledEventInfo;
use crate::core::handler::{
    FiringContext, Liveness, Mailbox, ManagementMessage, Payload, ScheduledHandler,
};

pub(crate) struct EventEntry {
    pub(crate) id: String,
    pub(crate) handler: Arc<dyn ScheduledHandler>,
    pub(crate) payload: Payload,
    pub(crate) fire_at: Option<Instant>,
    pub(crate) liveness: Liveness,
    firing: Arc<AtomicBool>,
    tx: Sender<ManagementMessage>,
    rx: Receiver<ManagementMessage>,
}

/// Held by a firing task for as long as the firing runs.
///
/// Drop it only after the firing's last mailbox post.
#[must_use]
pub(crate) struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EventEntry {
    pub(crate) fn new(
        id: String,
        handler: Arc<dyn ScheduledHandler>,
        payload: Payload,
        fire_at: Instant,
        mailbox_capacity: usize,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(mailbox_capacity.max(1));
        Self {
            id,
            handler,
            payload,
            fire_at: Some(fire_at),
            liveness: Liveness::default(),
            firing: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    pub(crate) fn handler_name(&self) -> String {
        self.handler.name().to_string()
    }

    pub(crate) fn is_firing(&self) -> bool {
        self.firing.load(Ordering::Acquire)
    }

    /// Due at `now` with no firing running and no unapplied post.
    fn is_due(&self, now: Instant) -> bool {
        self.fire_at.is_some_and(|at| at <= now) && !self.is_firing() && self.rx.is_empty()
    }

    fn info(&self, fire_at: Instant) -> ScheduledEventInfo {
        ScheduledEventInfo {
            id: self.id.clone(),
            fire_at,
            handler: Arc::clone(&self.handler),
            payload: self.payload.clone(),
        }
    }
}

/// What applying a management message did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Requeued(Instant),
    Disposed,
}

#[derive(Default)]
pub(crate) struct EventTable {
    entries: BTreeMap<u64, EventEntry>,
    next_key: u64,
}

impl EventTable {
    pub(crate) fn insert(&mut self, entry: EventEntry) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(key, entry);
        key
    }

    pub(crate) fn get(&self, key: u64) -> Option<&EventEntry> {
        self.entries.get(&key)
    }

    /// Remove the first event with `id` in insertion order, queued or in flight.
    pub(crate) fn cancel_first(&mut self, id: &str) -> Option<(u64, EventEntry)> {
        let key = self
            .entries
            .iter()
            .find_map(|(key, entry)| (entry.id == id).then_some(*key))?;
        let entry = self.remove(key)?;
        Some((key, entry))
    }

    /// First queued event with `id`. An in-flight event is visible only once
    /// its requeue has been applied.
    pub(crate) fn lookup(&self, id: &str) -> Option<ScheduledEventInfo> {
        self.entries.values().find_map(|entry| match entry.fire_at {
            Some(at) if entry.id == id => Some(entry.info(at)),
            _ => None,
        })
    }

    /// All queued events in insertion order.
    pub(crate) fn pending(&self) -> Vec<ScheduledEventInfo> {
        self.entries
            .values()
            .filter_map(|entry| entry.fire_at.map(|at| entry.info(at)))
            .collect()
    }

    /// Keys of queued events due at `now`, in insertion order. Events whose
    /// previous firing is still running are held back.
    pub(crate) fn due(&self, now: Instant) -> Vec<u64> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| entry.is_due(now).then_some(*key))
            .collect()
    }

    /// Move a due event into flight and build the context for its firing.
    pub(crate) fn begin_firing(
        &mut self,
        key: u64,
    ) -> Option<(Arc<dyn ScheduledHandler>, FiringContext, InFlight)> {
        let entry = self.entries.get_mut(&key)?;
        if entry.is_firing() {
            return None;
        }
        let scheduled_for = entry.fire_at.take()?;
        entry.firing.store(true, Ordering::Release);
        let ctx = FiringContext::new(
            entry.id.clone(),
            entry.payload.clone(),
            scheduled_for,
            Mailbox::new(entry.tx.clone()),
            entry.liveness.clone(),
        );
        Some((
            Arc::clone(&entry.handler),
            ctx,
            InFlight(Arc::clone(&entry.firing)),
        ))
    }

    /// Drain every entry's mailbox, oldest entry first.
    pub(crate) fn drain_mailboxes(&self) -> Vec<(u64, ManagementMessage)> {
        self.entries
            .iter()
            .flat_map(|(key, entry)| entry.rx.try_iter().map(move |msg| (*key, msg)))
            .collect()
    }

    pub(crate) fn apply(&mut self, key: u64, message: ManagementMessage) -> Option<Applied> {
        match message {
            ManagementMessage::Requeue(at) => {
                let entry = self.entries.get_mut(&key)?;
                let at = at.resolve(Instant::now());
                entry.fire_at = Some(at);
                Some(Applied::Requeued(at))
            }
            ManagementMessage::Dispose => self.remove(key).map(|_| Applied::Disposed),
        }
    }

    fn remove(&mut self, key: u64) -> Option<EventEntry> {
        let entry = self.entries.remove(&key)?;
        entry.liveness.revoke();
        Some(entry)
    }

    /// Remove everything, revoking liveness.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.entries.len();
        for entry in std::mem::take(&mut self.entries).into_values() {
            entry.liveness.revoke();
        }
        n
    }

    /// Events in the table, queued or in flight.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
