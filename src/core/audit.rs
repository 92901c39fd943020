//! Lifecycle audit for scheduled events.
//!
//! Every transition an event goes through in the scheduler is recorded as an
//! [`AuditEvent`]. The in-memory sink keeps a bounded window and is the sink
//! tests inspect to check exactly-once delivery.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Scheduler-side lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Event entered the table.
    Registered,
    /// Firing task spawned.
    Fired,
    /// Handler asked to run again.
    Requeued,
    /// Event removed after firing.
    Disposed,
    /// Event removed by `cancel_by_id`.
    Cancelled,
    /// Handler errored or panicked while firing.
    Faulted,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::Fired => "fired",
            Self::Requeued => "requeued",
            Self::Disposed => "disposed",
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique audit record identifier.
    pub event_id: String,
    /// Internal table key; distinguishes events sharing an id.
    pub entry_key: u64,
    /// Event identifier as seen by callers.
    pub id: String,
    /// Handler type name.
    pub handler: String,
    /// Transition recorded.
    pub action: LifecycleAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one clone and hand the
/// other to the scheduler.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of recorded `action`s for events called `id`.
    pub fn count(&self, id: &str, action: LifecycleAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.id == id && e.action == action)
            .count()
    }

    /// Actions recorded for `id`, oldest first.
    pub fn actions_for(&self, id: &str) -> Vec<LifecycleAction> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.id == id)
            .map(|e| e.action)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards every event to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::debug!(
            id = %event.id,
            handler = %event.handler,
            key = event.entry_key,
            detail = event.detail.as_deref().unwrap_or(""),
            "event {}",
            event.action
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    entry_key: u64,
    id: impl Into<String>,
    handler: impl Into<String>,
    action: LifecycleAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        entry_key,
        id: id.into(),
        handler: handler.into(),
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
