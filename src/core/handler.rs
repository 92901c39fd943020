//! Handler traits and the scheduled-handler lifecycle protocol.
//!
//! Active handlers are consulted synchronously with recognized speech and
//! claim jurisdiction by returning `true`. Scheduled (passive) handlers are
//! fired by the scheduler and report back through a [`Mailbox`]:
//!
//! ```text
//! Registered ──fire time reached──► Firing ──Requeue──► Registered
//!                                      │
//!                                      └──Dispose / nothing / fault──► Disposed
//! ```
//!
//! A firing handler posts at most one [`ManagementMessage`]. Posting nothing
//! is read as `Dispose` once the firing task completes. The scheduler polls
//! mailboxes every tick, so a `Requeue` posted early in a long firing shows up
//! in lookups before the firing finishes; the next firing still waits until
//! the current one has returned.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use crossbeam_channel::{Sender, TrySendError};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::warn;

use super::error::AppResult;
use crate::util::clock;

/// Opaque data handed to a scheduled handler with every firing.
pub type Payload = serde_json::Value;

/// Handler consulted for every recognized sub-phrase.
#[async_trait]
pub trait ActiveHandler: Send + Sync {
    /// Inspect `command`; act on it and return `true` to claim jurisdiction.
    ///
    /// # Errors
    ///
    /// Any error disables the handler for all future dispatches.
    async fn parse_command(&self, command: &str) -> AppResult<bool>;
}

/// Handler fired by the scheduler when its time arrives.
#[async_trait]
pub trait ScheduledHandler: Send + Sync {
    /// Type name; the default event id when the caller supplies none.
    fn name(&self) -> &str;

    /// Run one firing. Report the next step through `ctx.mailbox()`.
    ///
    /// # Errors
    ///
    /// An error (or panic) disposes the event; it is never retried.
    async fn fire(&self, ctx: FiringContext) -> AppResult<()>;
}

/// When an event should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireAt {
    /// Relative to the moment the request is made.
    After(Duration),
    /// A scheduler instant.
    At(Instant),
    /// A wall-clock time, converted to a scheduler instant on use.
    AtTime(SystemTime),
}

impl FireAt {
    /// Resolve into an absolute scheduler instant relative to `now`.
    pub fn resolve(self, now: Instant) -> Instant {
        match self {
            Self::After(d) => now.checked_add(d).unwrap_or_else(|| clock::far_future(now)),
            Self::At(at) => at,
            Self::AtTime(t) => clock::instant_for(t),
        }
    }
}

/// Lifecycle request posted by a firing handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementMessage {
    /// Put the handler back in the queue.
    Requeue(FireAt),
    /// Remove the handler and its event entirely.
    Dispose,
}

/// Shared flag telling a firing handler whether its event is still wanted.
///
/// Cancellation cannot stop an in-flight firing; long-running handlers check
/// this between steps and bail out once it goes false.
#[derive(Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl fmt::Debug for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Liveness").field(&self.is_live()).finish()
    }
}

impl Liveness {
    /// Whether the event is still registered.
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Whether both flags belong to the same registered event.
    pub fn same_event(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sending half of a handler's management channel, scoped to one firing.
#[derive(Clone)]
pub struct Mailbox {
    tx: Sender<ManagementMessage>,
    posted: Arc<AtomicBool>,
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("posted", &self.has_posted())
            .finish()
    }
}

impl Mailbox {
    pub(crate) fn new(tx: Sender<ManagementMessage>) -> Self {
        Self {
            tx,
            posted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Post the lifecycle request for this firing.
    ///
    /// Only the first post per firing is accepted. Relative requeue times are
    /// resolved now, not when the scheduler reads the message. Returns `false`
    /// if the post was rejected or the event no longer exists.
    pub fn post(&self, message: ManagementMessage) -> bool {
        if self.posted.swap(true, Ordering::AcqRel) {
            warn!(?message, "handler already posted a management message this firing");
            return false;
        }
        let message = match message {
            ManagementMessage::Requeue(at) => {
                ManagementMessage::Requeue(FireAt::At(at.resolve(Instant::now())))
            }
            ManagementMessage::Dispose => ManagementMessage::Dispose,
        };
        self.send(message)
    }

    /// Requeue `after` from now.
    pub fn requeue_after(&self, after: Duration) -> bool {
        self.post(ManagementMessage::Requeue(FireAt::After(after)))
    }

    /// Requeue at a wall-clock time.
    pub fn requeue_at(&self, at: SystemTime) -> bool {
        self.post(ManagementMessage::Requeue(FireAt::AtTime(at)))
    }

    /// Ask to be removed.
    pub fn dispose(&self) -> bool {
        self.post(ManagementMessage::Dispose)
    }

    /// Whether a message was posted during this firing.
    pub fn has_posted(&self) -> bool {
        self.posted.load(Ordering::Acquire)
    }

    /// Dispose regardless of earlier posts. Used after faults.
    pub(crate) fn force_dispose(&self) -> bool {
        self.posted.store(true, Ordering::Release);
        self.send(ManagementMessage::Dispose)
    }

    fn send(&self, message: ManagementMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(?message, "management mailbox full, message dropped");
                false
            }
            // The event was cancelled while firing.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Everything a handler receives for one firing.
pub struct FiringContext {
    id: String,
    payload: Payload,
    scheduled_for: Instant,
    mailbox: Mailbox,
    liveness: Liveness,
}

impl fmt::Debug for FiringContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiringContext")
            .field("id", &self.id)
            .field("scheduled_for", &self.scheduled_for)
            .field("live", &self.liveness.is_live())
            .finish_non_exhaustive()
    }
}

impl FiringContext {
    pub(crate) const fn new(
        id: String,
        payload: Payload,
        scheduled_for: Instant,
        mailbox: Mailbox,
        liveness: Liveness,
    ) -> Self {
        Self {
            id,
            payload,
            scheduled_for,
            mailbox,
            liveness,
        }
    }

    /// Event identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw payload.
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload decoded into a typed structure.
    ///
    /// # Errors
    ///
    /// Fails when the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// The fire time this firing was scheduled for.
    pub const fn scheduled_for(&self) -> Instant {
        self.scheduled_for
    }

    /// Management mailbox for this firing.
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Whether the event is still registered (not cancelled).
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    /// The liveness flag, for handing to helpers.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }
}
