//! Tick-driven event scheduler.
//!
//! A single control loop owns the [`table::EventTable`]. Every tick it first
//! drains management mailboxes (applying `Requeue`/`Dispose`) and then fires
//! each due event on the [`Spawn`]er without waiting for it. Callers talk to
//! the loop through a cloneable [`SchedulerHandle`]; all table mutation
//! happens on the loop task.

mod control;
pub(crate) mod table;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SchedulerSettings;
use crate::core::audit::AuditSink;
use crate::core::error::{AssistantError, Result};
use crate::core::handler::{FireAt, Payload, ScheduledHandler};

use control::{Command, ControlLoop};

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Request to register a scheduled event.
pub struct ScheduleRequest {
    handler: Arc<dyn ScheduledHandler>,
    fire_at: FireAt,
    payload: Payload,
    id: Option<String>,
}

impl ScheduleRequest {
    /// Fire `handler` at `fire_at` with an empty payload.
    pub fn new(handler: Arc<dyn ScheduledHandler>, fire_at: FireAt) -> Self {
        Self {
            handler,
            fire_at,
            payload: Payload::Null,
            id: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Use `id` instead of the handler's type name.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A queued event as reported by lookups.
#[derive(Clone)]
pub struct ScheduledEventInfo {
    /// Event identifier.
    pub id: String,
    /// When the event will fire.
    pub fire_at: Instant,
    /// The handler that will run.
    pub handler: Arc<dyn ScheduledHandler>,
    /// Payload it will receive.
    pub payload: Payload,
}

impl fmt::Debug for ScheduledEventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEventInfo")
            .field("id", &self.id)
            .field("fire_at", &self.fire_at)
            .field("handler", &self.handler.name())
            .field("payload", &self.payload)
            .finish()
    }
}

impl ScheduledEventInfo {
    /// Time left until the event fires; zero when already due.
    pub fn remaining(&self) -> std::time::Duration {
        self.fire_at.saturating_duration_since(Instant::now())
    }
}

/// Cloneable client of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SchedulerHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| AssistantError::SchedulerClosed)?;
        rx.await.map_err(|_| AssistantError::SchedulerClosed)
    }

    /// Register an event and return its id.
    ///
    /// Relative fire times are resolved against the moment of this call.
    ///
    /// # Errors
    ///
    /// [`AssistantError::InvalidSchedule`] for an empty id,
    /// [`AssistantError::SchedulerClosed`] after shutdown.
    pub async fn create_scheduled(&self, request: ScheduleRequest) -> Result<String> {
        let id = request
            .id
            .unwrap_or_else(|| request.handler.name().to_string());
        if id.trim().is_empty() {
            return Err(AssistantError::InvalidSchedule(
                "event id must not be empty".into(),
            ));
        }
        let fire_at = request.fire_at.resolve(Instant::now());
        self.call(|reply| Command::Create {
            id,
            handler: request.handler,
            payload: request.payload,
            fire_at,
            reply,
        })
        .await
    }

    /// Remove the first event registered under `id`, queued or firing.
    ///
    /// Returns `false` when nothing matched. A handler that is mid-firing is
    /// not interrupted; it sees its liveness flag cleared.
    ///
    /// # Errors
    ///
    /// [`AssistantError::SchedulerClosed`] after shutdown.
    pub async fn cancel_by_id(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.call(|reply| Command::Cancel { id, reply }).await
    }

    /// First queued event registered under `id`.
    ///
    /// # Errors
    ///
    /// [`AssistantError::SchedulerClosed`] after shutdown.
    pub async fn lookup_by_id(&self, id: &str) -> Result<Option<ScheduledEventInfo>> {
        let id = id.to_string();
        self.call(|reply| Command::Lookup { id, reply }).await
    }

    /// All queued events, in registration order.
    ///
    /// # Errors
    ///
    /// [`AssistantError::SchedulerClosed`] after shutdown.
    pub async fn pending(&self) -> Result<Vec<ScheduledEventInfo>> {
        self.call(|reply| Command::Pending { reply }).await
    }

    /// Number of events in the table, queued or firing.
    ///
    /// # Errors
    ///
    /// [`AssistantError::SchedulerClosed`] after shutdown.
    pub async fn live_count(&self) -> Result<usize> {
        self.call(|reply| Command::LiveCount { reply }).await
    }

    /// Whether the control loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner of the scheduler control loop.
pub struct EventScheduler {
    handle: SchedulerHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl EventScheduler {
    /// Start the control loop on the current tokio runtime.
    ///
    /// Firing tasks go to `spawner`. Must be called from within a runtime.
    pub fn start<S>(
        settings: &SchedulerSettings,
        spawner: S,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Self
    where
        S: Spawn + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = ControlLoop::new(settings, spawner, audit, rx);
        let join = tokio::spawn(control.run());
        tracing::info!(
            tick_ms = settings.tick_interval_ms,
            "event scheduler started"
        );
        Self {
            handle: SchedulerHandle { tx },
            join: Mutex::new(Some(join)),
        }
    }

    /// A client handle; clone freely.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for it to exit. Queued events are dropped and
    /// in-flight firings see their liveness flag cleared. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        let join = self.join.lock().take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                tracing::error!("scheduler loop ended abnormally: {e}");
            }
        }
    }
}
