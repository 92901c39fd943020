//! The scheduler control loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use super::table::{Applied, EventEntry, EventTable};
use super::{ScheduledEventInfo, Spawn};
use crate::config::SchedulerSettings;
use crate::core::audit::{build_audit_event, AuditSink, LifecycleAction};
use crate::core::error::panic_message;
use crate::core::handler::{Payload, ScheduledHandler};

type SharedAudit = Option<Arc<Mutex<Box<dyn AuditSink>>>>;

pub(crate) enum Command {
    Create {
        id: String,
        handler: Arc<dyn ScheduledHandler>,
        payload: Payload,
        fire_at: Instant,
        reply: oneshot::Sender<String>,
    },
    Cancel {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Lookup {
        id: String,
        reply: oneshot::Sender<Option<ScheduledEventInfo>>,
    },
    Pending {
        reply: oneshot::Sender<Vec<ScheduledEventInfo>>,
    },
    LiveCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

pub(crate) struct ControlLoop<S> {
    table: EventTable,
    spawner: S,
    audit: SharedAudit,
    rx: mpsc::UnboundedReceiver<Command>,
    tick: Duration,
    mailbox_capacity: usize,
}

impl<S> ControlLoop<S>
where
    S: Spawn + Send + 'static,
{
    pub(crate) fn new(
        settings: &SchedulerSettings,
        spawner: S,
        audit: Option<Box<dyn AuditSink>>,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            table: EventTable::default(),
            spawner,
            audit: audit.map(|sink| Arc::new(Mutex::new(sink))),
            rx,
            tick: settings.tick_interval(),
            mailbox_capacity: settings.mailbox_capacity,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                _ = ticker.tick() => self.tick(Instant::now()),
            }
        }
        let dropped = self.table.clear();
        tracing::info!(dropped, "event scheduler stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Create {
                id,
                handler,
                payload,
                fire_at,
                reply,
            } => {
                let entry =
                    EventEntry::new(id.clone(), handler, payload, fire_at, self.mailbox_capacity);
                let name = entry.handler_name();
                let key = self.table.insert(entry);
                tracing::debug!(%id, handler = %name, "event registered");
                self.record(key, &id, &name, LifecycleAction::Registered, None);
                let _ = reply.send(id);
            }
            Command::Cancel { id, reply } => {
                let cancelled = match self.table.cancel_first(&id) {
                    Some((key, entry)) => {
                        let name = entry.handler_name();
                        tracing::debug!(%id, in_flight = entry.is_firing(), "event cancelled");
                        self.record(key, &id, &name, LifecycleAction::Cancelled, None);
                        true
                    }
                    None => false,
                };
                let _ = reply.send(cancelled);
            }
            Command::Lookup { id, reply } => {
                let _ = reply.send(self.table.lookup(&id));
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.table.pending());
            }
            Command::LiveCount { reply } => {
                let _ = reply.send(self.table.len());
            }
            Command::Shutdown => {}
        }
    }

    fn tick(&mut self, now: Instant) {
        self.process_mailboxes();
        self.fire_due(now);
    }

    fn process_mailboxes(&mut self) {
        for (key, message) in self.table.drain_mailboxes() {
            let Some((id, name)) = self
                .table
                .get(key)
                .map(|entry| (entry.id.clone(), entry.handler_name()))
            else {
                // Disposed earlier in this drain.
                continue;
            };
            match self.table.apply(key, message) {
                Some(Applied::Requeued(at)) => {
                    tracing::debug!(%id, "event requeued");
                    let wait = at.saturating_duration_since(Instant::now());
                    let detail = format!("in {}ms", wait.as_millis());
                    self.record(key, &id, &name, LifecycleAction::Requeued, Some(detail));
                }
                Some(Applied::Disposed) => {
                    tracing::debug!(%id, "event disposed");
                    self.record(key, &id, &name, LifecycleAction::Disposed, None);
                }
                None => {}
            }
        }
    }

    fn fire_due(&mut self, now: Instant) {
        for key in self.table.due(now) {
            let Some((handler, ctx, in_flight)) = self.table.begin_firing(key) else {
                continue;
            };
            let id = ctx.id().to_string();
            let name = handler.name().to_string();
            tracing::debug!(%id, handler = %name, "firing event");
            self.record(key, &id, &name, LifecycleAction::Fired, None);

            let audit = self.audit.clone();
            self.spawner.spawn(async move {
                let mailbox = ctx.mailbox().clone();
                let outcome = AssertUnwindSafe(handler.fire(ctx)).catch_unwind().await;
                let fault = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("{e:#}")),
                    Err(panic) => Some(format!("panic: {}", panic_message(panic.as_ref()))),
                };
                if let Some(reason) = fault {
                    tracing::error!(%id, handler = %name, "scheduled handler faulted: {reason}");
                    record_shared(&audit, key, &id, &name, LifecycleAction::Faulted, Some(reason));
                    mailbox.force_dispose();
                } else if !mailbox.has_posted() {
                    mailbox.dispose();
                }
                drop(in_flight);
            });
        }
    }

    fn record(
        &self,
        key: u64,
        id: &str,
        handler: &str,
        action: LifecycleAction,
        detail: Option<String>,
    ) {
        record_shared(&self.audit, key, id, handler, action, detail);
    }
}

fn record_shared(
    audit: &SharedAudit,
    key: u64,
    id: &str,
    handler: &str,
    action: LifecycleAction,
    detail: Option<String>,
) {
    if let Some(sink) = audit.as_ref() {
        sink.lock()
            .record(build_audit_event(key, id, handler, action, detail));
    }
}
