//! Exclusive resource gate for the single voice input device.
//!
//! Every caller takes a ticket from a strictly increasing counter and waits
//! until its ticket reaches the head of the queue. Tickets are issued under the
//! same lock that enqueues them, so arrival order and ticket order agree.
//!
//! The returned [`GateGuard`] releases on drop. Holding a guard forever
//! starves every other caller; the gate imposes no timeout and is not
//! re-entrant, so a task must never acquire twice for one logical operation.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

/// FIFO ordering key for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExclusiveTicket(u64);

impl ExclusiveTicket {
    /// The raw ticket number.
    pub const fn value(self) -> u64 {
        self.0
    }
}

struct GateState {
    next_ticket: u64,
    queue: VecDeque<u64>,
}

/// FIFO serialization gate.
pub struct ExclusiveResourceGate {
    state: Mutex<GateState>,
    /// Signalled whenever the head of the queue changes.
    advanced: Notify,
    /// Signalled whenever the queue drains completely.
    drained: Notify,
}

impl Default for ExclusiveResourceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusiveResourceGate {
    /// Create an idle gate.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                next_ticket: 0,
                queue: VecDeque::new(),
            }),
            advanced: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn enqueue(&self) -> u64 {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        ticket
    }

    fn is_head(&self, ticket: u64) -> bool {
        self.state.lock().queue.front() == Some(&ticket)
    }

    /// Wait for exclusive access.
    ///
    /// Cancelling the returned future (dropping it while it waits) gives the
    /// ticket back, so an abandoned wait never blocks later callers.
    pub async fn acquire(&self) -> GateGuard<'_> {
        let ticket = self.enqueue();
        let guard = GateGuard { gate: self, ticket };
        loop {
            let advanced = self.advanced.notified();
            tokio::pin!(advanced);
            advanced.as_mut().enable();
            if self.is_head(ticket) {
                break;
            }
            debug!(ticket, "voice input busy, waiting for gate");
            advanced.await;
        }
        debug!(ticket, "voice input gate acquired");
        guard
    }

    /// Take the gate only if nobody holds or waits for it.
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        let mut state = self.state.lock();
        if !state.queue.is_empty() {
            return None;
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        drop(state);
        Some(GateGuard { gate: self, ticket })
    }

    /// Whether anyone holds or waits for the gate.
    pub fn is_busy(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Number of holders plus waiters.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Resolve once the gate has no holder and no waiter.
    pub async fn wait_idle(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            drained.await;
        }
    }

    fn leave(&self, ticket: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.queue.iter().position(|t| *t == ticket) {
            state.queue.remove(pos);
        }
        let empty = state.queue.is_empty();
        drop(state);
        debug!(ticket, "voice input gate released");
        self.advanced.notify_waiters();
        if empty {
            self.drained.notify_waiters();
        }
    }
}

/// Exclusive access to the voice input device. Released on drop.
#[must_use = "dropping the guard releases the gate immediately"]
pub struct GateGuard<'a> {
    gate: &'a ExclusiveResourceGate,
    ticket: u64,
}

impl GateGuard<'_> {
    /// The ticket this guard was issued.
    pub const fn ticket(&self) -> ExclusiveTicket {
        ExclusiveTicket(self.ticket)
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave(self.ticket);
    }
}
