//! Recurring server-status refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::capability::ServerStatus;
use crate::core::error::AppResult;
use crate::core::handler::{FiringContext, ScheduledHandler};

/// Poll settings carried in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusPollPayload {
    /// Seconds between refreshes.
    pub interval_secs: u64,
}

impl Default for StatusPollPayload {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Triggers a status refresh and requeues itself forever.
pub struct StatusPoll {
    status: Arc<dyn ServerStatus>,
}

impl StatusPoll {
    /// Poll over `status`.
    pub fn new(status: Arc<dyn ServerStatus>) -> Self {
        Self { status }
    }
}

#[async_trait]
impl ScheduledHandler for StatusPoll {
    fn name(&self) -> &str {
        "StatusPoll"
    }

    async fn fire(&self, ctx: FiringContext) -> AppResult<()> {
        let poll: StatusPollPayload = if ctx.payload().is_null() {
            StatusPollPayload::default()
        } else {
            ctx.payload_as()?
        };
        self.status.request_refresh();
        let snapshot = self.status.snapshot();
        tracing::debug!(
            online = snapshot.online,
            server = snapshot.server_reachable,
            "status refresh requested"
        );
        ctx.mailbox()
            .requeue_after(Duration::from_secs(poll.interval_secs.max(1)));
        Ok(())
    }
}
