//! Alarm alerts with snooze and daily repeat.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::CONFIRMATION_WORDS;
use crate::core::capability::{HandlerContext, ListenOptions, VoiceInput, VoiceOutput};
use crate::core::error::AppResult;
use crate::core::handler::{
    FireAt, FiringContext, Liveness, ManagementMessage, ScheduledHandler,
};
use crate::util::text::contains_any;

const SNOOZE_WORDS: &[&str] = &["snooze", "please", "more minutes"];

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Alarm description carried in the event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmPayload {
    /// Name read back to the user.
    pub name: String,
    /// Snoozes allowed per ring.
    pub snooze_remaining: u32,
    /// Snooze length in seconds.
    pub snooze_secs: u64,
    /// Ring again at the same time tomorrow.
    pub repeat_daily: bool,
}

impl Default for AlarmPayload {
    fn default() -> Self {
        Self {
            name: "alarm".into(),
            snooze_remaining: 3,
            snooze_secs: 300,
            repeat_daily: false,
        }
    }
}

/// Snooze bookkeeping for one registered alarm event.
#[derive(Debug, Clone)]
struct RingState {
    event: Liveness,
    snoozes_used: u32,
    anchor: Instant,
}

/// Rings an alarm, offers a snooze, and reschedules or disposes.
///
/// Snooze counts are tied to the registered event, not its id, so one
/// instance can serve several alarms and a re-registered id starts fresh.
/// State for events that were cancelled or disposed is pruned on every fire.
pub struct AlarmAlert {
    output: Arc<dyn VoiceOutput>,
    input: Arc<dyn VoiceInput>,
    rings: Mutex<Vec<RingState>>,
}

impl AlarmAlert {
    /// Build from granted collaborators.
    ///
    /// # Errors
    ///
    /// Fails when speech output or input was not granted.
    pub fn new(ctx: &HandlerContext) -> AppResult<Self> {
        Ok(Self {
            output: ctx.voice_output()?,
            input: ctx.voice_input()?,
            rings: Mutex::new(Vec::new()),
        })
    }

    /// State for the firing event, created on its first ring.
    fn ring_state(&self, ctx: &FiringContext) -> (u32, Instant) {
        let event = ctx.liveness();
        let mut rings = self.rings.lock();
        rings.retain(|state| state.event.is_live());
        if let Some(state) = rings.iter().find(|state| state.event.same_event(&event)) {
            return (state.snoozes_used, state.anchor);
        }
        let anchor = ctx.scheduled_for();
        rings.push(RingState {
            event,
            snoozes_used: 0,
            anchor,
        });
        (0, anchor)
    }

    fn update(&self, ctx: &FiringContext, apply: impl FnOnce(&mut RingState)) {
        let event = ctx.liveness();
        if let Some(state) = self
            .rings
            .lock()
            .iter_mut()
            .find(|state| state.event.same_event(&event))
        {
            apply(state);
        }
    }

    fn forget(&self, ctx: &FiringContext) {
        let event = ctx.liveness();
        self.rings
            .lock()
            .retain(|state| !state.event.same_event(&event));
    }

    /// Ask about a snooze. `true` when the user wants one.
    async fn offer_snooze(&self, message: &str) -> bool {
        let prompt = format!("{message} Do you wish to snooze?");
        let answer = self
            .input
            .listen(Some(&prompt), ListenOptions::with_chime())
            .await;
        answer.is_some_and(|a| {
            contains_any(&a, CONFIRMATION_WORDS) || contains_any(&a, SNOOZE_WORDS)
        })
    }
}

#[async_trait]
impl ScheduledHandler for AlarmAlert {
    fn name(&self) -> &str {
        "AlarmAlert"
    }

    async fn fire(&self, ctx: FiringContext) -> AppResult<()> {
        let alarm: AlarmPayload = if ctx.payload().is_null() {
            AlarmPayload::default()
        } else {
            ctx.payload_as()?
        };
        let (snoozes_used, anchor) = self.ring_state(&ctx);
        if !ctx.is_live() {
            self.forget(&ctx);
            return Ok(());
        }

        tracing::info!(id = %ctx.id(), name = %alarm.name, "alarm ringing");
        self.output.chime().await;
        let message = format!("Your alarm, {}, has activated.", alarm.name);
        if snoozes_used < alarm.snooze_remaining {
            let snooze = self.offer_snooze(&message).await;
            // Cancelled while waiting for an answer.
            if !ctx.is_live() {
                self.forget(&ctx);
                return Ok(());
            }
            if snooze {
                let minutes = alarm.snooze_secs / 60;
                self.output
                    .speak(
                        &format!("Snoozing, {}, for {minutes} more minutes.", alarm.name),
                        true,
                    )
                    .await;
                self.update(&ctx, |state| state.snoozes_used += 1);
                ctx.mailbox()
                    .requeue_after(Duration::from_secs(alarm.snooze_secs));
                return Ok(());
            }
            self.output.speak("Alarm finished.", true).await;
        } else {
            self.output.speak(&message, true).await;
        }

        if alarm.repeat_daily {
            let next = anchor + DAY;
            self.update(&ctx, |state| {
                state.snoozes_used = 0;
                state.anchor = next;
            });
            ctx.mailbox()
                .post(ManagementMessage::Requeue(FireAt::At(next)));
        } else {
            self.forget(&ctx);
            ctx.mailbox().dispose();
        }
        Ok(())
    }
}
