//! Countdown timers: the active command handler and the alert it schedules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::CONFIRMATION_WORDS;
use crate::core::capability::{HandlerContext, ListenOptions, VoiceInput, VoiceOutput};
use crate::core::error::AppResult;
use crate::core::handler::{ActiveHandler, FireAt, FiringContext, ScheduledHandler};
use crate::core::scheduler::{ScheduleRequest, SchedulerHandle};
use crate::util::text::{contains_any, parse_duration};

/// Timers longer than this need a spoken confirmation.
pub const CONFIRMATION_THRESHOLD: Duration = Duration::from_secs(7200);

const LIST_PHRASES: &[&str] = &[
    "list timers",
    "list all timers",
    "all timers",
    "delete timers",
    "clear timers",
    "clear all timers",
    "delete all timers",
];

/// What a timer alert is told about its timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPayload {
    /// Spoken amount ("five").
    pub duration: u64,
    /// Length in seconds.
    pub seconds: u64,
    /// Spoken units ("minutes").
    pub units: String,
}

/// Active handler for "timer for five minutes" and "list timers".
pub struct TimerCommands {
    output: Arc<dyn VoiceOutput>,
    input: Arc<dyn VoiceInput>,
    scheduler: SchedulerHandle,
    alert: Arc<TimerAlert>,
    timer_ids: Mutex<Vec<String>>,
}

impl TimerCommands {
    /// Build from granted collaborators.
    ///
    /// # Errors
    ///
    /// Fails when speech output, speech input or the scheduler was not granted.
    pub fn new(ctx: &HandlerContext) -> AppResult<Self> {
        let output = ctx.voice_output()?;
        Ok(Self {
            alert: Arc::new(TimerAlert::new(Arc::clone(&output))),
            output,
            input: ctx.voice_input()?,
            scheduler: ctx.scheduler()?,
            timer_ids: Mutex::new(Vec::new()),
        })
    }

    async fn list_timers(&self) -> AppResult<()> {
        let ids = self.timer_ids.lock().clone();
        let mut live = Vec::new();
        let mut report = String::new();
        for id in ids {
            let Some(event) = self.scheduler.lookup_by_id(&id).await? else {
                continue;
            };
            if let Ok(timer) = serde_json::from_value::<TimerPayload>(event.payload.clone()) {
                report.push_str(&format!(
                    "The {} {} timer has {} seconds remaining, ",
                    timer.duration,
                    timer.units,
                    event.remaining().as_secs()
                ));
            }
            live.push(id);
        }
        // Fired and cancelled timers drop out of the list here.
        self.timer_ids.lock().retain(|id| live.contains(id));

        if live.is_empty() {
            self.output
                .speak("There are currently no active timers.", true)
                .await;
            return Ok(());
        }
        let prefix = if live.len() == 1 {
            "There is a single active timer. ".to_string()
        } else {
            format!("There are {} active timers. ", live.len())
        };
        let prompt = format!("{prefix}{report}. Would you like to clear all timers?");
        let answer = self
            .input
            .listen(Some(&prompt), ListenOptions::with_chime())
            .await;
        if answer.is_some_and(|a| contains_any(&a, CONFIRMATION_WORDS)) {
            for id in &live {
                self.scheduler.cancel_by_id(id).await?;
            }
            self.timer_ids.lock().clear();
            self.output
                .speak("All timers have now been deleted.", true)
                .await;
        }
        Ok(())
    }

    async fn set_timer(&self, command: &str) -> AppResult<()> {
        let Some(duration) = parse_duration(command) else {
            self.output
                .speak("Sorry, I didn't catch how long the timer should be.", true)
                .await;
            return Ok(());
        };
        if Duration::from_secs(duration.seconds) > CONFIRMATION_THRESHOLD {
            let prompt = format!(
                "Confirm set timer for {} {}?",
                duration.amount, duration.units
            );
            let answer = self
                .input
                .listen(Some(&prompt), ListenOptions::with_chime())
                .await;
            if !answer.is_some_and(|a| contains_any(&a, CONFIRMATION_WORDS)) {
                return Ok(());
            }
        }

        let payload = TimerPayload {
            duration: duration.amount,
            seconds: duration.seconds,
            units: duration.units.to_string(),
        };
        let id = format!("timer-{}", uuid::Uuid::new_v4());
        tracing::debug!(%id, seconds = duration.seconds, "setting timer");
        let request = ScheduleRequest::new(
            Arc::clone(&self.alert) as Arc<dyn ScheduledHandler>,
            FireAt::After(Duration::from_secs(duration.seconds)),
        )
        .with_payload(serde_json::to_value(&payload)?)
        .with_id(id);
        let id = self.scheduler.create_scheduled(request).await?;
        self.timer_ids.lock().push(id);
        self.output
            .speak(
                &format!("Timer set for {} {}.", duration.amount, duration.units),
                true,
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl ActiveHandler for TimerCommands {
    async fn parse_command(&self, command: &str) -> AppResult<bool> {
        if contains_any(command, LIST_PHRASES) {
            self.list_timers().await?;
            Ok(true)
        } else if command.contains("timer") {
            self.set_timer(command).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Announces a finished timer, then lets the event dispose.
pub struct TimerAlert {
    output: Arc<dyn VoiceOutput>,
}

impl TimerAlert {
    /// Alert speaking through `output`.
    pub fn new(output: Arc<dyn VoiceOutput>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl ScheduledHandler for TimerAlert {
    fn name(&self) -> &str {
        "TimerAlert"
    }

    async fn fire(&self, ctx: FiringContext) -> AppResult<()> {
        if !ctx.is_live() {
            return Ok(());
        }
        let message = match ctx.payload_as::<TimerPayload>() {
            Ok(t) => format!("Timer for {} {} has finished.", t.duration, t.units),
            Err(_) => "Timer finished.".to_string(),
        };
        self.output.chime().await;
        self.output.speak(&message, true).await;
        Ok(())
    }
}
