//! Capabilities, collaborator interfaces, and the per-handler grant.
//!
//! A handler declares the collaborators it needs. The registry hands it a
//! [`HandlerContext`] holding exactly those collaborators and nothing else, so
//! a handler can never reach a capability it did not declare.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{AssistantError, Result};
use super::scheduler::SchedulerHandle;

/// A collaborator a handler may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Text-to-speech output.
    VoiceOutput,
    /// Speech input (gated through the exclusive resource gate).
    VoiceInput,
    /// Home-automation server status snapshot.
    ServerStatus,
    /// Handle to the event scheduler.
    Scheduler,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::VoiceOutput,
        Self::VoiceInput,
        Self::ServerStatus,
        Self::Scheduler,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::VoiceOutput => 1,
            Self::VoiceInput => 1 << 1,
            Self::ServerStatus => 1 << 2,
            Self::Scheduler => 1 << 3,
        }
    }
}

/// A compact set of [`Capability`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Return a copy of the set with `cap` added.
    #[must_use]
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    /// Add `cap` when `flag` is set. Convenient for manifest flags.
    #[must_use]
    pub const fn with_if(self, cap: Capability, flag: bool) -> Self {
        if flag {
            self.with(cap)
        } else {
            self
        }
    }

    /// Whether `cap` is in the set.
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Members of `self` missing from `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Options for a single listen interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    /// Play a chime before listening.
    pub chime: bool,
    /// How many recognition attempts before giving up.
    pub max_attempts: u32,
    /// How long to wait for speech to start. `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Pause after the gate is acquired and before listening.
    pub start_delay: Option<Duration>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            chime: false,
            max_attempts: 1,
            response_timeout: Some(Duration::from_secs(5)),
            start_delay: None,
        }
    }
}

impl ListenOptions {
    /// Default options with the chime enabled.
    #[must_use]
    pub fn with_chime() -> Self {
        Self {
            chime: true,
            ..Self::default()
        }
    }

    /// Options for the idle listener: no chime, no timeout.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            response_timeout: None,
            ..Self::default()
        }
    }
}

/// Speech output collaborator.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Speak `text`. When `blocking` is set, return only once it was spoken.
    async fn speak(&self, text: &str, blocking: bool);

    /// Play the short listening chime.
    async fn chime(&self) {}
}

/// Speech input collaborator.
///
/// Implementations must serialize through the exclusive resource gate; see
/// `infra::GatedVoiceInput`.
#[async_trait]
pub trait VoiceInput: Send + Sync {
    /// Optionally speak `prompt`, then listen. `None` on timeout or no match.
    async fn listen(&self, prompt: Option<&str>, opts: ListenOptions) -> Option<String>;
}

/// Connectivity snapshot reported by the server-status collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Wide internet reachable.
    pub online: bool,
    /// Home-automation server reachable.
    pub server_reachable: bool,
}

/// Home-automation server status collaborator. Never blocks the caller.
pub trait ServerStatus: Send + Sync {
    /// Latest known status.
    fn snapshot(&self) -> StatusSnapshot;
    /// Ask for an asynchronous refresh.
    fn request_refresh(&self);
}

/// Every collaborator the process has available.
#[derive(Clone, Default)]
pub struct Collaborators {
    voice_output: Option<Arc<dyn VoiceOutput>>,
    voice_input: Option<Arc<dyn VoiceInput>>,
    server_status: Option<Arc<dyn ServerStatus>>,
    scheduler: Option<SchedulerHandle>,
}

impl Collaborators {
    /// No collaborators at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach speech output.
    #[must_use]
    pub fn with_voice_output(mut self, output: Arc<dyn VoiceOutput>) -> Self {
        self.voice_output = Some(output);
        self
    }

    /// Attach speech input.
    #[must_use]
    pub fn with_voice_input(mut self, input: Arc<dyn VoiceInput>) -> Self {
        self.voice_input = Some(input);
        self
    }

    /// Attach the server-status collaborator.
    #[must_use]
    pub fn with_server_status(mut self, status: Arc<dyn ServerStatus>) -> Self {
        self.server_status = Some(status);
        self
    }

    /// Attach the scheduler handle.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Capabilities that can currently be granted.
    pub fn supplied(&self) -> CapabilitySet {
        CapabilitySet::EMPTY
            .with_if(Capability::VoiceOutput, self.voice_output.is_some())
            .with_if(Capability::VoiceInput, self.voice_input.is_some())
            .with_if(Capability::ServerStatus, self.server_status.is_some())
            .with_if(Capability::Scheduler, self.scheduler.is_some())
    }

    /// Speech output, if supplied.
    pub fn voice_output(&self) -> Option<&Arc<dyn VoiceOutput>> {
        self.voice_output.as_ref()
    }

    /// Speech input, if supplied.
    pub fn voice_input(&self) -> Option<&Arc<dyn VoiceInput>> {
        self.voice_input.as_ref()
    }

    /// Server status, if supplied.
    pub fn server_status(&self) -> Option<&Arc<dyn ServerStatus>> {
        self.server_status.as_ref()
    }

    /// Scheduler handle, if supplied.
    pub fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }

    /// Build the context for a handler requiring exactly `required`.
    ///
    /// Fails closed: if any required collaborator is missing nothing is granted.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::CapabilityMismatch`] naming the missing
    /// capabilities.
    pub fn grant(&self, handler: &str, required: CapabilitySet) -> Result<HandlerContext> {
        let missing = required.difference(self.supplied());
        if !missing.is_empty() {
            return Err(AssistantError::CapabilityMismatch {
                handler: handler.to_string(),
                reason: format!("collaborators not supplied: {missing:?}"),
            });
        }
        let pick = |cap: Capability| required.contains(cap);
        Ok(HandlerContext {
            granted: required,
            voice_output: self
                .voice_output
                .clone()
                .filter(|_| pick(Capability::VoiceOutput)),
            voice_input: self
                .voice_input
                .clone()
                .filter(|_| pick(Capability::VoiceInput)),
            server_status: self
                .server_status
                .clone()
                .filter(|_| pick(Capability::ServerStatus)),
            scheduler: self
                .scheduler
                .clone()
                .filter(|_| pick(Capability::Scheduler)),
        })
    }
}

/// The collaborators granted to one handler instance.
#[derive(Clone, Default)]
pub struct HandlerContext {
    granted: CapabilitySet,
    voice_output: Option<Arc<dyn VoiceOutput>>,
    voice_input: Option<Arc<dyn VoiceInput>>,
    server_status: Option<Arc<dyn ServerStatus>>,
    scheduler: Option<SchedulerHandle>,
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("granted", &self.granted)
            .finish_non_exhaustive()
    }
}

impl HandlerContext {
    /// The capability set this context was built for.
    pub const fn granted(&self) -> CapabilitySet {
        self.granted
    }

    /// Speech output.
    ///
    /// # Errors
    ///
    /// [`AssistantError::CapabilityNotGranted`] if it was not declared.
    pub fn voice_output(&self) -> Result<Arc<dyn VoiceOutput>> {
        self.voice_output
            .clone()
            .ok_or(AssistantError::CapabilityNotGranted(Capability::VoiceOutput))
    }

    /// Speech input.
    ///
    /// # Errors
    ///
    /// [`AssistantError::CapabilityNotGranted`] if it was not declared.
    pub fn voice_input(&self) -> Result<Arc<dyn VoiceInput>> {
        self.voice_input
            .clone()
            .ok_or(AssistantError::CapabilityNotGranted(Capability::VoiceInput))
    }

    /// Server status.
    ///
    /// # Errors
    ///
    /// [`AssistantError::CapabilityNotGranted`] if it was not declared.
    pub fn server_status(&self) -> Result<Arc<dyn ServerStatus>> {
        self.server_status
            .clone()
            .ok_or(AssistantError::CapabilityNotGranted(Capability::ServerStatus))
    }

    /// Scheduler handle.
    ///
    /// # Errors
    ///
    /// [`AssistantError::CapabilityNotGranted`] if it was not declared.
    pub fn scheduler(&self) -> Result<SchedulerHandle> {
        self.scheduler
            .clone()
            .ok_or(AssistantError::CapabilityNotGranted(Capability::Scheduler))
    }
}
