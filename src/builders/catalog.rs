//! Static catalog mapping manifest names to handler factories.
//!
//! Every entry is annotated with the exact capability set its handler needs.
//! A manifest entry must declare that same set; anything else is a mismatch
//! and the entry is rejected before its factory runs.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::capability::{Capability, CapabilitySet, Collaborators, HandlerContext};
use crate::core::error::{panic_message, AppResult, AssistantError, Result};
use crate::core::handler::{ActiveHandler, ScheduledHandler};
use crate::handlers::{AlarmAlert, StatusPoll, TimerAlert, TimerCommands};

/// Builds an active handler from its granted collaborators.
pub type ActiveFactory =
    Arc<dyn Fn(HandlerContext) -> AppResult<Arc<dyn ActiveHandler>> + Send + Sync>;

/// Builds a scheduled handler from its granted collaborators.
pub type ScheduledFactory =
    Arc<dyn Fn(HandlerContext) -> AppResult<Arc<dyn ScheduledHandler>> + Send + Sync>;

/// A factory plus the capability set its handler requires.
#[derive(Clone)]
pub struct CatalogEntry<F> {
    capabilities: CapabilitySet,
    factory: F,
}

impl<F> CatalogEntry<F> {
    /// Capabilities the handler requires.
    pub const fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Check a manifest declaration against this entry and grant the context.
    ///
    /// Gated handlers also need the status collaborator to be supplied even
    /// though it is not granted to them.
    pub(crate) fn grant(
        &self,
        name: &str,
        declared: CapabilitySet,
        gated: bool,
        collaborators: &Collaborators,
    ) -> Result<HandlerContext> {
        if declared != self.capabilities {
            return Err(AssistantError::CapabilityMismatch {
                handler: name.to_string(),
                reason: format!(
                    "manifest declares {declared:?}, handler requires {:?}",
                    self.capabilities
                ),
            });
        }
        if gated && !collaborators.supplied().contains(Capability::ServerStatus) {
            return Err(AssistantError::CapabilityMismatch {
                handler: name.to_string(),
                reason: "connectivity gating needs the server status collaborator".into(),
            });
        }
        collaborators.grant(name, declared)
    }
}

impl<H: ?Sized> CatalogEntry<Arc<dyn Fn(HandlerContext) -> AppResult<Arc<H>> + Send + Sync>> {
    /// Run the factory, mapping errors and panics to construction failures.
    pub(crate) fn build(&self, name: &str, ctx: HandlerContext) -> Result<Arc<H>> {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.factory)(ctx)));
        let reason = match outcome {
            Ok(Ok(handler)) => return Ok(handler),
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("panic: {}", panic_message(panic.as_ref())),
        };
        Err(AssistantError::HandlerConstruction {
            handler: name.to_string(),
            reason,
        })
    }
}

/// Name-to-factory registry for active and scheduled handlers.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    active: HashMap<String, CatalogEntry<ActiveFactory>>,
    scheduled: HashMap<String, CatalogEntry<ScheduledFactory>>,
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut active: Vec<_> = self.active.keys().collect();
        let mut scheduled: Vec<_> = self.scheduled.keys().collect();
        active.sort();
        scheduled.sort();
        f.debug_struct("HandlerCatalog")
            .field("active", &active)
            .field("scheduled", &scheduled)
            .finish()
    }
}

impl HandlerCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the built-in handlers.
    pub fn builtin() -> Self {
        let voice_out = CapabilitySet::EMPTY.with(Capability::VoiceOutput);
        Self::new()
            .with_active(
                "timer",
                voice_out
                    .with(Capability::VoiceInput)
                    .with(Capability::Scheduler),
                |ctx| Ok(Arc::new(TimerCommands::new(&ctx)?)),
            )
            .with_scheduled("timer_alert", voice_out, |ctx| {
                Ok(Arc::new(TimerAlert::new(ctx.voice_output()?)))
            })
            .with_scheduled(
                "alarm_alert",
                voice_out.with(Capability::VoiceInput),
                |ctx| Ok(Arc::new(AlarmAlert::new(&ctx)?)),
            )
            .with_scheduled(
                "status_poll",
                CapabilitySet::EMPTY.with(Capability::ServerStatus),
                |ctx| Ok(Arc::new(StatusPoll::new(ctx.server_status()?))),
            )
    }

    /// Register an active handler factory.
    #[must_use]
    pub fn with_active<F>(
        mut self,
        name: impl Into<String>,
        capabilities: CapabilitySet,
        factory: F,
    ) -> Self
    where
        F: Fn(HandlerContext) -> AppResult<Arc<dyn ActiveHandler>> + Send + Sync + 'static,
    {
        self.active.insert(
            name.into(),
            CatalogEntry {
                capabilities,
                factory: Arc::new(factory),
            },
        );
        self
    }

    /// Register a scheduled handler factory.
    #[must_use]
    pub fn with_scheduled<F>(
        mut self,
        name: impl Into<String>,
        capabilities: CapabilitySet,
        factory: F,
    ) -> Self
    where
        F: Fn(HandlerContext) -> AppResult<Arc<dyn ScheduledHandler>> + Send + Sync + 'static,
    {
        self.scheduled.insert(
            name.into(),
            CatalogEntry {
                capabilities,
                factory: Arc::new(factory),
            },
        );
        self
    }

    /// Active entry for `name`.
    ///
    /// # Errors
    ///
    /// [`AssistantError::UnknownHandler`] when absent.
    pub fn active(&self, name: &str) -> Result<&CatalogEntry<ActiveFactory>> {
        self.active
            .get(name)
            .ok_or_else(|| AssistantError::UnknownHandler(name.to_string()))
    }

    /// Scheduled entry for `name`.
    ///
    /// # Errors
    ///
    /// [`AssistantError::UnknownHandler`] when absent.
    pub fn scheduled(&self, name: &str) -> Result<&CatalogEntry<ScheduledFactory>> {
        self.scheduled
            .get(name)
            .ok_or_else(|| AssistantError::UnknownHandler(name.to_string()))
    }
}
