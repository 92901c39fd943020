//! Process wiring: collaborators, registry, router and scheduler in one place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::tokio_spawner::TokioSpawner;
use crate::builders::{ActiveModule, HandlerCatalog, ModuleRegistry, PassiveModule};
use crate::config::AssistantConfig;
use crate::core::audit::AuditSink;
use crate::core::capability::{Collaborators, ListenOptions, ServerStatus, VoiceInput, VoiceOutput};
use crate::core::error::{AssistantError, Result};
use crate::core::gate::ExclusiveResourceGate;
use crate::core::router::{CommandRouter, RouterSettings};
use crate::core::scheduler::{EventScheduler, SchedulerHandle};
use crate::infra::{GatedVoiceInput, Recognizer};
use crate::util::text::contains_any;

/// How long the idle loop holds the microphone before giving other waiters
/// a turn.
const IDLE_LISTEN_WINDOW: Duration = Duration::from_secs(1);

enum ManifestSource {
    Path(PathBuf),
    Inline(String),
    Empty,
}

/// Builder for [`Assistant`].
pub struct AssistantBuilder {
    config: AssistantConfig,
    catalog: HandlerCatalog,
    output: Arc<dyn VoiceOutput>,
    recognizer: Arc<dyn Recognizer>,
    status: Option<Arc<dyn ServerStatus>>,
    audit: Option<Box<dyn AuditSink>>,
    active: Option<ManifestSource>,
    passive: Option<ManifestSource>,
}

impl AssistantBuilder {
    /// Builder using the built-in catalog and the manifest paths in `config`.
    pub fn new(
        config: AssistantConfig,
        output: Arc<dyn VoiceOutput>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            config,
            catalog: HandlerCatalog::builtin(),
            output,
            recognizer,
            status: None,
            audit: None,
            active: None,
            passive: None,
        }
    }

    /// Replace the handler catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Supply the server-status collaborator.
    #[must_use]
    pub fn server_status(mut self, status: Arc<dyn ServerStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Record scheduler lifecycle events.
    #[must_use]
    pub fn audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Use an inline active manifest instead of the configured path.
    #[must_use]
    pub fn active_manifest_json(mut self, raw: impl Into<String>) -> Self {
        self.active = Some(ManifestSource::Inline(raw.into()));
        self
    }

    /// Use an inline passive manifest instead of the configured path.
    #[must_use]
    pub fn passive_manifest_json(mut self, raw: impl Into<String>) -> Self {
        self.passive = Some(ManifestSource::Inline(raw.into()));
        self
    }

    /// Start with no passive handlers.
    #[must_use]
    pub fn without_passive_manifest(mut self) -> Self {
        self.passive = Some(ManifestSource::Empty);
        self
    }

    /// Start the scheduler, load both manifests and schedule passive handlers.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Invalid configuration, unreadable manifests, or a scheduler that
    /// stopped during startup.
    pub async fn build(self) -> Result<Assistant> {
        self.config.validate().map_err(AssistantError::Config)?;

        let gate = Arc::new(ExclusiveResourceGate::new());
        let input: Arc<dyn VoiceInput> = Arc::new(GatedVoiceInput::new(
            Arc::clone(&gate),
            Arc::clone(&self.output),
            Arc::clone(&self.recognizer),
        ));
        let scheduler =
            EventScheduler::start(&self.config.scheduler, TokioSpawner::current(), self.audit);
        let handle = scheduler.handle();

        let mut collaborators = Collaborators::new()
            .with_voice_output(Arc::clone(&self.output))
            .with_voice_input(Arc::clone(&input))
            .with_scheduler(handle.clone());
        if let Some(status) = self.status.as_ref() {
            collaborators = collaborators.with_server_status(Arc::clone(status));
        }
        let registry = ModuleRegistry::new(self.catalog, collaborators);

        let active_source = self
            .active
            .unwrap_or_else(|| ManifestSource::Path(self.config.active_manifest.clone()));
        let active = match active_source {
            ManifestSource::Path(path) => registry.load_active(path)?,
            ManifestSource::Inline(raw) => registry.load_active_str(&raw)?,
            ManifestSource::Empty => Vec::new(),
        };
        let passive_source = self
            .passive
            .unwrap_or_else(|| ManifestSource::Path(self.config.passive_manifest.clone()));
        let passive = match passive_source {
            ManifestSource::Path(path) => registry.load_passive(path)?,
            ManifestSource::Inline(raw) => registry.load_passive_str(&raw)?,
            ManifestSource::Empty => Vec::new(),
        };
        let scheduled = ModuleRegistry::schedule_passive(&passive, &handle).await?;
        tracing::info!(
            active = active.len(),
            scheduled = scheduled.len(),
            "assistant ready"
        );

        let router = CommandRouter::new(
            active,
            RouterSettings::from(&self.config),
            Some(Arc::clone(&self.output)),
        );
        Ok(Assistant {
            config: self.config,
            gate,
            input,
            recognizer: self.recognizer,
            status: self.status,
            scheduler,
            router,
            passive,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heard {
    Nothing,
    Cancelled,
    Dispatched(bool),
}

/// A running assistant.
pub struct Assistant {
    config: AssistantConfig,
    gate: Arc<ExclusiveResourceGate>,
    input: Arc<dyn VoiceInput>,
    recognizer: Arc<dyn Recognizer>,
    status: Option<Arc<dyn ServerStatus>>,
    scheduler: EventScheduler,
    router: CommandRouter,
    passive: Vec<Arc<PassiveModule>>,
}

impl Assistant {
    /// Router over the active handlers.
    pub const fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Scheduler client.
    pub fn scheduler(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    /// The voice input gate.
    pub const fn gate(&self) -> &Arc<ExclusiveResourceGate> {
        &self.gate
    }

    /// Gated voice input shared with handlers.
    pub fn voice_input(&self) -> Arc<dyn VoiceInput> {
        Arc::clone(&self.input)
    }

    /// Loaded active modules, in dispatch order.
    pub fn active_modules(&self) -> &[Arc<ActiveModule>] {
        self.router.modules()
    }

    /// Loaded passive modules.
    pub fn passive_modules(&self) -> &[Arc<PassiveModule>] {
        &self.passive
    }

    /// Listen once and route whatever was heard. Shared by the one-shot
    /// command listen and the idle loop.
    async fn listen_and_dispatch(&self, options: ListenOptions) -> Heard {
        let Some(text) = self.input.listen(None, options).await else {
            return Heard::Nothing;
        };
        if contains_any(&text, &self.config.cancel_words) {
            tracing::debug!(%text, "command cancelled by user");
            return Heard::Cancelled;
        }
        if let Some(status) = self.status.as_ref() {
            status.request_refresh();
        }
        let claimed = self.router.dispatch(&text).await;
        if !claimed {
            tracing::info!(%text, "command not understood");
        }
        Heard::Dispatched(claimed)
    }

    /// Listen for one command (with chime) and dispatch it.
    ///
    /// Returns whether the command was claimed. Silence and cancel words
    /// return `false` without dispatching.
    pub async fn listen_for_command(&self) -> bool {
        let options = self.config.listen.command_options();
        match self.listen_and_dispatch(options).await {
            Heard::Dispatched(claimed) => claimed,
            Heard::Nothing => {
                tracing::debug!("no command heard");
                false
            }
            Heard::Cancelled => false,
        }
    }

    /// Idle loop: wait for the microphone to be free, listen briefly, dispatch
    /// anything heard. Ends on a stop phrase or when input is exhausted.
    pub async fn run(&self) {
        let idle = ListenOptions {
            response_timeout: Some(IDLE_LISTEN_WINDOW),
            ..ListenOptions::default()
        };
        while !self.router.is_shutdown() {
            self.gate.wait_idle().await;
            let heard = self.listen_and_dispatch(idle.clone()).await;
            if heard == Heard::Nothing && self.recognizer.is_exhausted() {
                tracing::info!("voice input closed");
                break;
            }
        }
    }

    /// Stop the scheduler. Queued events are dropped.
    pub async fn shutdown(&self) {
        self.router.request_shutdown();
        self.scheduler.shutdown().await;
    }
}
