//! Module registry: turns manifests into ready-to-use handler modules.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::catalog::{ActiveFactory, CatalogEntry, HandlerCatalog, ScheduledFactory};
use crate::config::{parse_manifest, ActiveModuleSpec, Connectivity, PassiveModuleSpec};
use crate::core::capability::{Collaborators, HandlerContext, ServerStatus};
use crate::core::error::{AppResult, AssistantError, Result};
use crate::core::handler::{ActiveHandler, FiringContext, ScheduledHandler};
use crate::core::scheduler::{ScheduleRequest, SchedulerHandle};
use crate::util::text::contains_any;

struct Built<F> {
    entry: CatalogEntry<F>,
    context: HandlerContext,
}

struct Slot<H: ?Sized> {
    handler: Option<Arc<H>>,
    last_used: Option<Instant>,
}

/// Validity flag shared by both module kinds. Only ever goes false.
struct Validity(AtomicBool);

impl Validity {
    const fn new(valid: bool) -> Self {
        Self(AtomicBool::new(valid))
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An active handler descriptor plus its (possibly not yet built) instance.
pub struct ActiveModule {
    spec: ActiveModuleSpec,
    built: Option<Built<ActiveFactory>>,
    status: Option<Arc<dyn ServerStatus>>,
    slot: Mutex<Slot<dyn ActiveHandler>>,
    valid: Validity,
}

impl ActiveModule {
    /// Manifest entry this module came from.
    pub const fn spec(&self) -> &ActiveModuleSpec {
        &self.spec
    }

    /// Catalog name.
    pub fn name(&self) -> &str {
        &self.spec.handler
    }

    /// False once construction or dispatch failed.
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Disable the module for all future dispatches.
    pub fn mark_invalid(&self, reason: &str) {
        if self.is_valid() {
            tracing::warn!(handler = %self.name(), "disabling active handler: {reason}");
        }
        self.valid.clear();
    }

    /// Whether a handler instance currently exists.
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().handler.is_some()
    }

    /// Whether `phrase` contains one of the runtime trigger keywords.
    pub fn matches_trigger(&self, phrase: &str) -> bool {
        contains_any(phrase, &self.spec.runtime_triggers)
    }

    /// Whether the connectivity requirements hold right now.
    pub fn connectivity_ok(&self) -> bool {
        connectivity_ok(self.spec.connectivity(), self.status.as_ref())
    }

    /// Construct the handler if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Construction failures are returned and the module is marked invalid.
    pub fn lazy_init(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(AssistantError::HandlerConstruction {
                handler: self.name().to_string(),
                reason: "module is invalid".into(),
            });
        }
        let mut slot = self.slot.lock();
        if slot.handler.is_some() {
            return Ok(());
        }
        let Some(built) = self.built.as_ref() else {
            return Err(AssistantError::UnknownHandler(self.name().to_string()));
        };
        match built.entry.build(self.name(), built.context.clone()) {
            Ok(handler) => {
                tracing::info!(handler = %self.name(), "active handler initialized");
                slot.handler = Some(handler);
                slot.last_used = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                drop(slot);
                self.mark_invalid(&e.to_string());
                Err(e)
            }
        }
    }

    /// Current instance, stamping it as used.
    pub(crate) fn handler(&self) -> Option<Arc<dyn ActiveHandler>> {
        let mut slot = self.slot.lock();
        let handler = slot.handler.clone()?;
        slot.last_used = Some(Instant::now());
        Some(handler)
    }

    /// Drop a lazily built instance that sat idle past its dispose timeout.
    ///
    /// Eager modules and modules without a timeout are never released.
    pub fn release_if_idle(&self, now: Instant) -> bool {
        if self.spec.eager_init {
            return false;
        }
        let Some(timeout) = self.spec.dispose_timeout() else {
            return false;
        };
        let mut slot = self.slot.lock();
        let idle = slot
            .last_used
            .is_some_and(|used| now.saturating_duration_since(used) >= timeout);
        if idle && slot.handler.take().is_some() {
            slot.last_used = None;
            tracing::info!(handler = %self.name(), "released idle active handler");
            return true;
        }
        false
    }
}

/// A passive handler descriptor. Also the scheduled handler registered with
/// the scheduler: it applies connectivity gating and builds the real handler
/// on first fire when the manifest asks for lazy construction.
pub struct PassiveModule {
    spec: PassiveModuleSpec,
    built: Option<Built<ScheduledFactory>>,
    status: Option<Arc<dyn ServerStatus>>,
    slot: Mutex<Slot<dyn ScheduledHandler>>,
    valid: Validity,
}

impl PassiveModule {
    /// Manifest entry this module came from.
    pub const fn spec(&self) -> &PassiveModuleSpec {
        &self.spec
    }

    /// False once construction failed.
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Whether a handler instance currently exists.
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().handler.is_some()
    }

    /// Construct the handler if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Construction failures are returned and the module is marked invalid.
    pub fn lazy_init(&self) -> Result<Arc<dyn ScheduledHandler>> {
        let name = self.spec.handler.as_str();
        if !self.is_valid() {
            return Err(AssistantError::HandlerConstruction {
                handler: name.to_string(),
                reason: "module is invalid".into(),
            });
        }
        let mut slot = self.slot.lock();
        if let Some(handler) = slot.handler.as_ref() {
            return Ok(Arc::clone(handler));
        }
        let Some(built) = self.built.as_ref() else {
            return Err(AssistantError::UnknownHandler(name.to_string()));
        };
        match built.entry.build(name, built.context.clone()) {
            Ok(handler) => {
                tracing::debug!(handler = %name, "passive handler initialized");
                slot.handler = Some(Arc::clone(&handler));
                Ok(handler)
            }
            Err(e) => {
                tracing::warn!(handler = %name, "disabling passive handler: {e}");
                self.valid.clear();
                Err(e)
            }
        }
    }

    /// Register this module's first event.
    ///
    /// # Errors
    ///
    /// Fails if the module is invalid, its first fire time is unusable, or
    /// the scheduler is closed.
    pub async fn schedule(self: &Arc<Self>, scheduler: &SchedulerHandle) -> Result<String> {
        if !self.is_valid() {
            return Err(AssistantError::InvalidSchedule(format!(
                "passive module `{}` is invalid",
                self.spec.handler
            )));
        }
        let first = self
            .spec
            .first_fire()
            .map_err(AssistantError::InvalidSchedule)?;
        let handler: Arc<dyn ScheduledHandler> = Arc::clone(self) as Arc<dyn ScheduledHandler>;
        let mut request = ScheduleRequest::new(handler, first)
            .with_payload(self.spec.payload.clone());
        if let Some(id) = self.spec.id.as_ref() {
            request = request.with_id(id.clone());
        }
        scheduler.create_scheduled(request).await
    }
}

#[async_trait]
impl ScheduledHandler for PassiveModule {
    fn name(&self) -> &str {
        &self.spec.handler
    }

    async fn fire(&self, ctx: FiringContext) -> AppResult<()> {
        if !connectivity_ok(self.spec.connectivity(), self.status.as_ref()) {
            tracing::info!(handler = %self.spec.handler, "connectivity unmet, skipping fire");
            return Ok(());
        }
        let handler = self.lazy_init()?;
        handler.fire(ctx).await
    }
}

fn connectivity_ok(required: Connectivity, status: Option<&Arc<dyn ServerStatus>>) -> bool {
    if !required.is_gated() {
        return true;
    }
    status.is_some_and(|s| required.is_satisfied_by(s.snapshot()))
}

/// Loads manifests against a catalog and a set of collaborators.
#[derive(Clone)]
pub struct ModuleRegistry {
    catalog: Arc<HandlerCatalog>,
    collaborators: Collaborators,
}

impl ModuleRegistry {
    /// Registry over `catalog`, granting from `collaborators`.
    pub fn new(catalog: HandlerCatalog, collaborators: Collaborators) -> Self {
        Self {
            catalog: Arc::new(catalog),
            collaborators,
        }
    }

    /// Load the active manifest at `path`.
    ///
    /// # Errors
    ///
    /// Only an unreadable or malformed document fails; bad entries are
    /// returned marked invalid or skipped.
    pub fn load_active(&self, path: impl AsRef<Path>) -> Result<Vec<Arc<ActiveModule>>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        self.load_active_str(&raw)
    }

    /// Load an active manifest from a JSON string.
    ///
    /// # Errors
    ///
    /// See [`Self::load_active`].
    pub fn load_active_str(&self, raw: &str) -> Result<Vec<Arc<ActiveModule>>> {
        let mut modules = Vec::new();
        for entry in parse_manifest::<ActiveModuleSpec>(raw)? {
            let spec = match entry {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!("skipping active manifest entry: {e}");
                    continue;
                }
            };
            let module = Arc::new(self.active_module(spec));
            if module.is_valid() && module.spec.eager_init {
                // Failure is logged and marks the module invalid.
                let _ = module.lazy_init();
            }
            modules.push(module);
        }
        tracing::info!(
            loaded = modules.len(),
            valid = modules.iter().filter(|m| m.is_valid()).count(),
            "active manifest loaded"
        );
        Ok(modules)
    }

    fn active_module(&self, spec: ActiveModuleSpec) -> ActiveModule {
        let name = spec.handler.clone();
        let built = self.catalog.active(&name).cloned().and_then(|entry| {
            let context = entry.grant(
                &name,
                spec.capabilities(),
                spec.connectivity().is_gated(),
                &self.collaborators,
            )?;
            Ok(Built { entry, context })
        });
        let built = match built {
            Ok(built) => Some(built),
            Err(e) => {
                tracing::warn!(handler = %name, "active handler invalid: {e}");
                None
            }
        };
        ActiveModule {
            valid: Validity::new(built.is_some()),
            status: self.collaborators.server_status().cloned(),
            slot: Mutex::new(Slot {
                handler: None,
                last_used: None,
            }),
            built,
            spec,
        }
    }

    /// Load the passive manifest at `path`.
    ///
    /// # Errors
    ///
    /// Only an unreadable or malformed document fails.
    pub fn load_passive(&self, path: impl AsRef<Path>) -> Result<Vec<Arc<PassiveModule>>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        self.load_passive_str(&raw)
    }

    /// Load a passive manifest from a JSON string.
    ///
    /// # Errors
    ///
    /// See [`Self::load_passive`].
    pub fn load_passive_str(&self, raw: &str) -> Result<Vec<Arc<PassiveModule>>> {
        let mut modules = Vec::new();
        for entry in parse_manifest::<PassiveModuleSpec>(raw)? {
            let spec = match entry {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!("skipping passive manifest entry: {e}");
                    continue;
                }
            };
            let module = Arc::new(self.passive_module(spec));
            if module.is_valid() && module.spec.eager_init {
                let _ = module.lazy_init();
            }
            modules.push(module);
        }
        tracing::info!(loaded = modules.len(), "passive manifest loaded");
        Ok(modules)
    }

    fn passive_module(&self, spec: PassiveModuleSpec) -> PassiveModule {
        let name = spec.handler.clone();
        let built = self.catalog.scheduled(&name).cloned().and_then(|entry| {
            let context = entry.grant(
                &name,
                spec.capabilities(),
                spec.connectivity().is_gated(),
                &self.collaborators,
            )?;
            Ok(Built { entry, context })
        });
        let built = match built {
            Ok(built) => Some(built),
            Err(e) => {
                tracing::warn!(handler = %name, "passive handler invalid: {e}");
                None
            }
        };
        PassiveModule {
            valid: Validity::new(built.is_some()),
            status: self.collaborators.server_status().cloned(),
            slot: Mutex::new(Slot {
                handler: None,
                last_used: None,
            }),
            built,
            spec,
        }
    }

    /// Schedule every valid passive module, returning the ids registered.
    ///
    /// # Errors
    ///
    /// Fails only when the scheduler is closed.
    pub async fn schedule_passive(
        modules: &[Arc<PassiveModule>],
        scheduler: &SchedulerHandle,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for module in modules.iter().filter(|m| m.is_valid()) {
            match module.schedule(scheduler).await {
                Ok(id) => ids.push(id),
                Err(AssistantError::SchedulerClosed) => {
                    return Err(AssistantError::SchedulerClosed);
                }
                Err(e) => tracing::warn!(handler = %module.spec.handler, "not scheduled: {e}"),
            }
        }
        Ok(ids)
    }
}
