//! Tests for catalog and registry builders

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use voice_orchestrator::builders::{HandlerCatalog, ModuleRegistry};
use voice_orchestrator::config::SchedulerSettings;
use voice_orchestrator::core::{
    ActiveHandler, AppResult, Capability, CapabilitySet, Collaborators, EventScheduler,
    ServerStatus, StatusSnapshot,
};
use voice_orchestrator::infra::{RecordingVoiceOutput, StaticServerStatus};
use voice_orchestrator::runtime::TokioSpawner;

struct Echo;

#[async_trait]
impl ActiveHandler for Echo {
    async fn parse_command(&self, command: &str) -> AppResult<bool> {
        Ok(command.contains("echo"))
    }
}

fn voice_out() -> CapabilitySet {
    CapabilitySet::EMPTY.with(Capability::VoiceOutput)
}

fn catalog(built: &Arc<AtomicUsize>) -> HandlerCatalog {
    let counter = Arc::clone(built);
    HandlerCatalog::new()
        .with_active("echo", voice_out(), move |ctx| {
            ctx.voice_output()?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Echo))
        })
        .with_active("broken", CapabilitySet::EMPTY, |_| {
            anyhow::bail!("device not found")
        })
}

fn collaborators() -> Collaborators {
    Collaborators::new().with_voice_output(Arc::new(RecordingVoiceOutput::new()))
}

#[test]
fn test_bad_entries_do_not_stop_loading() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = ModuleRegistry::new(catalog(&built), collaborators());
    let manifest = r#"{ "modules": [
        { "handler": "nope" },
        { "handler": "echo" },
        { "handler": "broken" },
        { "handler": 42 },
        { "handler": "echo", "requiresVoiceOutput": true }
    ] }"#;

    let modules = registry.load_active_str(manifest).unwrap();
    // The numeric handler never becomes a descriptor.
    assert_eq!(modules.len(), 4);
    let validity: Vec<bool> = modules.iter().map(|m| m.is_valid()).collect();
    // unknown, undeclared capability, factory error, ok
    assert_eq!(validity, vec![false, false, false, true]);
    assert!(modules[3].is_initialized());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_collaborator_fails_closed() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = ModuleRegistry::new(catalog(&built), Collaborators::new());
    let modules = registry
        .load_active_str(r#"{ "modules": [ { "handler": "echo", "requiresVoiceOutput": true } ] }"#)
        .unwrap();
    assert!(!modules[0].is_valid());
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_lazy_module_builds_on_demand() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = ModuleRegistry::new(catalog(&built), collaborators());
    let modules = registry
        .load_active_str(
            r#"{ "modules": [ {
                "handler": "echo", "requiresVoiceOutput": true,
                "eagerInit": false, "runtimeTriggers": ["echo"]
            } ] }"#,
        )
        .unwrap();
    let module = &modules[0];
    assert!(module.is_valid());
    assert!(!module.is_initialized());
    assert!(module.matches_trigger("please echo this"));
    assert!(!module.matches_trigger("something else"));

    module.lazy_init().unwrap();
    module.lazy_init().unwrap();
    assert!(module.is_initialized());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_lazy_module_is_released() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = ModuleRegistry::new(catalog(&built), collaborators());
    let modules = registry
        .load_active_str(
            r#"{ "modules": [
                { "handler": "echo", "requiresVoiceOutput": true, "eagerInit": false,
                  "runtimeTriggers": ["echo"], "disposeTimeoutSecs": 30 },
                { "handler": "echo", "requiresVoiceOutput": true, "disposeTimeoutSecs": 30 }
            ] }"#,
        )
        .unwrap();
    let (lazy, eager) = (&modules[0], &modules[1]);
    lazy.lazy_init().unwrap();

    assert!(!lazy.release_if_idle(Instant::now() + Duration::from_secs(29)));
    assert!(lazy.release_if_idle(Instant::now() + Duration::from_secs(30)));
    assert!(!lazy.is_initialized());
    assert!(lazy.is_valid());

    assert!(!eager.release_if_idle(Instant::now() + Duration::from_secs(3600)));
    assert!(eager.is_initialized());
}

#[test]
fn test_gated_module_needs_status() {
    let built = Arc::new(AtomicUsize::new(0));
    let manifest = r#"{ "modules": [
        { "handler": "echo", "requiresVoiceOutput": true, "requiresServer": true }
    ] }"#;

    let without = ModuleRegistry::new(catalog(&built), collaborators());
    assert!(!without.load_active_str(manifest).unwrap()[0].is_valid());

    let status = Arc::new(StaticServerStatus::new(true, false));
    let with = ModuleRegistry::new(
        catalog(&built),
        collaborators().with_server_status(status.clone()),
    );
    let module = Arc::clone(&with.load_active_str(manifest).unwrap()[0]);
    assert!(module.is_valid());
    assert!(!module.connectivity_ok());
    status.set_server_reachable(true);
    assert!(module.connectivity_ok());
    assert_eq!(
        status.snapshot(),
        StatusSnapshot {
            online: true,
            server_reachable: true
        }
    );
}

#[test]
fn test_builtin_passive_manifest() {
    let registry = ModuleRegistry::new(
        HandlerCatalog::builtin(),
        collaborators().with_server_status(Arc::new(StaticServerStatus::default())),
    );
    let modules = registry
        .load_passive_str(
            r#"{ "modules": [
                { "handler": "status_poll", "requiresServerStatus": true, "eagerInit": false },
                { "handler": "alarm_alert", "requiresVoiceOutput": true }
            ] }"#,
        )
        .unwrap();
    assert!(modules[0].is_valid());
    assert!(!modules[0].is_initialized());
    // alarm_alert also needs voice input.
    assert!(!modules[1].is_valid());
}

#[tokio::test(start_paused = true)]
async fn test_unusable_fire_time_skips_only_that_entry() {
    let registry = ModuleRegistry::new(
        HandlerCatalog::builtin(),
        collaborators().with_server_status(Arc::new(StaticServerStatus::default())),
    );
    let modules = registry
        .load_passive_str(
            r#"{ "modules": [
                { "handler": "status_poll", "requiresServerStatus": true,
                  "firstEventSecs": 1e30, "id": "huge" },
                { "handler": "status_poll", "requiresServerStatus": true,
                  "firstEventAtUnixSecs": 1e30, "id": "far" },
                { "handler": "status_poll", "requiresServerStatus": true,
                  "firstEventSecs": 5, "id": "poll" }
            ] }"#,
        )
        .unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].spec().id.as_deref(), Some("poll"));

    let scheduler = EventScheduler::start(
        &SchedulerSettings::default(),
        TokioSpawner::current(),
        None,
    );
    let ids = ModuleRegistry::schedule_passive(&modules, &scheduler.handle())
        .await
        .unwrap();
    assert_eq!(ids, vec!["poll".to_string()]);
    scheduler.shutdown().await;
}

#[test]
fn test_passive_dispose_timeout_is_accepted() {
    let registry = ModuleRegistry::new(
        HandlerCatalog::builtin(),
        collaborators().with_server_status(Arc::new(StaticServerStatus::default())),
    );
    let modules = registry
        .load_passive_str(
            r#"{ "modules": [
                { "handler": "status_poll", "requiresServerStatus": true,
                  "disposeTimeoutSecs": 30 }
            ] }"#,
        )
        .unwrap();
    assert_eq!(modules.len(), 1);
    assert!(modules[0].is_valid());
    assert!(modules[0].is_initialized());
    assert_eq!(modules[0].spec().dispose_timeout_secs, 30);
}
