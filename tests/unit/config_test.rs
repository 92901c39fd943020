//! Tests for configuration validation

use std::time::Duration;

use voice_orchestrator::config::{
    parse_manifest, ActiveModuleSpec, AssistantConfig, PassiveModuleSpec, SchedulerSettings,
};
use voice_orchestrator::core::{Capability, FireAt};

#[test]
fn test_scheduler_settings_validation() {
    let valid = SchedulerSettings {
        tick_interval_ms: 100,
        mailbox_capacity: 2,
    };
    assert!(valid.validate().is_ok());

    let invalid = SchedulerSettings {
        mailbox_capacity: 0,
        ..valid
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_assistant_config_rejects_empty_keyword() {
    let cfg = AssistantConfig {
        split_keywords: vec!["also".into(), " ".into()],
        ..AssistantConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("split_keywords"));
}

#[test]
fn test_assistant_config_from_json() {
    let json = r#"{
        "stopPhrases": ["ignored"],
        "stop_phrases": ["power down"],
        "cancel_words": ["cancel", "never mind"],
        "listen": { "max_attempts": 2 }
    }"#;
    let cfg = AssistantConfig::from_json_str(json);
    // Unknown keys are ignored, known ones applied.
    let cfg = cfg.unwrap();
    assert_eq!(cfg.stop_phrases, vec!["power down"]);
    assert_eq!(cfg.listen.max_attempts, 2);
    assert_eq!(cfg.listen.command_options().max_attempts, 2);
}

#[test]
fn test_active_manifest_defaults() {
    let raw = r#"{ "modules": [ { "handler": "timer" } ] }"#;
    let entries = parse_manifest::<ActiveModuleSpec>(raw).unwrap();
    let spec = entries[0].as_ref().unwrap();
    assert!(spec.eager_init);
    assert!(spec.capabilities().is_empty());
    assert_eq!(spec.dispose_timeout(), None);
    assert!(!spec.connectivity().is_gated());
}

#[test]
fn test_active_manifest_capabilities() {
    let raw = r#"{ "modules": [ {
        "handler": "timer",
        "requiresVoiceOutput": true,
        "requiresVoiceInput": true,
        "requiresScheduler": true,
        "initMessage": "One moment."
    } ] }"#;
    let entries = parse_manifest::<ActiveModuleSpec>(raw).unwrap();
    let caps = entries[0].as_ref().unwrap().capabilities();
    assert!(caps.contains(Capability::VoiceOutput));
    assert!(caps.contains(Capability::VoiceInput));
    assert!(caps.contains(Capability::Scheduler));
    assert!(!caps.contains(Capability::ServerStatus));
}

#[test]
fn test_init_message_needs_voice_output() {
    let raw = r#"{ "modules": [ { "handler": "timer", "initMessage": "hi" } ] }"#;
    let entries = parse_manifest::<ActiveModuleSpec>(raw).unwrap();
    assert!(entries[0].is_err());
}

#[test]
fn test_passive_manifest_first_fire() {
    let raw = r#"{ "modules": [
        { "handler": "timer_alert", "requiresVoiceOutput": true, "firstEventSecs": 2.5 },
        { "handler": "timer_alert", "requiresVoiceOutput": true, "firstEventSecs": -1 }
    ] }"#;
    let entries = parse_manifest::<PassiveModuleSpec>(raw).unwrap();
    let spec = entries[0].as_ref().unwrap();
    assert_eq!(spec.first_fire(), Ok(FireAt::After(Duration::from_millis(2500))));
    assert!(entries[1].is_err());
}
