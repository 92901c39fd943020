//! Tests for error types

use voice_orchestrator::core::{AssistantError, Capability};

#[test]
fn test_config_error() {
    let err = AssistantError::Config("bad entry".to_string());
    assert_eq!(format!("{err}"), "config error: bad entry");
}

#[test]
fn test_capability_mismatch_error() {
    let err = AssistantError::CapabilityMismatch {
        handler: "timer".into(),
        reason: "missing scheduler".into(),
    };
    assert_eq!(
        format!("{err}"),
        "capability mismatch for `timer`: missing scheduler"
    );
}

#[test]
fn test_not_granted_error() {
    let err = AssistantError::CapabilityNotGranted(Capability::VoiceInput);
    assert_eq!(
        format!("{err}"),
        "capability VoiceInput was not granted to this handler"
    );
}

#[test]
fn test_scheduler_closed_error() {
    assert_eq!(
        AssistantError::SchedulerClosed.to_string(),
        "scheduler is shut down"
    );
}

#[test]
fn test_json_error_conversion() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: AssistantError = parse.into();
    assert!(matches!(err, AssistantError::Json(_)));
}
