//! Tests for audit sink

use voice_orchestrator::core::{build_audit_event, AuditSink, InMemoryAuditSink, LifecycleAction};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let mut writer = sink.clone();

    let event = build_audit_event(
        3,
        "alarm-1",
        "AlarmAlert",
        LifecycleAction::Registered,
        Some("in 2000ms".to_string()),
    );
    writer.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].entry_key, 3);
    assert_eq!(events[0].id, "alarm-1");
    assert_eq!(events[0].handler, "AlarmAlert");
    assert_eq!(events[0].action, LifecycleAction::Registered);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(1, "a", "H", LifecycleAction::Registered, None));
    sink.record(build_audit_event(2, "b", "H", LifecycleAction::Registered, None));
    sink.record(build_audit_event(3, "c", "H", LifecycleAction::Registered, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "b"); // First one popped
    assert_eq!(events[1].id, "c");
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(7, "t", "TimerAlert", LifecycleAction::Faulted, None);
    assert!(!event.event_id.is_empty());
    assert!(event.created_at_ms > 0);
    assert!(event.detail.is_none());

    let other = build_audit_event(7, "t", "TimerAlert", LifecycleAction::Faulted, None);
    assert_ne!(event.event_id, other.event_id);
}

#[test]
fn test_action_display_and_serde() {
    assert_eq!(LifecycleAction::Requeued.to_string(), "requeued");
    let json = serde_json::to_string(&LifecycleAction::Cancelled).unwrap();
    assert_eq!(json, "\"cancelled\"");
}
