//! Tests for the built-in scheduled handlers driven by a live scheduler

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use voice_orchestrator::config::SchedulerSettings;
use voice_orchestrator::core::{
    Capability, CapabilitySet, Collaborators, EventScheduler, ExclusiveResourceGate, FireAt,
    HandlerContext, InMemoryAuditSink, LifecycleAction, ScheduleRequest,
};
use voice_orchestrator::handlers::{AlarmAlert, StatusPoll, TimerAlert};
use voice_orchestrator::infra::{
    GatedVoiceInput, RecordingVoiceOutput, ScriptedRecognizer, StaticServerStatus,
};
use voice_orchestrator::runtime::TokioSpawner;

fn start(audit: &InMemoryAuditSink) -> EventScheduler {
    EventScheduler::start(
        &SchedulerSettings::default(),
        TokioSpawner::current(),
        Some(Box::new(audit.clone())),
    )
}

fn voice_context(
    output: &Arc<RecordingVoiceOutput>,
    recognizer: ScriptedRecognizer,
) -> HandlerContext {
    let input = GatedVoiceInput::new(
        Arc::new(ExclusiveResourceGate::new()),
        output.clone(),
        Arc::new(recognizer),
    );
    Collaborators::new()
        .with_voice_output(output.clone())
        .with_voice_input(Arc::new(input))
        .grant(
            "alarm_alert",
            CapabilitySet::EMPTY
                .with(Capability::VoiceOutput)
                .with(Capability::VoiceInput),
        )
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_timer_alert_announces_and_disposes() {
    let audit = InMemoryAuditSink::new(32);
    let scheduler = start(&audit);
    let output = Arc::new(RecordingVoiceOutput::new());

    let id = scheduler
        .handle()
        .create_scheduled(
            ScheduleRequest::new(
                Arc::new(TimerAlert::new(output.clone())),
                FireAt::After(Duration::from_secs(3)),
            )
            .with_payload(json!({ "duration": 3, "seconds": 3, "units": "seconds" }))
            .with_id("tea"),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(output.spoken(), vec!["Timer for 3 seconds has finished."]);
    assert_eq!(
        audit.actions_for(&id),
        vec![
            LifecycleAction::Registered,
            LifecycleAction::Fired,
            LifecycleAction::Disposed
        ]
    );
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_alarm_snoozes_then_finishes() {
    let audit = InMemoryAuditSink::new(32);
    let scheduler = start(&audit);
    let output = Arc::new(RecordingVoiceOutput::new());
    let ctx = voice_context(&output, ScriptedRecognizer::new([Some("yes please")]));
    let alarm = Arc::new(AlarmAlert::new(&ctx).unwrap());

    scheduler
        .handle()
        .create_scheduled(
            ScheduleRequest::new(alarm, FireAt::After(Duration::from_secs(1)))
                .with_payload(json!({
                    "name": "wake up", "snoozeRemaining": 1, "snoozeSecs": 60
                }))
                .with_id("alarm-1"),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(
        output.spoken(),
        vec![
            "Your alarm, wake up, has activated. Do you wish to snooze?",
            "Snoozing, wake up, for 1 more minutes.",
            "Your alarm, wake up, has activated.",
        ]
    );
    assert_eq!(audit.count("alarm-1", LifecycleAction::Fired), 2);
    assert_eq!(audit.count("alarm-1", LifecycleAction::Requeued), 1);
    assert_eq!(audit.count("alarm-1", LifecycleAction::Disposed), 1);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_daily_alarm_requeues_a_day_later() {
    let audit = InMemoryAuditSink::new(32);
    let scheduler = start(&audit);
    let handle = scheduler.handle();
    let output = Arc::new(RecordingVoiceOutput::new());
    let ctx = voice_context(&output, ScriptedRecognizer::new(Vec::<Option<String>>::new()));

    handle
        .create_scheduled(
            ScheduleRequest::new(
                Arc::new(AlarmAlert::new(&ctx).unwrap()),
                FireAt::After(Duration::from_secs(1)),
            )
            .with_payload(json!({
                "name": "daily", "snoozeRemaining": 0, "repeatDaily": true
            }))
            .with_id("daily"),
        )
        .await
        .unwrap();
    let first = handle.lookup_by_id("daily").await.unwrap().unwrap().fire_at;

    tokio::time::sleep(Duration::from_secs(3)).await;
    let next = handle.lookup_by_id("daily").await.unwrap().unwrap().fire_at;
    assert_eq!(next, first + Duration::from_secs(86_400));
    assert_eq!(output.spoken(), vec!["Your alarm, daily, has activated."]);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reregistered_alarm_gets_fresh_snoozes() {
    let audit = InMemoryAuditSink::new(32);
    let scheduler = start(&audit);
    let handle = scheduler.handle();
    let output = Arc::new(RecordingVoiceOutput::new());
    let ctx = voice_context(
        &output,
        ScriptedRecognizer::new([Some("snooze"), Some("snooze")]),
    );
    let alarm = Arc::new(AlarmAlert::new(&ctx).unwrap());
    let request = || {
        ScheduleRequest::new(alarm.clone(), FireAt::After(Duration::from_secs(1)))
            .with_payload(json!({ "name": "wake", "snoozeRemaining": 1, "snoozeSecs": 60 }))
            .with_id("alarm-1")
    };

    handle.create_scheduled(request()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    // Snoozed and queued again; drop it and register the same id anew.
    assert!(handle.lookup_by_id("alarm-1").await.unwrap().is_some());
    assert!(handle.cancel_by_id("alarm-1").await.unwrap());
    handle.create_scheduled(request()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        output.spoken(),
        vec![
            "Your alarm, wake, has activated. Do you wish to snooze?",
            "Snoozing, wake, for 1 more minutes.",
            "Your alarm, wake, has activated. Do you wish to snooze?",
            "Snoozing, wake, for 1 more minutes.",
        ]
    );
    assert_eq!(audit.count("alarm-1", LifecycleAction::Requeued), 2);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_alarm_stops_mid_firing() {
    let audit = InMemoryAuditSink::new(32);
    let scheduler = start(&audit);
    let handle = scheduler.handle();
    let output = Arc::new(RecordingVoiceOutput::new());
    let recognizer =
        ScriptedRecognizer::new([Some("snooze")]).with_listen_time(Duration::from_secs(10));
    let ctx = voice_context(&output, recognizer);

    handle
        .create_scheduled(
            ScheduleRequest::new(
                Arc::new(AlarmAlert::new(&ctx).unwrap()),
                FireAt::After(Duration::from_secs(1)),
            )
            .with_id("alarm-2"),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    // Firing and waiting for an answer; not visible to lookups.
    assert!(handle.lookup_by_id("alarm-2").await.unwrap().is_none());
    assert!(handle.cancel_by_id("alarm-2").await.unwrap());
    assert!(!handle.cancel_by_id("alarm-2").await.unwrap());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(
        output.spoken(),
        vec!["Your alarm, alarm, has activated. Do you wish to snooze?"]
    );
    assert_eq!(handle.live_count().await.unwrap(), 0);
    assert_eq!(audit.count("alarm-2", LifecycleAction::Requeued), 0);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_poll_recurs() {
    let audit = InMemoryAuditSink::new(64);
    let scheduler = start(&audit);
    let status = Arc::new(StaticServerStatus::new(true, true));

    scheduler
        .handle()
        .create_scheduled(
            ScheduleRequest::new(
                Arc::new(StatusPoll::new(status.clone())),
                FireAt::After(Duration::ZERO),
            )
            .with_payload(json!({ "intervalSecs": 10 })),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!((3..=4).contains(&status.refresh_count()));
    assert_eq!(
        scheduler.handle().live_count().await.unwrap(),
        1,
        "poll stays registered"
    );
    scheduler.shutdown().await;
}
