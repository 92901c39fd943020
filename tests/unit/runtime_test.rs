//! Tests for tokio spawner and assistant wiring

use std::sync::Arc;

use voice_orchestrator::config::AssistantConfig;
use voice_orchestrator::core::Spawn;
use voice_orchestrator::infra::{
    RecordingVoiceOutput, ScriptedRecognizer, StaticServerStatus, Transcript,
};
use voice_orchestrator::runtime::tokio_spawner::TokioSpawner;
use voice_orchestrator::runtime::AssistantBuilder;

const TIMER_MANIFEST: &str = r#"{ "modules": [ {
    "handler": "timer",
    "requiresVoiceOutput": true,
    "requiresVoiceInput": true,
    "requiresScheduler": true
} ] }"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(start_paused = true)]
async fn test_listen_for_command_dispatches() {
    let transcript = Transcript::new();
    let output = Arc::new(RecordingVoiceOutput::with_transcript(transcript.clone()));
    let recognizer = Arc::new(
        ScriptedRecognizer::new([Some("set a timer for ten seconds")])
            .with_transcript(transcript.clone()),
    );
    let status = Arc::new(StaticServerStatus::new(true, true));
    let assistant = AssistantBuilder::new(AssistantConfig::default(), output.clone(), recognizer)
        .server_status(status.clone())
        .active_manifest_json(TIMER_MANIFEST)
        .without_passive_manifest()
        .build()
        .await
        .unwrap();

    assert!(assistant.listen_for_command().await);
    assert_eq!(status.refresh_count(), 1);
    assert_eq!(output.spoken(), vec!["Timer set for 10 seconds."]);
    assert_eq!(assistant.scheduler().pending().await.unwrap().len(), 1);
    assistant.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_word_aborts_command() {
    let output = Arc::new(RecordingVoiceOutput::new());
    let recognizer = Arc::new(ScriptedRecognizer::new([Some("timer for five minutes cancel")]));
    let assistant = AssistantBuilder::new(AssistantConfig::default(), output.clone(), recognizer)
        .active_manifest_json(TIMER_MANIFEST)
        .without_passive_manifest()
        .build()
        .await
        .unwrap();

    assert!(!assistant.listen_for_command().await);
    assert!(output.spoken().is_empty());
    assert!(assistant.scheduler().pending().await.unwrap().is_empty());
    assistant.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silence_dispatches_nothing() {
    let output = Arc::new(RecordingVoiceOutput::new());
    let recognizer = Arc::new(ScriptedRecognizer::new(Vec::<Option<String>>::new()));
    let assistant = AssistantBuilder::new(AssistantConfig::default(), output.clone(), recognizer)
        .active_manifest_json(TIMER_MANIFEST)
        .without_passive_manifest()
        .build()
        .await
        .unwrap();
    assert!(!assistant.listen_for_command().await);
    assistant.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_run_matches_single_command_handling() {
    let output = Arc::new(RecordingVoiceOutput::new());
    let recognizer = Arc::new(ScriptedRecognizer::new([
        Some("timer for five minutes cancel"),
        None,
        Some("timer for two minutes"),
        Some("good night"),
    ]));
    let status = Arc::new(StaticServerStatus::new(true, true));
    let assistant = AssistantBuilder::new(AssistantConfig::default(), output.clone(), recognizer)
        .server_status(status.clone())
        .active_manifest_json(TIMER_MANIFEST)
        .without_passive_manifest()
        .build()
        .await
        .unwrap();

    assistant.run().await;
    // Refreshed once per dispatched command; silence and cancels skip it.
    assert_eq!(status.refresh_count(), 2);
    assert_eq!(
        output.spoken(),
        vec!["Timer set for 2 minutes.", "Shutting down."]
    );
    assert_eq!(assistant.scheduler().pending().await.unwrap().len(), 1);
    assistant.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_stop_phrase() {
    let output = Arc::new(RecordingVoiceOutput::new());
    let recognizer = Arc::new(ScriptedRecognizer::new([
        None,
        Some("timer for two minutes"),
        Some("good night"),
        Some("timer for three minutes"),
    ]));
    let assistant =
        AssistantBuilder::new(AssistantConfig::default(), output.clone(), recognizer.clone())
            .active_manifest_json(TIMER_MANIFEST)
            .without_passive_manifest()
            .build()
            .await
            .unwrap();

    assistant.run().await;
    assert!(assistant.router().is_shutdown());
    assert_eq!(
        output.spoken(),
        vec!["Timer set for 2 minutes.", "Shutting down."]
    );
    assert_eq!(recognizer.remaining(), 1);
    assistant.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = AssistantConfig {
        stop_phrases: vec![String::new()],
        ..AssistantConfig::default()
    };
    let result = AssistantBuilder::new(
        config,
        Arc::new(RecordingVoiceOutput::new()),
        Arc::new(ScriptedRecognizer::new(Vec::<Option<String>>::new())),
    )
    .build()
    .await;
    assert!(result.is_err());
}
