//! `voice-orchestrator`: console front end for the orchestration core.
//!
//! Each line read from stdin stands in for one recognized utterance and
//! speech is printed to stdout. Configuration comes from the environment
//! (`ASSISTANT_*`, optionally through a `.env` file).

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use voice_orchestrator::config::AssistantConfig;
use voice_orchestrator::core::TracingAuditSink;
use voice_orchestrator::infra::{ChannelRecognizer, ConsoleVoiceOutput, StaticServerStatus};
use voice_orchestrator::runtime::{build_runtime, AssistantBuilder};
use voice_orchestrator::util::init_tracing;

const EMPTY_MANIFEST: &str = r#"{ "modules": [] }"#;

fn main() -> ExitCode {
    init_tracing();
    let config = match AssistantConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match build_runtime(None) {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AssistantConfig) -> anyhow::Result<()> {
    let (recognizer, lines) = ChannelRecognizer::channel(32);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if lines.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut builder = AssistantBuilder::new(
        config.clone(),
        Arc::new(ConsoleVoiceOutput),
        Arc::new(recognizer),
    )
    .server_status(Arc::new(StaticServerStatus::new(true, false)));
    if config.audit_log {
        builder = builder.audit(Box::new(TracingAuditSink));
    }
    if !config.active_manifest.exists() {
        tracing::warn!(path = %config.active_manifest.display(), "active manifest not found");
        builder = builder.active_manifest_json(EMPTY_MANIFEST);
    }
    if !config.passive_manifest.exists() {
        tracing::warn!(path = %config.passive_manifest.display(), "passive manifest not found");
        builder = builder.without_passive_manifest();
    }

    let assistant = builder.build().await?;
    assistant.run().await;
    assistant.shutdown().await;
    Ok(())
}
