//! Voice output adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::core::capability::VoiceOutput;

/// Writes speech to stdout, one line per utterance.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleVoiceOutput;

#[async_trait]
impl VoiceOutput for ConsoleVoiceOutput {
    async fn speak(&self, text: &str, _blocking: bool) {
        let line = format!("assistant> {text}\n");
        let mut stdout = tokio::io::stdout();
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::warn!("console output failed: {e}");
        }
        let _ = stdout.flush().await;
    }

    async fn chime(&self) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(b"assistant> *chime*\n").await;
        let _ = stdout.flush().await;
    }
}

/// Shared, ordered log of everything said and heard.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn push(&self, line: impl Into<String>) {
        self.0.lock().push(line.into());
    }

    /// Snapshot of all lines.
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Records speech into a [`Transcript`] as `say: <text>`.
///
/// A blocking speak waits `speak_time` to stand in for playback.
#[derive(Debug, Clone, Default)]
pub struct RecordingVoiceOutput {
    transcript: Transcript,
    speak_time: Duration,
}

impl RecordingVoiceOutput {
    /// Recorder with its own transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder writing into `transcript`.
    pub fn with_transcript(transcript: Transcript) -> Self {
        Self {
            transcript,
            speak_time: Duration::ZERO,
        }
    }

    /// Simulated playback time for blocking speech.
    #[must_use]
    pub const fn with_speak_time(mut self, speak_time: Duration) -> Self {
        self.speak_time = speak_time;
        self
    }

    /// The transcript written to.
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Only the spoken lines, without the `say: ` prefix.
    pub fn spoken(&self) -> Vec<String> {
        self.transcript
            .lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix("say: ").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl VoiceOutput for RecordingVoiceOutput {
    async fn speak(&self, text: &str, blocking: bool) {
        self.transcript.push(format!("say: {text}"));
        if blocking && !self.speak_time.is_zero() {
            tokio::time::sleep(self.speak_time).await;
        }
    }

    async fn chime(&self) {
        self.transcript.push("chime");
    }
}
