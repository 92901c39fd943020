//! Speech recognizer adapters sitting behind [`super::GatedVoiceInput`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::voice::Transcript;
use crate::core::capability::ListenOptions;

/// Turns one stretch of audio into text. Never called concurrently; the
/// gated input serializes callers.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize a single phrase. `None` on timeout or no match.
    async fn recognize(&self, opts: &ListenOptions) -> Option<String>;

    /// Whether no further input can ever arrive.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Recognizer fed by a channel of already-transcribed lines.
pub struct ChannelRecognizer {
    rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    closed: AtomicBool,
}

impl ChannelRecognizer {
    /// Recognizer and the sender that feeds it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
                closed: AtomicBool::new(false),
            },
            tx,
        )
    }
}

#[async_trait]
impl Recognizer for ChannelRecognizer {
    async fn recognize(&self, opts: &ListenOptions) -> Option<String> {
        let mut rx = self.rx.lock().await;
        let received = match opts.response_timeout {
            Some(limit) => tokio::time::timeout(limit, rx.recv()).await.ok()?,
            None => rx.recv().await,
        };
        let Some(line) = received else {
            self.closed.store(true, Ordering::Release);
            return None;
        };
        let line = line.trim().to_lowercase();
        (!line.is_empty()).then_some(line)
    }

    fn is_exhausted(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Replays a fixed script of recognition results.
///
/// Each call pops the next entry; an exhausted script hears nothing.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Option<String>>>,
    transcript: Transcript,
    listen_time: Duration,
}

impl ScriptedRecognizer {
    /// Recognizer answering with `script` in order.
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(script.into_iter().map(|s| s.map(Into::into)).collect()),
            transcript: Transcript::new(),
            listen_time: Duration::ZERO,
        }
    }

    /// Log results into `transcript` as `heard: <text>` / `heard nothing`.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    /// Simulated time spent listening per call.
    #[must_use]
    pub const fn with_listen_time(mut self, listen_time: Duration) -> Self {
        self.listen_time = listen_time;
        self
    }

    /// Queue another result.
    pub fn push(&self, result: Option<&str>) {
        self.script.lock().push_back(result.map(str::to_string));
    }

    /// Results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, _opts: &ListenOptions) -> Option<String> {
        if !self.listen_time.is_zero() {
            tokio::time::sleep(self.listen_time).await;
        }
        let heard = self.script.lock().pop_front().flatten();
        match heard.as_deref() {
            Some(text) => self.transcript.push(format!("heard: {text}")),
            None => self.transcript.push("heard nothing"),
        }
        heard
    }

    fn is_exhausted(&self) -> bool {
        self.script.lock().is_empty()
    }
}
