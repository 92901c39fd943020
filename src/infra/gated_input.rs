//! Voice input serialized through the exclusive resource gate.

use std::sync::Arc;

use async_trait::async_trait;

use super::recognizer::Recognizer;
use crate::core::capability::{ListenOptions, VoiceInput, VoiceOutput};
use crate::core::gate::ExclusiveResourceGate;

/// [`VoiceInput`] that owns the gate for a whole prompt-and-listen exchange.
///
/// The gate is held from before the first prompt until the last recognition
/// attempt finishes, so prompts of concurrent callers never interleave.
#[derive(Clone)]
pub struct GatedVoiceInput {
    gate: Arc<ExclusiveResourceGate>,
    output: Arc<dyn VoiceOutput>,
    recognizer: Arc<dyn Recognizer>,
}

impl GatedVoiceInput {
    /// Input over `recognizer`, speaking prompts through `output`.
    pub fn new(
        gate: Arc<ExclusiveResourceGate>,
        output: Arc<dyn VoiceOutput>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            gate,
            output,
            recognizer,
        }
    }

    /// The gate guarding the microphone.
    pub fn gate(&self) -> &Arc<ExclusiveResourceGate> {
        &self.gate
    }
}

#[async_trait]
impl VoiceInput for GatedVoiceInput {
    async fn listen(&self, prompt: Option<&str>, opts: ListenOptions) -> Option<String> {
        let guard = self.gate.acquire().await;
        tracing::debug!(ticket = guard.ticket().value(), "voice input acquired");
        if let Some(delay) = opts.start_delay {
            tokio::time::sleep(delay).await;
        }
        for attempt in 1..=opts.max_attempts.max(1) {
            if let Some(prompt) = prompt {
                self.output.speak(prompt, true).await;
            }
            if opts.chime {
                self.output.chime().await;
            }
            if let Some(text) = self.recognizer.recognize(&opts).await {
                return Some(text);
            }
            tracing::debug!(attempt, "nothing recognized");
        }
        None
    }
}
