//! Command router: splits an utterance and hands each piece to the first
//! active handler that claims it.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

use super::capability::VoiceOutput;
use super::error::{panic_message, AssistantError};
use crate::builders::ActiveModule;
use crate::config::AssistantConfig;
use crate::util::text::contains_any;

/// Phrases the router reacts to before any handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    /// Any of these in an utterance shuts the assistant down.
    pub stop_phrases: Vec<String>,
    /// Spoken before shutting down; empty to stay silent.
    pub stop_prompt: String,
    /// Keywords splitting an utterance into sub-phrases.
    pub split_keywords: Vec<String>,
}

impl From<&AssistantConfig> for RouterSettings {
    fn from(cfg: &AssistantConfig) -> Self {
        Self {
            stop_phrases: cfg.stop_phrases.clone(),
            stop_prompt: cfg.stop_prompt.clone(),
            split_keywords: cfg.split_keywords.clone(),
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&AssistantConfig::default())
    }
}

/// Split `utterance` by each keyword in turn, applied to every fragment
/// produced so far. Matching is by substring. Fragments are trimmed and empty
/// ones dropped.
pub fn split_utterance<S: AsRef<str>>(utterance: &str, keywords: &[S]) -> Vec<String> {
    let mut fragments = vec![utterance.to_string()];
    for keyword in keywords.iter().map(AsRef::as_ref).filter(|k| !k.is_empty()) {
        fragments = fragments
            .iter()
            .flat_map(|fragment| fragment.split(keyword))
            .map(str::to_string)
            .collect();
    }
    fragments
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

/// First-match dispatcher over the active modules, in manifest order.
pub struct CommandRouter {
    modules: Vec<Arc<ActiveModule>>,
    settings: RouterSettings,
    voice_output: Option<Arc<dyn VoiceOutput>>,
    shutdown: watch::Sender<bool>,
}

impl fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("CommandRouter")
            .field("modules", &names)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    /// Router over `modules`. `voice_output` speaks init messages and the
    /// stop prompt.
    pub fn new(
        modules: Vec<Arc<ActiveModule>>,
        settings: RouterSettings,
        voice_output: Option<Arc<dyn VoiceOutput>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            modules,
            settings,
            voice_output,
            shutdown,
        }
    }

    /// Modules in dispatch order.
    pub fn modules(&self) -> &[Arc<ActiveModule>] {
        &self.modules
    }

    /// Receiver that flips to `true` when a stop phrase is heard.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether a stop phrase has been heard.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Raise the shutdown signal without a stop phrase.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Route one utterance. Returns `true` if any sub-phrase was claimed or
    /// the utterance was a stop phrase.
    pub async fn dispatch(&self, utterance: &str) -> bool {
        if contains_any(utterance, &self.settings.stop_phrases) {
            tracing::info!("stop phrase heard, shutting down");
            if let Some(out) = self.voice_output.as_ref() {
                if !self.settings.stop_prompt.is_empty() {
                    out.speak(&self.settings.stop_prompt, true).await;
                }
            }
            self.request_shutdown();
            return true;
        }

        let now = Instant::now();
        for module in &self.modules {
            module.release_if_idle(now);
        }

        let mut claimed = false;
        for phrase in split_utterance(utterance, &self.settings.split_keywords) {
            if self.dispatch_phrase(&phrase).await {
                claimed = true;
            } else {
                tracing::debug!(%phrase, "no handler claimed sub-phrase");
            }
        }
        claimed
    }

    async fn dispatch_phrase(&self, phrase: &str) -> bool {
        for module in &self.modules {
            if !module.is_valid() {
                continue;
            }
            if !module.connectivity_ok() {
                tracing::debug!(handler = %module.name(), "connectivity unmet, skipping");
                continue;
            }
            if !module.is_initialized() {
                if !module.matches_trigger(phrase) {
                    continue;
                }
                if let (Some(message), Some(out)) =
                    (module.spec().init_message.as_deref(), self.voice_output.as_ref())
                {
                    out.speak(message, true).await;
                }
                if module.lazy_init().is_err() {
                    continue;
                }
            }
            let Some(handler) = module.handler() else {
                continue;
            };

            match AssertUnwindSafe(handler.parse_command(phrase))
                .catch_unwind()
                .await
            {
                Ok(Ok(true)) => {
                    tracing::debug!(handler = %module.name(), %phrase, "sub-phrase claimed");
                    return true;
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    let fault = AssistantError::DispatchFault {
                        handler: module.name().to_string(),
                        reason: format!("{e:#}"),
                    };
                    tracing::error!("{fault}");
                    module.mark_invalid(&fault.to_string());
                }
                Err(panic) => {
                    let fault = AssistantError::DispatchFault {
                        handler: module.name().to_string(),
                        reason: format!("panic: {}", panic_message(panic.as_ref())),
                    };
                    tracing::error!("{fault}");
                    module.mark_invalid(&fault.to_string());
                }
            }
        }
        false
    }
}
