//! Process-wide assistant settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::capability::ListenOptions;

/// Scheduler control-loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Capacity of each event's management mailbox.
    pub mailbox_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            mailbox_capacity: 4,
        }
    }
}

impl SchedulerSettings {
    /// Tick period.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate scheduler values.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Defaults applied to command listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    /// Recognition attempts per listen.
    pub max_attempts: u32,
    /// Seconds to wait for speech to start; 0 waits forever.
    pub response_timeout_secs: u64,
    /// Delay before listening after the gate is acquired.
    pub start_delay_ms: u64,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            response_timeout_secs: 5,
            start_delay_ms: 0,
        }
    }
}

impl ListenSettings {
    /// Listen options for a command listen, chime included.
    pub fn command_options(&self) -> ListenOptions {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        ListenOptions {
            chime: true,
            max_attempts: self.max_attempts.max(1),
            response_timeout: secs(self.response_timeout_secs),
            start_delay: (self.start_delay_ms > 0)
                .then(|| Duration::from_millis(self.start_delay_ms)),
        }
    }
}

/// Root assistant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Scheduler loop settings.
    pub scheduler: SchedulerSettings,
    /// Listen defaults.
    pub listen: ListenSettings,
    /// Active handler manifest.
    pub active_manifest: PathBuf,
    /// Passive handler manifest.
    pub passive_manifest: PathBuf,
    /// Phrases that shut the assistant down.
    pub stop_phrases: Vec<String>,
    /// Spoken before shutting down.
    pub stop_prompt: String,
    /// Words splitting one utterance into independent commands.
    pub split_keywords: Vec<String>,
    /// Words aborting a command listen.
    pub cancel_words: Vec<String>,
    /// Log scheduler lifecycle events at debug level.
    pub audit_log: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            scheduler: SchedulerSettings::default(),
            listen: ListenSettings::default(),
            active_manifest: PathBuf::from("config/active_modules.json"),
            passive_manifest: PathBuf::from("config/passive_modules.json"),
            stop_phrases: strings(&[
                "goodnight",
                "good night",
                "freeze all motor functions",
                "turn yourself off",
                "shutdown",
                "deactivate",
            ]),
            stop_prompt: "Shutting down.".into(),
            split_keywords: strings(&["break", "brake", "also", "period", "comma"]),
            cancel_words: strings(&["cancel"]),
            audit_log: false,
        }
    }
}

impl AssistantConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        if self.listen.max_attempts == 0 {
            return Err("listen.max_attempts must be greater than 0".into());
        }
        for (name, words) in [
            ("stop_phrases", &self.stop_phrases),
            ("split_keywords", &self.split_keywords),
            ("cancel_words", &self.cancel_words),
        ] {
            if words.iter().any(|w| w.trim().is_empty()) {
                return Err(format!("{name} must not contain empty entries"));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the environment.
    ///
    /// Reads a `.env` file if present. `ASSISTANT_CONFIG` names a JSON file
    /// used as the base; individual `ASSISTANT_*` variables override it.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var("ASSISTANT_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read {path}: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in {path}: {e}"))?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        let list = |raw: String| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        if let Some(raw) = var("ASSISTANT_TICK_MS") {
            self.scheduler.tick_interval_ms = raw
                .parse()
                .map_err(|e| format!("ASSISTANT_TICK_MS: {e}"))?;
        }
        if let Some(raw) = var("ASSISTANT_AUDIT_LOG") {
            self.audit_log = raw
                .parse()
                .map_err(|e| format!("ASSISTANT_AUDIT_LOG: {e}"))?;
        }
        if let Some(path) = var("ASSISTANT_ACTIVE_MANIFEST") {
            self.active_manifest = path.into();
        }
        if let Some(path) = var("ASSISTANT_PASSIVE_MANIFEST") {
            self.passive_manifest = path.into();
        }
        if let Some(prompt) = var("ASSISTANT_STOP_PROMPT") {
            self.stop_prompt = prompt;
        }
        if let Some(raw) = var("ASSISTANT_STOP_PHRASES") {
            self.stop_phrases = list(raw);
        }
        if let Some(raw) = var("ASSISTANT_SPLIT_KEYWORDS") {
            self.split_keywords = list(raw);
        }
        if let Some(raw) = var("ASSISTANT_CANCEL_WORDS") {
            self.cancel_words = list(raw);
        }
        Ok(())
    }
}
