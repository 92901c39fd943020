//! Handler manifests.
//!
//! A manifest is an ordered JSON document listing the handlers to load:
//!
//! ```json
//! { "modules": [
//!     { "handler": "timer", "requiresVoiceOutput": true, "eagerInit": true }
//! ] }
//! ```
//!
//! Entries are decoded one at a time so a malformed entry invalidates only
//! itself. Unknown fields are rejected; in particular a passive entry cannot
//! ask for the scheduler.

use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::capability::{Capability, CapabilitySet, StatusSnapshot};
use crate::core::error::{AssistantError, Result};
use crate::core::handler::{FireAt, Payload};
use crate::util::clock;

/// Connectivity a handler needs before it may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connectivity {
    /// Needs internet access.
    pub requires_online: bool,
    /// Needs the home-automation server.
    pub requires_server: bool,
}

impl Connectivity {
    /// Whether any requirement is set.
    pub const fn is_gated(self) -> bool {
        self.requires_online || self.requires_server
    }

    /// Whether `status` meets every requirement.
    pub const fn is_satisfied_by(self, status: StatusSnapshot) -> bool {
        (!self.requires_online || status.online)
            && (!self.requires_server || status.server_reachable)
    }
}

/// One active handler entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActiveModuleSpec {
    /// Catalog name of the implementation.
    pub handler: String,
    /// Needs speech output.
    #[serde(default)]
    pub requires_voice_output: bool,
    /// Needs speech input.
    #[serde(default)]
    pub requires_voice_input: bool,
    /// Needs the server-status snapshot.
    #[serde(default)]
    pub requires_server_status: bool,
    /// Needs the scheduler handle.
    #[serde(default)]
    pub requires_scheduler: bool,
    /// Needs internet access.
    #[serde(default)]
    pub requires_online: bool,
    /// Needs the home-automation server.
    #[serde(default)]
    pub requires_server: bool,
    /// Construct at load time instead of on first trigger.
    #[serde(default = "default_true")]
    pub eager_init: bool,
    /// Idle seconds after which a lazily built handler is dropped; 0 never.
    #[serde(default)]
    pub dispose_timeout_secs: u64,
    /// Keywords that construct a lazy handler.
    #[serde(default)]
    pub runtime_triggers: Vec<String>,
    /// Spoken while a lazy handler is being constructed.
    #[serde(default)]
    pub init_message: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl ActiveModuleSpec {
    /// Connectivity gating.
    pub const fn connectivity(&self) -> Connectivity {
        Connectivity {
            requires_online: self.requires_online,
            requires_server: self.requires_server,
        }
    }

    /// Declared capabilities.
    pub const fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::EMPTY
            .with_if(Capability::VoiceOutput, self.requires_voice_output)
            .with_if(Capability::VoiceInput, self.requires_voice_input)
            .with_if(Capability::ServerStatus, self.requires_server_status)
            .with_if(Capability::Scheduler, self.requires_scheduler)
    }

    /// Idle disposal timeout, if any.
    pub const fn dispose_timeout(&self) -> Option<Duration> {
        if self.dispose_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.dispose_timeout_secs))
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.handler.trim().is_empty() {
            return Err("handler must not be empty".into());
        }
        if !self.eager_init && self.runtime_triggers.iter().all(|t| t.trim().is_empty()) {
            return Err("lazy handler needs at least one runtime trigger".into());
        }
        if self.init_message.is_some() && !self.requires_voice_output {
            return Err("initMessage requires requiresVoiceOutput".into());
        }
        Ok(())
    }
}

/// One passive handler entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PassiveModuleSpec {
    /// Catalog name of the implementation.
    pub handler: String,
    /// Needs speech output.
    #[serde(default)]
    pub requires_voice_output: bool,
    /// Needs speech input.
    #[serde(default)]
    pub requires_voice_input: bool,
    /// Needs the server-status snapshot.
    #[serde(default)]
    pub requires_server_status: bool,
    /// Needs internet access.
    #[serde(default)]
    pub requires_online: bool,
    /// Needs the home-automation server.
    #[serde(default)]
    pub requires_server: bool,
    /// Construct at load time instead of at first fire.
    #[serde(default = "default_true")]
    pub eager_init: bool,
    /// Accepted for parity with active entries; the scheduler owns the
    /// lifetime of passive handlers, so it has no effect.
    #[serde(default)]
    pub dispose_timeout_secs: u64,
    /// First fire, seconds after load.
    #[serde(default)]
    pub first_event_secs: Option<f64>,
    /// First fire, as a Unix timestamp.
    #[serde(default)]
    pub first_event_at_unix_secs: Option<f64>,
    /// Event id; defaults to the handler name.
    #[serde(default)]
    pub id: Option<String>,
    /// Payload handed to the handler.
    #[serde(default)]
    pub payload: Payload,
}

impl PassiveModuleSpec {
    /// Connectivity gating.
    pub const fn connectivity(&self) -> Connectivity {
        Connectivity {
            requires_online: self.requires_online,
            requires_server: self.requires_server,
        }
    }

    /// Declared capabilities.
    pub const fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::EMPTY
            .with_if(Capability::VoiceOutput, self.requires_voice_output)
            .with_if(Capability::VoiceInput, self.requires_voice_input)
            .with_if(Capability::ServerStatus, self.requires_server_status)
    }

    /// First fire time. Fires on the next tick when neither field is set.
    ///
    /// # Errors
    ///
    /// Both fields set, or a value that is negative, not finite, or too far
    /// ahead to represent.
    pub fn first_fire(&self) -> std::result::Result<FireAt, String> {
        match (self.first_event_secs, self.first_event_at_unix_secs) {
            (Some(_), Some(_)) => {
                Err("set only one of firstEventSecs and firstEventAtUnixSecs".into())
            }
            (_, Some(at)) => clock::unix_secs_to_system_time(at)
                .map(FireAt::AtTime)
                .ok_or_else(|| format!("firstEventAtUnixSecs {at} is not a usable time")),
            (Some(secs), None) => Duration::try_from_secs_f64(secs)
                .map(FireAt::After)
                .map_err(|e| format!("firstEventSecs {secs}: {e}")),
            (None, None) => Ok(FireAt::AtTime(SystemTime::now())),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.handler.trim().is_empty() {
            return Err("handler must not be empty".into());
        }
        self.first_fire()?;
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err("id must not be empty".into());
        }
        Ok(())
    }
}

/// Manifest entries that can be validated after decoding.
pub trait ManifestEntry: DeserializeOwned {
    /// Catalog name.
    fn handler_name(&self) -> &str;
    /// Check internal consistency.
    fn check(&self) -> std::result::Result<(), String>;
}

impl ManifestEntry for ActiveModuleSpec {
    fn handler_name(&self) -> &str {
        &self.handler
    }

    fn check(&self) -> std::result::Result<(), String> {
        self.validate()
    }
}

impl ManifestEntry for PassiveModuleSpec {
    fn handler_name(&self) -> &str {
        &self.handler
    }

    fn check(&self) -> std::result::Result<(), String> {
        self.validate()
    }
}

#[derive(Deserialize)]
struct RawManifest {
    modules: Vec<serde_json::Value>,
}

/// Decode a manifest, keeping entry order.
///
/// # Errors
///
/// The outer `Result` fails only when the document itself is malformed. Each
/// entry carries its own [`AssistantError::Config`] when it cannot be used.
pub fn parse_manifest<T: ManifestEntry>(input: &str) -> Result<Vec<Result<T>>> {
    let raw: RawManifest = serde_json::from_str(input)?;
    Ok(raw
        .modules
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let entry: T = serde_json::from_value(value)
                .map_err(|e| AssistantError::Config(format!("entry {index}: {e}")))?;
            entry.check().map_err(|e| {
                AssistantError::Config(format!("entry {index} ({}): {e}", entry.handler_name()))
            })?;
            Ok(entry)
        })
        .collect())
}
