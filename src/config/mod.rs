//! Configuration models for settings and handler manifests.

pub mod manifest;
pub mod settings;

pub use manifest::{
    parse_manifest, ActiveModuleSpec, Connectivity, ManifestEntry, PassiveModuleSpec,
};
pub use settings::{AssistantConfig, ListenSettings, SchedulerSettings};
