//! Error types for orchestration components.

use thiserror::Error;

use super::capability::Capability;

/// Errors produced by the registry, router, scheduler and collaborators.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Malformed manifest, manifest entry, or settings value.
    #[error("config error: {0}")]
    Config(String),
    /// Declared capabilities disagree with the catalog or a collaborator is missing.
    #[error("capability mismatch for `{handler}`: {reason}")]
    CapabilityMismatch {
        /// Handler name from the manifest.
        handler: String,
        /// Human readable detail.
        reason: String,
    },
    /// A handler asked for a collaborator it never declared.
    #[error("capability {0:?} was not granted to this handler")]
    CapabilityNotGranted(Capability),
    /// The manifest names a handler the catalog does not know.
    #[error("unknown handler `{0}`")]
    UnknownHandler(String),
    /// A handler factory failed.
    #[error("failed to construct handler `{handler}`: {reason}")]
    HandlerConstruction {
        /// Handler name from the manifest.
        handler: String,
        /// Failure detail.
        reason: String,
    },
    /// A handler failed while parsing a command.
    #[error("handler `{handler}` faulted during dispatch: {reason}")]
    DispatchFault {
        /// Handler name from the manifest.
        handler: String,
        /// Failure detail.
        reason: String,
    },
    /// The scheduler control loop is no longer running.
    #[error("scheduler is shut down")]
    SchedulerClosed,
    /// A schedule request could not be honored.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// Filesystem failure (manifest loading).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON failure (manifest parsing).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for orchestration operations.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Application-facing result using anyhow for handler bodies.
pub type AppResult<T> = std::result::Result<T, anyhow::Error>;

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
