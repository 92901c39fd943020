//! # Voice Orchestrator
//!
//! The orchestration core of a voice assistant: what happens between "the
//! recognizer produced some text" and "a handler did something about it", and
//! how time-triggered work shares the one microphone with everything else.
//!
//! ## Pieces
//!
//! - **`CommandRouter`**: splits an utterance on split keywords and offers each
//!   sub-phrase to the active handlers in manifest order. The first handler
//!   returning `true` claims it. Stop phrases short-circuit everything.
//! - **`EventScheduler`**: a tick-driven control loop owning one ordered event
//!   table. Due events fire on detached tasks; a firing handler posts at most
//!   one `Requeue`/`Dispose` to its mailbox, and posting nothing disposes.
//! - **`ExclusiveResourceGate`**: strict FIFO ticket gate in front of the
//!   microphone, released by an RAII guard.
//! - **`ModuleRegistry`**: builds handlers from JSON manifests through a static
//!   `HandlerCatalog`, granting each handler exactly the collaborators it
//!   declared. Bad entries are disabled, never fatal.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voice_orchestrator::config::AssistantConfig;
//! use voice_orchestrator::infra::{ChannelRecognizer, ConsoleVoiceOutput};
//! use voice_orchestrator::runtime::AssistantBuilder;
//!
//! let (recognizer, lines) = ChannelRecognizer::channel(16);
//! let assistant = AssistantBuilder::new(
//!     AssistantConfig::from_env()?,
//!     Arc::new(ConsoleVoiceOutput),
//!     Arc::new(recognizer),
//! )
//! .build()
//! .await?;
//!
//! lines.send("set a timer for five minutes".into()).await?;
//! assistant.run().await;
//! assistant.shutdown().await;
//! ```
//!
//! See `tests/scenarios_test.rs` for end-to-end flows.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core orchestration: handler protocol, router, scheduler and the voice gate.
pub mod core;
/// Configuration models for settings and handler manifests.
pub mod config;
/// Builders that turn manifests into handler modules.
pub mod builders;
/// Built-in handlers.
pub mod handlers;
/// Collaborator adapters for voice I/O and server status.
pub mod infra;
/// Runtime adapters and process wiring.
pub mod runtime;
/// Shared utilities.
pub mod util;
