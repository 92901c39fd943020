//! Built-in handlers shipped with the catalog.

pub mod alarm;
pub mod status_poll;
pub mod timer;

pub use alarm::{AlarmAlert, AlarmPayload};
pub use status_poll::{StatusPoll, StatusPollPayload};
pub use timer::{TimerAlert, TimerCommands, TimerPayload};

/// Words read as "yes" when a handler asks for confirmation.
pub const CONFIRMATION_WORDS: &[&str] = &[
    "sure",
    "yep",
    "go ahead",
    "okay",
    "yeah",
    "affirm",
    "that's it",
    "ok",
    "yes",
    "go for it",
];
