//! Collaborator adapters: console and in-memory voice I/O, recognizers, and
//! server status.

pub mod gated_input;
pub mod recognizer;
pub mod status;
pub mod voice;

pub use gated_input::GatedVoiceInput;
pub use recognizer::{ChannelRecognizer, Recognizer, ScriptedRecognizer};
pub use status::StaticServerStatus;
pub use voice::{ConsoleVoiceOutput, RecordingVoiceOutput, Transcript};
