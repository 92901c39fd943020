//! Runtime adapters and process wiring.

pub mod assistant;
pub mod tokio_spawner;

pub use assistant::{Assistant, AssistantBuilder};
pub use tokio_spawner::{build_runtime, TokioSpawner};
