//! Builders that turn manifests into handler modules.

pub mod catalog;
pub mod registry;

pub use catalog::{ActiveFactory, CatalogEntry, HandlerCatalog, ScheduledFactory};
pub use registry::{ActiveModule, ModuleRegistry, PassiveModule};
