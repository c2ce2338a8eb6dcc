//! Typed configuration store for plugdock
//!
//! Replaces ad-hoc dotted-path lookups with a schema of typed sections,
//! each carrying its own defaults. The store persists the known
//! environments, the active environment selection, mirror sources, and
//! process/dependency tuning knobs.

pub mod error;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use schema::{
    AppConfig, AppSection, DependenciesSection, EnvironmentRecord, EnvironmentsSection,
    MirrorSource, MirrorsSection, PluginRecord, PluginsSection, ProcessSection,
};
pub use store::ConfigStore;
