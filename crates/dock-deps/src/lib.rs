//! Dependency resolution and environment synchronization for plugdock
//!
//! Constraints flow in from independently authored plugin manifests, get
//! negotiated down to one specifier per package, and are pushed into the
//! shared environment through a crash-safe sync protocol driven by the
//! external package manager.

pub mod collector;
pub mod constraint;
pub mod error;
pub mod event;
pub mod manifest;
pub mod resolver;
pub mod sync;

pub use collector::DependencyCollector;
pub use constraint::DependencyConstraint;
pub use error::{Error, Result};
pub use event::DependencyEvent;
pub use manifest::{MANIFEST_FILE, PluginManifest, PluginMetadata, environment_manifest};
pub use resolver::{SpecifierSet, VersionTriple, is_compatible, resolve};
pub use sync::DependencySynchronizer;
