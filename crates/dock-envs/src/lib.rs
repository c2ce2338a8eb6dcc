//! Managed virtual environments for plugdock
//!
//! Environments are shared substrate: many plugins run against one
//! environment, and exactly one environment is active at a time. The
//! config store is the source of truth for the known set across
//! restarts; this crate produces the live descriptors.

pub mod descriptor;
pub mod error;
pub mod layout;
pub mod manager;

pub use descriptor::EnvironmentDescriptor;
pub use error::{Error, Result};
pub use layout::{interpreter_path, seed_manifest};
pub use manager::EnvironmentManager;
