//! External package-manager integration for plugdock
//!
//! Defines the `PackageManager` trait the rest of the system programs
//! against, and the `UvCli` implementation that shells out to uv with
//! bounded timeouts. A timeout is always reported as a failure, never
//! swallowed.

pub mod error;
pub mod manager;
pub mod uv;

pub use error::{Error, Result};
pub use manager::{InstalledPackage, PackageManager, SyncInvocation};
pub use uv::UvCli;
