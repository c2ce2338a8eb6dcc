//! Plugin registry and orchestration core for plugdock
//!
//! This crate wires the lower layers together:
//!
//! ```text
//!                  CLI / shell surface
//!                         |
//!                     dock-core
//!                         |
//!      +--------+---------+----------+-----------+
//!      |        |         |          |           |
//!  dock-fs dock-config dock-pm  dock-envs   dock-deps
//!                         |
//!                   dock-process
//! ```
//!
//! The `AppContext` is the single explicitly constructed owner of the
//! registry, supervisor, synchronizer, environment manager, and config
//! store. Lifecycle events flow in on channels and out as severity-
//! tagged notifications.

pub mod app;
pub mod descriptor;
pub mod error;
pub mod notify;
pub mod registry;

pub use app::AppContext;
pub use descriptor::{PluginDescriptor, PluginStatus};
pub use error::{Error, Result};
pub use notify::{Notification, Notifier, Severity};
pub use registry::{PluginRegistry, scan_plugins};
