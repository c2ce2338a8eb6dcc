//! Process supervision for plugdock plugins
//!
//! Each running plugin is one child OS process tracked in the
//! supervisor's table. Lifecycle transitions flow out as typed events on
//! a channel; asynchronous OS signals are reconciled against the table
//! so start/stop races never produce false failures.

pub mod error;
pub mod event;
pub mod signal;
pub mod supervisor;

pub use error::{Error, Result};
pub use event::{OutputStream, ProcessEvent, is_normal_exit};
pub use supervisor::{ManagedProcessInfo, ProcessSpec, ProcessSupervisor, SupervisorOptions};
