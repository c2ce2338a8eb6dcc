//! Typed process lifecycle events
//!
//! The supervisor publishes these on an unbounded channel; the registry
//! (and anything else interested) consumes them. No re-entrant callback
//! chains.

/// Which pipe a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lifecycle events for supervised plugin processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The process is confirmed running
    Started { plugin: String },
    /// The process terminated. `abnormal` is set when the OS reports
    /// termination by signal/crash rather than a plain exit.
    Finished {
        plugin: String,
        exit_code: i32,
        abnormal: bool,
    },
    /// A genuine process failure (spawn rejection, escalated error)
    Errored { plugin: String, message: String },
    /// One line of process output
    Output {
        plugin: String,
        stream: OutputStream,
        chunk: String,
    },
}

/// Classify a terminated process as a normal or error exit.
///
/// The abnormal flag always wins. Exit code 0 is always normal. Other
/// codes are normal only when allow-listed; the list is empirically
/// observed per platform/tool, so it stays configurable.
pub fn is_normal_exit(exit_code: i32, abnormal: bool, allowed_codes: &[i32]) -> bool {
    if abnormal {
        return false;
    }
    exit_code == 0 || allowed_codes.contains(&exit_code)
}
