//! Error types for dock-pm

/// Result type for dock-pm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the external package manager
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{tool} not found on PATH")]
    ToolNotFound { tool: String },

    #[error("{command} failed with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Could not parse {command} output: {message}")]
    OutputParse { command: String, message: String },
}
