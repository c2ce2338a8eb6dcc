//! Error types for dock-envs

use std::path::PathBuf;

/// Result type for dock-envs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur managing environments
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Environment '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Environment '{name}' not found")]
    NotFound { name: String },

    #[error("No interpreter at {path}")]
    InterpreterMissing { path: PathBuf },

    #[error("Failed to create environment '{name}': {message}")]
    CreationFailed { name: String, message: String },

    #[error(transparent)]
    Pm(#[from] dock_pm::Error),

    #[error(transparent)]
    Fs(#[from] dock_fs::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
