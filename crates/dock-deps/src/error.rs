//! Error types for dock-deps

use std::path::PathBuf;

/// Result type for dock-deps operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur collecting, resolving, or syncing dependencies
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid manifest at {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("No parseable version constraint for package '{package}'")]
    UnresolvableVersion { package: String },

    #[error("Environment '{name}' not found")]
    EnvironmentNotFound { name: String },

    #[error("Dependency sync for '{env}' failed: {message}")]
    SyncFailed { env: String, message: String },

    #[error("Dependency sync for '{env}' timed out after {seconds}s")]
    SyncTimeout { env: String, seconds: u64 },

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
