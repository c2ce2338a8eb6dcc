//! Error types for dock-config

use std::path::PathBuf;

/// Result type for dock-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dock-config operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {message}")]
    Serialize { message: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("No backup available at {path}")]
    NoBackup { path: PathBuf },

    #[error("Mirror source not found: {name}")]
    MirrorNotFound { name: String },

    #[error("Mirror source already exists: {name}")]
    MirrorExists { name: String },

    #[error(transparent)]
    Fs(#[from] dock_fs::Error),
}
