//! Error types for dock-core

use std::path::PathBuf;

/// Result type for dock-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the orchestration core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    #[error("Plugin entry point missing: {path}")]
    EntryPointMissing { path: PathBuf },

    #[error("Unsupported entry point '{entry}': only Python scripts are runnable")]
    UnsupportedEntryPoint { entry: String },

    #[error("Failed to uninstall '{name}': {message}")]
    UninstallFailed { name: String, message: String },

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Config(#[from] dock_config::Error),

    #[error(transparent)]
    Deps(#[from] dock_deps::Error),

    #[error(transparent)]
    Envs(#[from] dock_envs::Error),

    #[error(transparent)]
    Process(#[from] dock_process::Error),

    #[error(transparent)]
    Fs(#[from] dock_fs::Error),
}
