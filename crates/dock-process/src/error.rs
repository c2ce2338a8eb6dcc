//! Error types for dock-process

/// Result type for dock-process operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur supervising plugin processes
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS rejected the spawn outright. Propagated immediately, no retry.
    #[error("Failed to spawn process for plugin '{plugin}': {message}")]
    SpawnFailed { plugin: String, message: String },
}
