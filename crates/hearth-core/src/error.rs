//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur at the supervisor and event-sink seams
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO errors (pipe writes, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A shell id that is unknown or whose process has exited
    #[error("Shell not available: {0}")]
    ShellUnavailable(String),

    /// Spawn failures
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Invalid manifest or configuration data
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}
