//! Error types for ACP integration

use thiserror::Error;

/// Result type alias for ACP operations
pub type Result<T> = std::result::Result<T, AcpError>;

/// Errors that can occur during ACP operations
#[derive(Debug, Error)]
pub enum AcpError {
    /// Supervisor-level failures (spawn, missing shell, closed stdin)
    #[error(transparent)]
    Core(#[from] hearth_core::CoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown extension id
    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    /// No session bound to this conversation
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but has not completed session/new yet
    #[error("Session not ready: {0}")]
    SessionNotReady(String),

    /// Warmup or handshake timeout; the underlying process is left running
    #[error("Timed out: {0}")]
    Timeout(String),
}
