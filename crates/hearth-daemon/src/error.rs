//! Error types for the orchestration core

use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in the orchestration core
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] hearth_core::CoreError),

    #[error(transparent)]
    Pty(#[from] hearth_pty::PtyError),

    #[error(transparent)]
    Acp(#[from] hearth_acp::AcpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A conversation whose directory cannot be used is refused; other
    /// conversations are unaffected.
    #[error("Conversation unavailable: {0}")]
    ConversationUnavailable(String),
}
