//! Error types for the PTY block engine

use thiserror::Error;

/// Result type alias for PTY operations
pub type Result<T> = std::result::Result<T, PtyError>;

/// Errors that can occur while driving a PTY conversation
#[derive(Debug, Error)]
pub enum PtyError {
    /// Supervisor-level failures (spawn, missing shell, closed stdin)
    #[error(transparent)]
    Core(#[from] hearth_core::CoreError),

    /// IO errors (spool, block output files, index)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors while writing events or index rows
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid regex passed to `wait_for`
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A block is already running in this conversation
    #[error("PTY busy - block already running")]
    Busy,

    /// The conversation is in an interactive session
    #[error("PTY in interactive mode - use send instead")]
    InteractiveActive,

    /// `end_session` without an active interactive session
    #[error("No interactive session active")]
    NoInteractiveSession,

    /// `end_session` with an id that does not match the active session
    #[error("Session ID mismatch")]
    SessionMismatch,

    /// BEGIN sentinel not observed within the exec handshake window
    #[error("Timed out waiting for block to start")]
    BeginTimeout,

    /// Block id not present in the index
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Indexed block whose output file is missing on disk
    #[error("Block output missing: {0}")]
    OutputMissing(String),
}
