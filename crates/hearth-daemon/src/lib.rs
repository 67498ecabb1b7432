//! # Hearth Daemon - Orchestration Core
//!
//! Everything above the wire protocols: the conversation store on disk,
//! the deduplicating transcript writer, the broadcast hub live subscribers
//! attach to, the durable JSONL tailers that bridge the two, and the
//! [`Core`] value that wires every subsystem together.
//!
//! There is intentionally no process-wide mutable state; a `Core` is
//! constructed at startup and threaded through every caller.

pub mod core;
mod error;
pub mod hub;
pub mod store;
pub mod tailer;
pub mod transcript;

pub use crate::core::{Core, CoreConfig};
pub use error::{DaemonError, Result};
pub use hub::EventHub;
pub use store::{ConversationMeta, ConversationStatus, ConversationStore};
pub use tailer::{Tailers, TranscriptMirror};
pub use transcript::TranscriptWriter;
