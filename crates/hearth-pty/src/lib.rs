//! # Hearth PTY - Block Engine
//!
//! Turns free-form terminal output into a sequence of *blocks*, one per
//! submitted command, through a cooperative sentinel protocol with a
//! supervised bash:
//!
//! - [`spool`]: append-only, newline-normalized byte log with cursor reads
//! - [`waiter`]: pending match predicates over the spool (substring /
//!   regex / prompt), resolved as new bytes arrive
//! - [`sentinel`]: the `__FWS_*` marker line format
//! - [`rcfile`]: the generated bash rc that emits those markers
//! - [`blocks`]: the `blocks.jsonl` index and its query surface
//! - [`engine`]: the per-conversation state machine tying it together
//!
//! The engine consumes a [`ShellSupervisor`](hearth_core::ShellSupervisor)
//! and never spawns processes itself.

pub mod blocks;
pub mod engine;
mod error;
pub mod layout;
pub mod rcfile;
pub mod sentinel;
pub mod spool;
pub mod waiter;

pub use blocks::{BlockIndex, BlocksPage, SearchHit};
pub use engine::{ExecStarted, InteractiveStarted, PtyEngine, PtyManager, PtyMode, PtyStatus};
pub use error::{PtyError, Result};
pub use layout::AgentPtyLayout;
pub use sentinel::{parse_sentinel, Sentinel};
pub use spool::Spool;
pub use waiter::{MatchKind, MatchSpan, PromptExtra, WaitOutcome, WaitRequest, WaiterRegistry};
