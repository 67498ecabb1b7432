//! # Hearth Core - Shared Types and Contracts
//!
//! Foundation crate for the Hearth orchestrator. Holds the vocabulary the
//! other crates speak to each other:
//!
//! - The internal broadcast event schema ([`UiEvent`]) and durable
//!   transcript rows ([`TranscriptRow`])
//! - Block records for PTY command framing ([`BlockRecord`])
//! - Extension manifests for ACP agents ([`manifest`])
//! - The consumed shell-supervisor contract and the event sink seam
//!   ([`traits`])
//!
//! Upward calls always go through the trait objects defined here; no crate
//! holds an owning back-pointer into another (routers hold an
//! `Arc<dyn EventSink>`, engines hold an `Arc<dyn ShellSupervisor>`).

pub mod block;
pub mod error;
pub mod events;
pub mod manifest;
pub mod traits;
pub mod util;

pub use block::{BlockRecord, BlockStatus};
pub use error::{CoreError, Result};
pub use events::{PlanStep, TranscriptEntry, TranscriptRow, TurnStatus, UiEvent};
pub use manifest::{AcpExtension, AgentLaunch, ExtensionEntry, ExtensionManifest, ExtensionsIndex};
pub use traits::{EventSink, OutputRx, PipeWriter, ShellId, ShellStatus, ShellSupervisor};
