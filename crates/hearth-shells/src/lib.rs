//! # Hearth Shells - Local Process Supervisor
//!
//! In-process implementation of the [`ShellSupervisor`] contract from
//! `hearth-core`. Two backends:
//!
//! - **PTY** ([`pty_backend`]): the child runs attached to a pseudo
//!   terminal (portable-pty); a blocking reader thread fans output chunks
//!   into an async broadcast channel.
//! - **Pipe** ([`pipe_backend`]): the child runs with piped stdin/stdout
//!   (tokio::process); used for ACP agents speaking JSON-RPC over stdio.
//!
//! The supervisor keeps a registry of shells keyed by id, supports
//! label-based re-attach, and terminates children with SIGTERM-then-SIGKILL
//! semantics.
//!
//! [`ShellSupervisor`]: hearth_core::ShellSupervisor

mod pipe_backend;
mod pty_backend;
mod supervisor;

pub use supervisor::LocalSupervisor;

/// Capacity of each shell's output broadcast channel, in chunks.
///
/// A lagging subscriber loses the oldest chunks; durable history lives in
/// the spool, not here.
pub(crate) const OUTPUT_CHANNEL_CAPACITY: usize = 1024;
