//! # Hearth CLI
//!
//! Thin command-line harness over the daemon [`Core`]: execute blocks,
//! drive interactive sessions, query the block index, warm up and prompt
//! ACP agents, and tail the live event feed.
//!
//! [`Core`]: hearth_daemon::Core

pub mod cli;
pub mod commands;
