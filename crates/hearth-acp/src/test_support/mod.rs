//! Test support: a scripted in-process ACP agent behind a fake supervisor
//! and a collecting event sink
//!
//! Used by this crate's integration tests and by downstream crates that
//! exercise the multiplexer without real agent processes.

pub mod mock_agent;
pub mod sink;

pub use mock_agent::{MockAgentConfig, MockAgentState, MockAgentSupervisor, PERMISSION_REQUEST_ID};
pub use sink::CollectingSink;
