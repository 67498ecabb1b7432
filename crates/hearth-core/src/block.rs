//! Block records - one executed command in a PTY conversation
//!
//! A block is delimited by BEGIN/END sentinels on the shell side. The
//! engine creates a record on BEGIN, mutates it exactly once on END (or on
//! interactive-session end / shell EOF), and appends the finished record as
//! one line of `blocks.jsonl`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    /// BEGIN observed, END pending
    Running,
    /// END observed (or the session/shell ended); `exit_code` and `ts_end`
    /// are recorded
    Completed,
    /// Long-lived interactive session streaming under a synthetic block
    Interactive,
}

/// One executed command within a PTY conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// `"<conversation>:<seq>:<ts_begin>"` (or `"<conversation>:interactive:<ts>"`)
    pub block_id: String,
    pub conversation_id: String,
    /// Monotonic per conversation, >= 1; interactive blocks use 0
    pub seq: u64,
    /// Milliseconds since the epoch
    pub ts_begin: u64,
    pub ts_end: Option<u64>,
    pub cwd: String,
    pub cmd: String,
    pub status: BlockStatus,
    pub exit_code: Option<i32>,
    /// Per-block output file under `agent_pty/blocks/`
    pub output_path: Option<PathBuf>,
}

impl BlockRecord {
    /// Compose the canonical block id for a sequenced block.
    pub fn make_id(conversation_id: &str, seq: u64, ts_begin: u64) -> String {
        format!("{conversation_id}:{seq}:{ts_begin}")
    }

    /// Compose the synthetic id for an interactive block.
    pub fn make_interactive_id(conversation_id: &str, ts_begin: u64) -> String {
        format!("{conversation_id}:interactive:{ts_begin}")
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, BlockStatus::Running | BlockStatus::Interactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockRecord {
        BlockRecord {
            block_id: BlockRecord::make_id("c1", 1, 1000),
            conversation_id: "c1".to_string(),
            seq: 1,
            ts_begin: 1000,
            ts_end: None,
            cwd: "/tmp".to_string(),
            cmd: "echo hi".to_string(),
            status: BlockStatus::Running,
            exit_code: None,
            output_path: None,
        }
    }

    #[test]
    fn block_id_format() {
        assert_eq!(sample().block_id, "c1:1:1000");
        assert_eq!(BlockRecord::make_interactive_id("c1", 7), "c1:interactive:7");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["exit_code"], serde_json::Value::Null);
    }

    #[test]
    fn roundtrips_through_json() {
        let mut rec = sample();
        rec.status = BlockStatus::Completed;
        rec.exit_code = Some(0);
        rec.ts_end = Some(1200);
        let line = serde_json::to_string(&rec).unwrap();
        let back: BlockRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }
}
