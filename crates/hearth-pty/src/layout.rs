//! On-disk layout of a conversation's `agent_pty/` directory

use std::path::{Path, PathBuf};

use hearth_core::util::sanitize_conversation_id;

/// Resolved paths under `<conversations>/<id>/agent_pty/`
#[derive(Debug, Clone)]
pub struct AgentPtyLayout {
    root: PathBuf,
}

impl AgentPtyLayout {
    /// `conversations_dir` is the base `conversations/` directory; the
    /// conversation id is sanitized before touching the filesystem.
    pub fn new(conversations_dir: &Path, conversation_id: &str) -> Self {
        let safe = sanitize_conversation_id(conversation_id);
        Self {
            root: conversations_dir.join(safe).join("agent_pty"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-block output files (`<seq>_<ts>.out`, `interactive_<ts>.out`)
    pub fn blocks_dir(&self) -> PathBuf {
        self.root.join("blocks")
    }

    /// One line per finished block
    pub fn index_path(&self) -> PathBuf {
        self.root.join("blocks.jsonl")
    }

    /// Block lifecycle events (begin/delta/end)
    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// Newline-normalized raw output bytes
    pub fn spool_path(&self) -> PathBuf {
        self.root.join("output.spool")
    }

    pub fn rcfile_path(&self) -> PathBuf {
        self.root.join("bashrc_agent_pty.sh")
    }

    /// Persisted byte offset for the transcript mirror tailer
    pub fn transcript_offset_path(&self) -> PathBuf {
        self.root.join(".transcript_offset")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_under_agent_pty() {
        let layout = AgentPtyLayout::new(Path::new("/base/conversations"), "c one");
        assert_eq!(
            layout.root(),
            Path::new("/base/conversations/c_one/agent_pty")
        );
        assert!(layout.index_path().ends_with("blocks.jsonl"));
        assert!(layout.spool_path().ends_with("output.spool"));
        assert!(layout.blocks_dir().ends_with("blocks"));
    }
}
