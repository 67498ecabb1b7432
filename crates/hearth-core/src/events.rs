//! Internal event schema and transcript rows
//!
//! Every provider (ACP agents, the PTY block engine, tailers) is normalized
//! into [`UiEvent`] before anything reaches a subscriber, and into
//! [`TranscriptRow`] before anything reaches `transcript.jsonl`. Both are
//! tagged enums so the on-disk and on-wire JSON carries a `type` / `role`
//! discriminator exactly as the UI expects.

use serde::{Deserialize, Serialize};

use crate::block::BlockRecord;
use crate::util::utc_ts;

/// Outcome classification attached to `turn_completed` and status rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Warning,
    Error,
}

impl TurnStatus {
    /// Derive the turn status from an ACP `stopReason`.
    pub fn from_stop_reason(stop_reason: &str) -> Self {
        match stop_reason {
            "end_turn" => TurnStatus::Success,
            "refusal" | "max_tokens" => TurnStatus::Error,
            _ => TurnStatus::Warning,
        }
    }
}

/// One step of an agent-reported plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub content: String,
    pub status: String,
    pub priority: String,
}

/// A broadcast event, serialized as `{"type": ..., "conversation_id": ..., ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    AssistantDelta {
        conversation_id: String,
        id: Option<String>,
        delta: String,
    },
    AssistantFinalize {
        conversation_id: String,
        text: String,
    },
    ReasoningDelta {
        conversation_id: String,
        id: Option<String>,
        delta: String,
    },
    ShellBegin {
        conversation_id: String,
        id: String,
        command: String,
        cwd: String,
    },
    ShellDelta {
        conversation_id: String,
        id: String,
        delta: String,
    },
    ShellEnd {
        conversation_id: String,
        id: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
        stdout: String,
        stderr: String,
        command: String,
    },
    Plan {
        conversation_id: String,
        steps: Vec<PlanStep>,
    },
    TurnStarted {
        conversation_id: String,
    },
    TurnCompleted {
        conversation_id: String,
        stop_reason: String,
        status: TurnStatus,
    },
    Activity {
        conversation_id: String,
        label: String,
        active: bool,
    },
    ApprovalRequest {
        conversation_id: String,
        /// JSON-RPC request id, echoed back in the response (number or string)
        request_id: serde_json::Value,
        tool_call_id: String,
        title: String,
        kind: String,
        options: serde_json::Value,
    },
    RpcError {
        conversation_id: String,
        message: String,
        code: i64,
    },
    Message {
        conversation_id: String,
        role: String,
        text: String,
    },
    Diff {
        conversation_id: String,
        id: String,
        text: String,
        path: Option<String>,
    },
    AgentBlockBegin {
        conversation_id: String,
        block: BlockRecord,
    },
    AgentBlockDelta {
        conversation_id: String,
        block_id: String,
        delta: String,
    },
    AgentBlockEnd {
        conversation_id: String,
        block: BlockRecord,
    },
}

impl UiEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            UiEvent::AssistantDelta { conversation_id, .. }
            | UiEvent::AssistantFinalize { conversation_id, .. }
            | UiEvent::ReasoningDelta { conversation_id, .. }
            | UiEvent::ShellBegin { conversation_id, .. }
            | UiEvent::ShellDelta { conversation_id, .. }
            | UiEvent::ShellEnd { conversation_id, .. }
            | UiEvent::Plan { conversation_id, .. }
            | UiEvent::TurnStarted { conversation_id }
            | UiEvent::TurnCompleted { conversation_id, .. }
            | UiEvent::Activity { conversation_id, .. }
            | UiEvent::ApprovalRequest { conversation_id, .. }
            | UiEvent::RpcError { conversation_id, .. }
            | UiEvent::Message { conversation_id, .. }
            | UiEvent::Diff { conversation_id, .. }
            | UiEvent::AgentBlockBegin { conversation_id, .. }
            | UiEvent::AgentBlockDelta { conversation_id, .. }
            | UiEvent::AgentBlockEnd { conversation_id, .. } => conversation_id,
        }
    }
}

/// One line of `transcript.jsonl`: a timestamp plus a role-tagged body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub ts: String,
    #[serde(flatten)]
    pub entry: TranscriptEntry,
}

impl TranscriptRow {
    pub fn new(entry: TranscriptEntry) -> Self {
        Self {
            ts: utc_ts(),
            entry,
        }
    }
}

/// Role-tagged transcript body, serialized as `{"role": ..., ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    Command {
        command: String,
        output: String,
        status: String,
    },
    Status {
        status: TurnStatus,
        stop_reason: String,
    },
    Diff {
        text: String,
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
    AgentPty {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block: Option<BlockRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
    },
}

impl TranscriptEntry {
    /// The role discriminator as written to disk.
    pub fn role(&self) -> &'static str {
        match self {
            TranscriptEntry::User { .. } => "user",
            TranscriptEntry::Assistant { .. } => "assistant",
            TranscriptEntry::Reasoning { .. } => "reasoning",
            TranscriptEntry::Command { .. } => "command",
            TranscriptEntry::Status { .. } => "status",
            TranscriptEntry::Diff { .. } => "diff",
            TranscriptEntry::AgentPty { .. } => "agent_pty",
        }
    }

    /// The dedup item id, if this row carries one.
    ///
    /// PTY mirror rows never carry one: many rows legitimately share a
    /// block id, and replay protection for them is the tailer's persisted
    /// offset.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            TranscriptEntry::User { item_id, .. }
            | TranscriptEntry::Assistant { item_id, .. }
            | TranscriptEntry::Reasoning { item_id, .. }
            | TranscriptEntry::Diff { item_id, .. } => item_id.as_deref(),
            _ => None,
        }
    }
}
