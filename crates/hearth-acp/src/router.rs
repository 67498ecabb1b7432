//! ACP event router: agent updates in, internal events out
//!
//! One router per conversation. It consumes parsed JSON-RPC messages from
//! the agent process, answers agent-initiated requests, and emits
//! normalized [`UiEvent`]s plus transcript rows through the [`EventSink`].
//!
//! Ordering within a turn is fixed: reasoning finalizes before the
//! assistant message (ACP produces thoughts first), then `turn_completed`,
//! then exactly one `activity { active: false }`, then the status row.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use hearth_core::{EventSink, PipeWriter, PlanStep, TranscriptEntry, TurnStatus, UiEvent};

use crate::debug::{RawDirection, RawRing};
use crate::diff::{diff_signature, extract_diff_with_path};
use crate::handlers::{FsHandler, TerminalStubs};
use crate::wire::{self, Incoming};

#[derive(Debug, Default, Clone)]
struct ToolCallState {
    title: String,
    #[allow(dead_code)]
    kind: String,
    status: String,
}

#[derive(Default)]
struct TurnState {
    turn_counter: u64,
    current_turn_id: Option<String>,
    message_text: String,
    thought_text: String,
    tool_calls: HashMap<String, ToolCallState>,
    diff_hashes: HashSet<String>,
    plan_steps: Vec<PlanStep>,
}

/// Per-conversation translator between ACP and the internal event schema
pub struct EventRouter {
    conversation_id: String,
    sink: Arc<dyn EventSink>,
    /// Serialized stdin of the shared agent process, for responses to
    /// agent-initiated requests. Absent in some tests.
    writer: Option<PipeWriter>,
    ring: Arc<RawRing>,
    fs: FsHandler,
    terminals: TerminalStubs,
    state: Mutex<TurnState>,
}

impl EventRouter {
    pub fn new(
        conversation_id: impl Into<String>,
        sink: Arc<dyn EventSink>,
        writer: Option<PipeWriter>,
        ring: Arc<RawRing>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sink,
            writer,
            ring,
            fs: FsHandler,
            terminals: TerminalStubs,
            state: Mutex::new(TurnState::default()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Called by the session before `session/prompt` goes out: records the
    /// user message and opens the turn.
    pub async fn on_turn_start(&self, text: &str) {
        {
            let mut state = self.state.lock().await;
            state.turn_counter += 1;
            state.current_turn_id = Some(format!("turn_{}", state.turn_counter));
            state.message_text.clear();
            state.thought_text.clear();
            state.tool_calls.clear();
            state.diff_hashes.clear();
            state.plan_steps.clear();
        }
        self.sink
            .broadcast(UiEvent::Message {
                conversation_id: self.conversation_id.clone(),
                role: "user".to_string(),
                text: text.to_string(),
            })
            .await;
        self.sink
            .broadcast(UiEvent::TurnStarted {
                conversation_id: self.conversation_id.clone(),
            })
            .await;
        self.sink
            .broadcast(UiEvent::Activity {
                conversation_id: self.conversation_id.clone(),
                label: "thinking".to_string(),
                active: true,
            })
            .await;
        self.sink
            .append_transcript(
                &self.conversation_id,
                TranscriptEntry::User {
                    text: text.to_string(),
                    item_id: None,
                    event: None,
                },
            )
            .await;
    }

    /// Route an incoming request or notification. Responses are correlated
    /// by the session reader and delivered through
    /// [`on_prompt_response`](Self::on_prompt_response) /
    /// [`on_rpc_error`](Self::on_rpc_error) instead.
    pub async fn route(&self, incoming: &Incoming) {
        match incoming {
            Incoming::Request { id, method, params } => {
                self.handle_request(id, method, params).await;
            }
            Incoming::Notification { method, params } => {
                if method == "session/update" {
                    self.handle_session_update(params).await;
                } else {
                    tracing::debug!(method, "ignoring notification");
                }
            }
            Incoming::Response { .. } => {
                tracing::debug!("response reached route(); correlation belongs to the session reader");
            }
        }
    }

    async fn handle_request(&self, id: &Value, method: &str, params: &Value) {
        let response = match method {
            "session/request_permission" => {
                Some(self.handle_request_permission(id, params).await)
            }
            "fs/read_text_file" => Some(self.fs.read_text_file(id, params).await),
            "fs/write_text_file" => Some(self.fs.write_text_file(id, params).await),
            method => match self.terminals.handle(method, id, params) {
                Some(response) => Some(response),
                None => {
                    tracing::warn!(method, "unhandled agent request");
                    Some(wire::error_response(id, -32601, "Method not found"))
                }
            },
        };
        if let Some(response) = response {
            self.write_response(&response).await;
        }
    }

    /// Auto-approve while broadcasting the decision flow so a UI can
    /// observe it. A deployment that queues on a user decision replaces
    /// this policy, not the routing.
    async fn handle_request_permission(&self, id: &Value, params: &Value) -> Value {
        let tool_call = params.get("toolCall").cloned().unwrap_or_default();
        let tool_call_id = tool_call
            .get("toolCallId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let title = tool_call
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Tool Call")
            .to_string();
        let kind = tool_call
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("other")
            .to_string();
        tracing::info!(
            conversation = %self.conversation_id,
            request_id = %id,
            %title,
            "permission requested"
        );
        self.sink
            .broadcast(UiEvent::ApprovalRequest {
                conversation_id: self.conversation_id.clone(),
                request_id: id.clone(),
                tool_call_id,
                title,
                kind,
                options: params.get("options").cloned().unwrap_or(json!([])),
            })
            .await;
        wire::result_response(id, json!({"outcome": "approved"}))
    }

    async fn handle_session_update(&self, params: &Value) {
        let update = params.get("update").cloned().unwrap_or(Value::Null);
        let update_type = update
            .get("sessionUpdate")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match update_type {
            "agent_message_chunk" => self.handle_message_chunk(&update).await,
            "agent_thought_chunk" => self.handle_thought_chunk(&update).await,
            "tool_call" => self.handle_tool_call_start(&update).await,
            "tool_call_update" => self.handle_tool_call_update(&update).await,
            "plan" => self.handle_plan(&update).await,
            // Echo of the user message and agent chrome we do not surface.
            "user_message_chunk" | "available_commands_update" | "current_mode_update" => {}
            other => tracing::debug!(update_type = other, "unhandled session update"),
        }
    }

    fn chunk_text(update: &Value) -> Option<String> {
        let content = update.get("content")?;
        if content.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }
        let text = content.get("text").and_then(Value::as_str)?;
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    async fn handle_message_chunk(&self, update: &Value) {
        let Some(text) = Self::chunk_text(update) else {
            return;
        };
        let turn_id = {
            let mut state = self.state.lock().await;
            state.message_text.push_str(&text);
            state.current_turn_id.clone()
        };
        self.sink
            .broadcast(UiEvent::AssistantDelta {
                conversation_id: self.conversation_id.clone(),
                id: turn_id,
                delta: text,
            })
            .await;
    }

    async fn handle_thought_chunk(&self, update: &Value) {
        let Some(text) = Self::chunk_text(update) else {
            return;
        };
        let turn_id = {
            let mut state = self.state.lock().await;
            state.thought_text.push_str(&text);
            state.current_turn_id.clone()
        };
        self.sink
            .broadcast(UiEvent::ReasoningDelta {
                conversation_id: self.conversation_id.clone(),
                id: turn_id,
                delta: text,
            })
            .await;
    }

    async fn handle_tool_call_start(&self, update: &Value) {
        let tool_call_id = update
            .get("toolCallId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let title = update
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Tool Call")
            .to_string();
        let kind = update
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("other")
            .to_string();
        let status = update
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string();
        {
            let mut state = self.state.lock().await;
            state.tool_calls.insert(
                tool_call_id.clone(),
                ToolCallState {
                    title: title.clone(),
                    kind,
                    status,
                },
            );
        }
        self.sink
            .broadcast(UiEvent::ShellBegin {
                conversation_id: self.conversation_id.clone(),
                id: tool_call_id,
                command: title,
                cwd: String::new(),
            })
            .await;
        self.emit_diffs(update).await;
    }

    async fn handle_tool_call_update(&self, update: &Value) {
        let tool_call_id = update
            .get("toolCallId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = update
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text_content = collect_text_content(update.get("content"));

        let title = {
            let mut state = self.state.lock().await;
            match state.tool_calls.get_mut(&tool_call_id) {
                Some(tool) => {
                    tool.status = status.clone();
                    tool.title.clone()
                }
                None => String::new(),
            }
        };

        match status.as_str() {
            "in_progress" => {
                if !text_content.is_empty() {
                    self.sink
                        .broadcast(UiEvent::ShellDelta {
                            conversation_id: self.conversation_id.clone(),
                            id: tool_call_id.clone(),
                            delta: text_content.clone(),
                        })
                        .await;
                }
            }
            "completed" => {
                self.sink
                    .broadcast(UiEvent::ShellEnd {
                        conversation_id: self.conversation_id.clone(),
                        id: tool_call_id.clone(),
                        exit_code: 0,
                        stdout: text_content.clone(),
                        stderr: String::new(),
                        command: title.clone(),
                    })
                    .await;
                self.sink
                    .append_transcript(
                        &self.conversation_id,
                        TranscriptEntry::Command {
                            command: title.clone(),
                            output: text_content.clone(),
                            status: "completed".to_string(),
                        },
                    )
                    .await;
            }
            "failed" => {
                self.sink
                    .broadcast(UiEvent::ShellEnd {
                        conversation_id: self.conversation_id.clone(),
                        id: tool_call_id.clone(),
                        exit_code: 1,
                        stdout: String::new(),
                        stderr: text_content.clone(),
                        command: title.clone(),
                    })
                    .await;
                self.sink
                    .append_transcript(
                        &self.conversation_id,
                        TranscriptEntry::Command {
                            command: title.clone(),
                            output: text_content.clone(),
                            status: "failed".to_string(),
                        },
                    )
                    .await;
            }
            _ => {}
        }
        self.emit_diffs(update).await;
    }

    async fn handle_plan(&self, update: &Value) {
        let steps: Vec<PlanStep> = update
            .get("entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| PlanStep {
                        content: entry
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        status: entry
                            .get("status")
                            .and_then(Value::as_str)
                            .unwrap_or("pending")
                            .to_string(),
                        priority: entry
                            .get("priority")
                            .and_then(Value::as_str)
                            .unwrap_or("medium")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.state.lock().await.plan_steps = steps.clone();
        self.sink
            .broadcast(UiEvent::Plan {
                conversation_id: self.conversation_id.clone(),
                steps,
            })
            .await;
    }

    /// Emit a `diff` event for any diff in the payload, once per distinct
    /// signature per turn.
    async fn emit_diffs(&self, payload: &Value) {
        let Some((diff_text, path)) = extract_diff_with_path(payload) else {
            return;
        };
        let diff_text = diff_text.trim().to_string();
        if diff_text.is_empty() {
            return;
        }
        let signature = diff_signature(&diff_text);
        let diff_id = {
            let mut state = self.state.lock().await;
            if !state.diff_hashes.insert(signature.clone()) {
                return;
            }
            let turn = state.current_turn_id.as_deref().unwrap_or("unknown");
            format!("{}:{}:{}", self.conversation_id, turn, &signature[..12])
        };
        self.sink
            .broadcast(UiEvent::Diff {
                conversation_id: self.conversation_id.clone(),
                id: diff_id.clone(),
                text: diff_text.clone(),
                path: path.clone(),
            })
            .await;
        self.sink
            .append_transcript(
                &self.conversation_id,
                TranscriptEntry::Diff {
                    text: diff_text,
                    path,
                    item_id: Some(diff_id),
                    event: Some("turn_diff".to_string()),
                },
            )
            .await;
    }

    /// Finalize the turn from a `session/prompt` response.
    pub async fn on_prompt_response(&self, result: &Value) {
        let stop_reason = result
            .get("stopReason")
            .and_then(Value::as_str)
            .unwrap_or("end_turn")
            .to_string();

        let (turn_id, thought, message) = {
            let mut state = self.state.lock().await;
            let turn_id = state.current_turn_id.clone();
            let thought = std::mem::take(&mut state.thought_text);
            let message = std::mem::take(&mut state.message_text);
            (turn_id, thought, message)
        };

        // Reasoning first: it happened before the message in the ACP flow.
        if !thought.is_empty() {
            self.sink
                .append_transcript(
                    &self.conversation_id,
                    TranscriptEntry::Reasoning {
                        text: thought,
                        item_id: turn_id.as_ref().map(|t| format!("{t}:reasoning")),
                    },
                )
                .await;
        }
        if !message.is_empty() {
            self.sink
                .broadcast(UiEvent::AssistantFinalize {
                    conversation_id: self.conversation_id.clone(),
                    text: message.clone(),
                })
                .await;
            self.sink
                .append_transcript(
                    &self.conversation_id,
                    TranscriptEntry::Assistant {
                        text: message,
                        item_id: turn_id.as_ref().map(|t| format!("{t}:assistant")),
                        event: None,
                    },
                )
                .await;
        }

        let status = TurnStatus::from_stop_reason(&stop_reason);
        self.sink
            .broadcast(UiEvent::TurnCompleted {
                conversation_id: self.conversation_id.clone(),
                stop_reason: stop_reason.clone(),
                status,
            })
            .await;
        self.sink
            .broadcast(UiEvent::Activity {
                conversation_id: self.conversation_id.clone(),
                label: "idle".to_string(),
                active: false,
            })
            .await;
        self.sink
            .append_transcript(
                &self.conversation_id,
                TranscriptEntry::Status {
                    status,
                    stop_reason,
                },
            )
            .await;
    }

    /// Surface a JSON-RPC error response from the agent.
    pub async fn on_rpc_error(&self, error: &Value) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        self.sink
            .broadcast(UiEvent::RpcError {
                conversation_id: self.conversation_id.clone(),
                message: message.clone(),
                code,
            })
            .await;
        self.sink
            .broadcast(UiEvent::Activity {
                conversation_id: self.conversation_id.clone(),
                label: message,
                active: true,
            })
            .await;
    }

    async fn write_response(&self, response: &Value) {
        let Some(writer) = &self.writer else {
            tracing::warn!(
                conversation = %self.conversation_id,
                "no writer attached; dropping response to agent request"
            );
            return;
        };
        match serde_json::to_string(response) {
            Ok(line) => {
                self.ring
                    .push(RawDirection::Out, &self.conversation_id, &line);
                if let Err(e) = writer.write_line(&line).await {
                    tracing::warn!(conversation = %self.conversation_id, error = %e, "response write failed");
                }
            }
            Err(e) => {
                tracing::warn!(conversation = %self.conversation_id, error = %e, "response serialize failed");
            }
        }
    }
}

/// Flatten `content: [{content: {type: "text", text}}]` arrays into text.
fn collect_text_content(content: Option<&Value>) -> String {
    let mut out = String::new();
    if let Some(items) = content.and_then(Value::as_array) {
        for item in items {
            if let Some(inner) = item.get("content") {
                if inner.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = inner.get("text").and_then(Value::as_str) {
                        out.push_str(text);
                    }
                }
            }
        }
    }
    out
}
