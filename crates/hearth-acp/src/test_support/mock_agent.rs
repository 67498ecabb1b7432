//! Scripted in-process ACP agent behind a fake supervisor
//!
//! The supervisor hands out pipe shells whose stdin feeds a scripted agent
//! task and whose output channel carries the agent's JSON-RPC lines, so
//! the whole multiplexer stack runs without real processes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
use tokio::sync::broadcast;

use hearth_core::{
    CoreError, OutputRx, PipeWriter, Result as CoreResult, ShellId, ShellStatus, ShellSupervisor,
};

/// Fixed id the mock uses for its permission request
pub const PERMISSION_REQUEST_ID: i64 = 4242;

/// Behavior profile for the scripted agent
#[derive(Debug, Clone)]
pub struct MockAgentConfig {
    pub emit_thought: bool,
    pub message_chunks: Vec<String>,
    pub request_permission: bool,
    pub stop_reason: String,
    /// Delay before answering `initialize` (warmup-timeout tests)
    pub init_delay: Duration,
}

impl Default for MockAgentConfig {
    fn default() -> Self {
        Self {
            emit_thought: true,
            message_chunks: vec!["Hello".to_string(), " world".to_string()],
            request_permission: false,
            stop_reason: "end_turn".to_string(),
            init_delay: Duration::ZERO,
        }
    }
}

/// Observable side of the scripted agent
#[derive(Default)]
pub struct MockAgentState {
    pub prompts: StdMutex<Vec<Value>>,
    pub permission_responses: StdMutex<Vec<Value>>,
    session_counter: AtomicU64,
}

/// Supervisor whose pipe shells are scripted agents
pub struct MockAgentSupervisor {
    config: MockAgentConfig,
    pub state: Arc<MockAgentState>,
    shells: StdMutex<HashMap<ShellId, (broadcast::Sender<Vec<u8>>, PipeWriter)>>,
    next_id: AtomicU64,
    pub spawn_count: AtomicU64,
}

impl MockAgentSupervisor {
    pub fn new(config: MockAgentConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Arc::new(MockAgentState::default()),
            shells: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            spawn_count: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl ShellSupervisor for MockAgentSupervisor {
    async fn spawn_pty(
        &self,
        _argv: &[String],
        _cwd: Option<&Path>,
        _label: &str,
    ) -> CoreResult<ShellId> {
        Err(CoreError::Spawn("mock supervisor is pipe-only".into()))
    }

    async fn spawn_pipe(
        &self,
        _argv: &[String],
        _cwd: Option<&Path>,
        _env: &HashMap<String, String>,
        _label: &str,
    ) -> CoreResult<ShellId> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let (tx, _) = broadcast::channel(256);
        tokio::spawn(run_agent(
            server_end,
            tx.clone(),
            self.config.clone(),
            self.state.clone(),
        ));
        self.shells
            .lock()
            .unwrap()
            .insert(id.clone(), (tx, PipeWriter::new(Box::new(client_end))));
        Ok(id)
    }

    async fn write_to_pty(&self, shell_id: &str, _data: &[u8]) -> CoreResult<()> {
        Err(CoreError::ShellUnavailable(shell_id.to_string()))
    }

    fn subscribe_output(&self, shell_id: &str) -> CoreResult<OutputRx> {
        self.shells
            .lock()
            .unwrap()
            .get(shell_id)
            .map(|(tx, _)| tx.subscribe())
            .ok_or_else(|| CoreError::ShellUnavailable(shell_id.to_string()))
    }

    fn get_pipe_state(&self, shell_id: &str) -> CoreResult<PipeWriter> {
        self.shells
            .lock()
            .unwrap()
            .get(shell_id)
            .map(|(_, writer)| writer.clone())
            .ok_or_else(|| CoreError::ShellUnavailable(shell_id.to_string()))
    }

    async fn terminate_shell(&self, _shell_id: &str, _force: bool) -> CoreResult<()> {
        Ok(())
    }

    fn find_shell_by_label(&self, _label: &str, _status: ShellStatus) -> Option<ShellId> {
        None
    }
}

fn send(out: &broadcast::Sender<Vec<u8>>, message: &Value) {
    let mut line = message.to_string();
    line.push('\n');
    let _ = out.send(line.into_bytes());
}

async fn run_agent(
    server_end: DuplexStream,
    out: broadcast::Sender<Vec<u8>>,
    config: MockAgentConfig,
    state: Arc<MockAgentState>,
) {
    let mut lines = BufReader::new(server_end).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        match msg.get("method").and_then(Value::as_str) {
            Some("initialize") => {
                if !config.init_delay.is_zero() {
                    tokio::time::sleep(config.init_delay).await;
                }
                send(
                    &out,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "protocolVersion": 1,
                            "agentCapabilities": {},
                            "agentInfo": {"name": "mock-agent", "version": "1.0.0"}
                        }
                    }),
                );
            }
            Some("session/new") => {
                let n = state.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
                send(
                    &out,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"sessionId": format!("mock-session-{n}")}
                    }),
                );
            }
            Some("session/prompt") => {
                state.prompts.lock().unwrap().push(msg.clone());
                let session_id = msg["params"]["sessionId"].clone();
                if config.emit_thought {
                    send(
                        &out,
                        &json!({
                            "jsonrpc": "2.0",
                            "method": "session/update",
                            "params": {
                                "sessionId": session_id,
                                "update": {
                                    "sessionUpdate": "agent_thought_chunk",
                                    "content": {"type": "text", "text": "Let me think."}
                                }
                            }
                        }),
                    );
                }
                for chunk in &config.message_chunks {
                    send(
                        &out,
                        &json!({
                            "jsonrpc": "2.0",
                            "method": "session/update",
                            "params": {
                                "sessionId": session_id,
                                "update": {
                                    "sessionUpdate": "agent_message_chunk",
                                    "content": {"type": "text", "text": chunk}
                                }
                            }
                        }),
                    );
                }
                if config.request_permission {
                    send(
                        &out,
                        &json!({
                            "jsonrpc": "2.0",
                            "id": PERMISSION_REQUEST_ID,
                            "method": "session/request_permission",
                            "params": {
                                "sessionId": session_id,
                                "toolCall": {
                                    "toolCallId": "tc-perm",
                                    "title": "rm -rf",
                                    "kind": "shell"
                                },
                                "options": [{"optionId": "allow", "name": "Allow"}]
                            }
                        }),
                    );
                    // Block until the client answers the permission request.
                    while let Ok(Some(reply)) = lines.next_line().await {
                        if let Ok(parsed) = serde_json::from_str::<Value>(&reply) {
                            if parsed.get("id") == Some(&json!(PERMISSION_REQUEST_ID)) {
                                state.permission_responses.lock().unwrap().push(parsed);
                                break;
                            }
                        }
                    }
                }
                send(
                    &out,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"stopReason": config.stop_reason}
                    }),
                );
            }
            Some("session/cancel") => {
                // Notification; nothing to answer.
            }
            Some(_) => {
                send(
                    &out,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32601, "message": "Method not found"}
                    }),
                );
            }
            None => {
                // A client response outside the permission window; ignore.
            }
        }
    }
}
