//! Per-conversation PTY block engine
//!
//! One [`PtyEngine`] per conversation owns the supervised shell, the spool,
//! the waiter registry and the block index, and lifts raw output chunks
//! into structured blocks:
//!
//! ```text
//! idle --exec--> block_running --END--> idle
//! idle --exec_interactive--> interactive --(end_session|PROMPT)--> idle
//! ```
//!
//! Raw chunks are (i) appended to the spool, (ii) fanned to raw
//! subscribers, (iii) mirrored into the active block's output file, and
//! (iv) emitted as `agent_block_delta` events. Sentinel lines are consumed
//! by the state machine and never reach the block output file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;

use hearth_core::util::now_ms;
use hearth_core::{BlockRecord, BlockStatus, ShellId, ShellStatus, ShellSupervisor, UiEvent};

use crate::blocks::BlockIndex;
use crate::error::{PtyError, Result};
use crate::layout::AgentPtyLayout;
use crate::rcfile::{manual_shell_argv, wrap_block_command, write_rcfile};
use crate::sentinel::{parse_sentinel, Sentinel};
use crate::spool::{Spool, DEFAULT_READ_MAX, READ_HARD_CAP};
use crate::waiter::{Matcher, WaitOutcome, WaitRequest, WaiterRegistry};

/// How long exec waits for the BEGIN sentinel before giving up (the shell
/// stays alive either way).
const BEGIN_TIMEOUT: Duration = Duration::from_secs(3);
/// Capacity of the raw-chunk fan-out channel.
const RAW_CHANNEL_CAPACITY: usize = 1024;

/// Conversation execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtyMode {
    Idle,
    BlockRunning,
    Interactive,
}

/// Result of a block-mode exec handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecStarted {
    pub block_id: String,
    pub seq: u64,
    pub ts: u64,
}

/// Result of starting an interactive session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveStarted {
    pub session_id: String,
    pub block_id: String,
    pub ts_begin: u64,
    /// Spool cursor to `wait_for` from
    pub cursor: u64,
}

/// Snapshot of the conversation's PTY state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtyStatus {
    pub mode: PtyMode,
    pub active_block_id: Option<String>,
    pub active_session_id: Option<String>,
    pub shell_id: Option<ShellId>,
    pub spool_cursor: u64,
}

struct EngineState {
    shell_id: Option<ShellId>,
    reader: Option<JoinHandle<()>>,
    buffer: String,
    mode: PtyMode,
    active: Option<BlockRecord>,
    begin_tx: Option<oneshot::Sender<BlockRecord>>,
    interactive_session_id: Option<String>,
}

/// Per-conversation engine over a supervised interactive bash
pub struct PtyEngine {
    conversation_id: String,
    layout: AgentPtyLayout,
    supervisor: Arc<dyn ShellSupervisor>,
    spool: Spool,
    waiters: WaiterRegistry,
    index: BlockIndex,
    state: Mutex<EngineState>,
    raw_tx: broadcast::Sender<Vec<u8>>,
}

impl PtyEngine {
    pub fn new(
        conversation_id: impl Into<String>,
        conversations_dir: &Path,
        supervisor: Arc<dyn ShellSupervisor>,
    ) -> Arc<Self> {
        let conversation_id = conversation_id.into();
        let layout = AgentPtyLayout::new(conversations_dir, &conversation_id);
        let (raw_tx, _) = broadcast::channel(RAW_CHANNEL_CAPACITY);
        Arc::new(Self {
            spool: Spool::new(layout.spool_path()),
            waiters: WaiterRegistry::new(),
            index: BlockIndex::new(layout.index_path()),
            conversation_id,
            layout,
            supervisor,
            state: Mutex::new(EngineState {
                shell_id: None,
                reader: None,
                buffer: String::new(),
                mode: PtyMode::Idle,
                active: None,
                begin_tx: None,
                interactive_session_id: None,
            }),
            raw_tx,
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn layout(&self) -> &AgentPtyLayout {
        &self.layout
    }

    /// Subscribe to raw PTY chunks (terminal streaming). A zero-length
    /// chunk marks end of stream.
    pub fn subscribe_raw(&self) -> broadcast::Receiver<Vec<u8>> {
        self.raw_tx.subscribe()
    }

    fn shell_label(&self) -> String {
        format!("agent-pty:{}", self.conversation_id)
    }

    /// Start (or re-attach to) the supervised shell for this conversation.
    pub async fn ensure_shell(self: &Arc<Self>, cwd: Option<&Path>) -> Result<ShellId> {
        let mut state = self.state.lock().await;
        if let Some(id) = &state.shell_id {
            return Ok(id.clone());
        }
        let label = self.shell_label();
        let shell_id = match self
            .supervisor
            .find_shell_by_label(&label, ShellStatus::Running)
        {
            Some(id) => {
                tracing::debug!(conversation = %self.conversation_id, shell_id = %id, "re-attached to running shell");
                id
            }
            None => {
                let rcfile = self.layout.rcfile_path();
                write_rcfile(&rcfile).await?;
                let argv = manual_shell_argv(&rcfile);
                self.supervisor.spawn_pty(&argv, cwd, &label).await?
            }
        };
        let rx = self.supervisor.subscribe_output(&shell_id)?;
        let engine = self.clone();
        state.reader = Some(tokio::spawn(async move {
            engine.reader_loop(rx).await;
        }));
        state.shell_id = Some(shell_id.clone());
        Ok(shell_id)
    }

    async fn reader_loop(self: Arc<Self>, mut rx: hearth_core::OutputRx) {
        loop {
            match rx.recv().await {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        // Zero-length chunk is the supervisor's
                        // end-of-stream marker.
                        let _ = self.raw_tx.send(chunk);
                        self.on_eof().await;
                        break;
                    }
                    self.on_chunk(chunk).await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        conversation = %self.conversation_id,
                        missed,
                        "pty reader lagged; dropped chunks"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.on_eof().await;
                    break;
                }
            }
        }
    }

    async fn on_chunk(&self, chunk: Vec<u8>) {
        let _ = self.raw_tx.send(chunk.clone());
        if let Err(e) = self.spool.append(&chunk).await {
            tracing::warn!(conversation = %self.conversation_id, error = %e, "spool append failed");
        }
        self.waiters.check(&self.spool).await;

        let mut state = self.state.lock().await;
        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = state.buffer.find('\n') {
            let line: String = state.buffer[..pos].to_string();
            state.buffer.drain(..=pos);
            self.on_line(&mut state, &line).await;
        }
    }

    async fn on_line(&self, state: &mut EngineState, line: &str) {
        match parse_sentinel(line) {
            Some(Sentinel::Begin { seq, ts, cwd, cmd }) => {
                self.handle_begin(state, seq, ts, cwd, cmd).await;
            }
            Some(Sentinel::End { seq, ts, exit }) => {
                self.handle_end(state, seq, ts, exit).await;
            }
            Some(Sentinel::Prompt { .. }) => {
                self.handle_prompt(state).await;
            }
            None => {
                if state.active.is_some() {
                    self.write_block_output(state, line).await;
                    let block_id = state
                        .active
                        .as_ref()
                        .map(|b| b.block_id.clone())
                        .unwrap_or_default();
                    self.append_event(&UiEvent::AgentBlockDelta {
                        conversation_id: self.conversation_id.clone(),
                        block_id,
                        delta: format!("{line}\n"),
                    })
                    .await;
                }
            }
        }
    }

    async fn handle_begin(
        &self,
        state: &mut EngineState,
        seq: u64,
        ts: Option<u64>,
        cwd: String,
        cmd: String,
    ) {
        let ts = ts.unwrap_or_else(now_ms);
        let out_file = self.layout.blocks_dir().join(format!("{seq}_{ts}.out"));
        let record = BlockRecord {
            block_id: BlockRecord::make_id(&self.conversation_id, seq, ts),
            conversation_id: self.conversation_id.clone(),
            seq,
            ts_begin: ts,
            ts_end: None,
            cwd,
            cmd,
            status: BlockStatus::Running,
            exit_code: None,
            output_path: Some(out_file),
        };
        state.active = Some(record.clone());
        state.mode = PtyMode::BlockRunning;
        self.append_event(&UiEvent::AgentBlockBegin {
            conversation_id: self.conversation_id.clone(),
            block: record.clone(),
        })
        .await;
        if let Some(tx) = state.begin_tx.take() {
            let _ = tx.send(record);
        }
    }

    async fn handle_end(
        &self,
        state: &mut EngineState,
        seq: u64,
        ts: Option<u64>,
        exit: Option<i32>,
    ) {
        let Some(active) = state.active.as_mut() else {
            return;
        };
        // END for some other block is stale; ignore it.
        if seq != 0 && active.seq != 0 && seq != active.seq {
            return;
        }
        active.status = BlockStatus::Completed;
        active.exit_code = exit;
        active.ts_end = Some(ts.unwrap_or_else(now_ms));
        let finished = active.clone();
        if let Err(e) = self.index.append(&finished).await {
            tracing::warn!(conversation = %self.conversation_id, error = %e, "block index append failed");
        }
        self.append_event(&UiEvent::AgentBlockEnd {
            conversation_id: self.conversation_id.clone(),
            block: finished,
        })
        .await;
        state.active = None;
        state.mode = PtyMode::Idle;
    }

    async fn handle_prompt(&self, state: &mut EngineState) {
        if state.mode == PtyMode::Interactive {
            if let Some(active) = state.active.as_mut() {
                active.status = BlockStatus::Completed;
                active.ts_end = Some(now_ms());
                let finished = active.clone();
                if let Err(e) = self.index.append(&finished).await {
                    tracing::warn!(conversation = %self.conversation_id, error = %e, "block index append failed");
                }
                self.append_event(&UiEvent::AgentBlockEnd {
                    conversation_id: self.conversation_id.clone(),
                    block: finished,
                })
                .await;
            }
            state.active = None;
            state.interactive_session_id = None;
            state.mode = PtyMode::Idle;
        }
    }

    async fn on_eof(&self) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.as_mut() {
            active.status = BlockStatus::Completed;
            active.ts_end = Some(now_ms());
            active.exit_code = None;
            let finished = active.clone();
            if let Err(e) = self.index.append(&finished).await {
                tracing::warn!(conversation = %self.conversation_id, error = %e, "block index append failed");
            }
            self.append_event(&UiEvent::AgentBlockEnd {
                conversation_id: self.conversation_id.clone(),
                block: finished,
            })
            .await;
        }
        state.active = None;
        state.interactive_session_id = None;
        state.mode = PtyMode::Idle;
        state.shell_id = None;
        drop(state);
        let size = self.spool.size().await.unwrap_or(0);
        self.waiters.cancel_all(size).await;
        tracing::info!(conversation = %self.conversation_id, "shell reached EOF");
    }

    async fn write_block_output(&self, state: &EngineState, line: &str) {
        let Some(path) = state
            .active
            .as_ref()
            .and_then(|b| b.output_path.as_ref())
        else {
            return;
        };
        if let Err(e) = append_text(path, &format!("{line}\n")).await {
            tracing::warn!(conversation = %self.conversation_id, error = %e, "block output write failed");
        }
    }

    async fn append_event(&self, event: &UiEvent) {
        let path = self.layout.events_path();
        match serde_json::to_string(event) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = append_text(&path, &line).await {
                    tracing::warn!(conversation = %self.conversation_id, error = %e, "event append failed");
                }
            }
            Err(e) => {
                tracing::warn!(conversation = %self.conversation_id, error = %e, "event serialize failed");
            }
        }
    }

    /// Execute one command in block mode. The submission is wrapped in a
    /// single BEGIN/END pair, so compound commands (`a && b`) stay one
    /// block. Returns once BEGIN is observed.
    ///
    /// Multi-line constructs (heredocs) interact poorly with the eval
    /// wrapper; use [`exec_interactive`](Self::exec_interactive) for those.
    pub async fn exec(self: &Arc<Self>, cmd: &str, cwd: Option<&str>) -> Result<ExecStarted> {
        {
            let state = self.state.lock().await;
            match state.mode {
                PtyMode::Interactive => return Err(PtyError::InteractiveActive),
                PtyMode::BlockRunning => return Err(PtyError::Busy),
                PtyMode::Idle => {}
            }
        }
        self.ensure_shell(cwd.map(Path::new)).await?;
        let (shell_id, rx) = {
            let mut state = self.state.lock().await;
            let shell_id = state.shell_id.clone().ok_or_else(|| {
                hearth_core::CoreError::ShellUnavailable("shell exited during exec".into())
            })?;
            let (tx, rx) = oneshot::channel();
            state.begin_tx = Some(tx);
            (shell_id, rx)
        };
        let wrapped = wrap_block_command(cmd, cwd);
        self.supervisor
            .write_to_pty(&shell_id, wrapped.as_bytes())
            .await?;
        match tokio::time::timeout(BEGIN_TIMEOUT, rx).await {
            Ok(Ok(record)) => Ok(ExecStarted {
                block_id: record.block_id,
                seq: record.seq,
                ts: record.ts_begin,
            }),
            _ => {
                self.state.lock().await.begin_tx = None;
                Err(PtyError::BeginTimeout)
            }
        }
    }

    /// Start an interactive session (REPL, editor, debugger). The command
    /// is written raw, a synthetic block streams the output, and the
    /// session ends on [`end_session`](Self::end_session) or the next
    /// prompt sentinel.
    pub async fn exec_interactive(
        self: &Arc<Self>,
        cmd: &str,
        cwd: Option<&str>,
    ) -> Result<InteractiveStarted> {
        {
            let state = self.state.lock().await;
            match state.mode {
                PtyMode::Interactive => return Err(PtyError::InteractiveActive),
                PtyMode::BlockRunning => return Err(PtyError::Busy),
                PtyMode::Idle => {}
            }
        }
        self.ensure_shell(cwd.map(Path::new)).await?;
        let (shell_id, session_id, block_id, ts) = {
            let mut state = self.state.lock().await;
            let shell_id = state.shell_id.clone().ok_or_else(|| {
                hearth_core::CoreError::ShellUnavailable("shell exited during exec".into())
            })?;
            let ts = now_ms();
            let session_id = format!("interactive:{ts}");
            let block_id = BlockRecord::make_interactive_id(&self.conversation_id, ts);
            let out_file = self.layout.blocks_dir().join(format!("interactive_{ts}.out"));
            let record = BlockRecord {
                block_id: block_id.clone(),
                conversation_id: self.conversation_id.clone(),
                seq: 0,
                ts_begin: ts,
                ts_end: None,
                cwd: cwd.map(str::to_string).unwrap_or_else(|| {
                    std::env::current_dir()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                }),
                cmd: cmd.to_string(),
                status: BlockStatus::Interactive,
                exit_code: None,
                output_path: Some(out_file),
            };
            state.active = Some(record.clone());
            state.mode = PtyMode::Interactive;
            state.interactive_session_id = Some(session_id.clone());
            self.append_event(&UiEvent::AgentBlockBegin {
                conversation_id: self.conversation_id.clone(),
                block: record,
            })
            .await;
            (shell_id, session_id, block_id, ts)
        };
        // One submission: a separate cd would emit its own prompt sentinel
        // and end the session before it starts.
        let line = match cwd {
            Some(cwd) => format!("cd \"{cwd}\" 2>/dev/null; {cmd}\n"),
            None => format!("{cmd}\n"),
        };
        self.supervisor
            .write_to_pty(&shell_id, line.as_bytes())
            .await?;
        let cursor = self.spool.size().await?;
        Ok(InteractiveStarted {
            session_id,
            block_id,
            ts_begin: ts,
            cursor,
        })
    }

    /// End the active interactive session: sends Ctrl+C, completes and
    /// indexes the synthetic block.
    pub async fn end_session(&self, session_id: Option<&str>) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.mode != PtyMode::Interactive {
                return Err(PtyError::NoInteractiveSession);
            }
            if let Some(requested) = session_id {
                if state.interactive_session_id.as_deref() != Some(requested) {
                    return Err(PtyError::SessionMismatch);
                }
            }
        }
        self.send(b"\x03").await?;
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.as_mut() {
            active.status = BlockStatus::Completed;
            active.ts_end = Some(now_ms());
            let finished = active.clone();
            self.index.append(&finished).await?;
            self.append_event(&UiEvent::AgentBlockEnd {
                conversation_id: self.conversation_id.clone(),
                block: finished,
            })
            .await;
        }
        state.active = None;
        state.interactive_session_id = None;
        state.mode = PtyMode::Idle;
        Ok(())
    }

    /// Write raw bytes to the PTY (text, control chars, escape sequences).
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let shell_id = {
            let state = self.state.lock().await;
            state
                .shell_id
                .clone()
                .ok_or_else(|| hearth_core::CoreError::ShellUnavailable("no shell".into()))?
        };
        self.supervisor.write_to_pty(&shell_id, data).await?;
        Ok(())
    }

    pub async fn ctrl_c(&self) -> Result<()> {
        self.send(b"\x03").await
    }

    pub async fn ctrl_d(&self) -> Result<()> {
        self.send(b"\x04").await
    }

    pub async fn enter(&self) -> Result<()> {
        self.send(b"\r").await
    }

    /// Wait for a condition in the output spool. Scans existing bytes
    /// first; otherwise parks a predicate that resolves as new bytes
    /// arrive. On timeout the caller gets `matched = false` and the cursor
    /// to resume from.
    pub async fn wait_for(&self, req: WaitRequest) -> Result<WaitOutcome> {
        let matcher = Matcher::compile(&req)?;
        let max_bytes = if req.max_bytes == 0 {
            crate::waiter::SCAN_WINDOW
        } else {
            req.max_bytes
        };
        if let Some(outcome) =
            WaiterRegistry::scan_once(&self.spool, &matcher, req.from_cursor, max_bytes).await?
        {
            return Ok(outcome);
        }
        let rx = self.waiters.register(matcher, req.from_cursor).await;
        match tokio::time::timeout(Duration::from_millis(req.timeout_ms), rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            _ => {
                let size = self.spool.size().await?;
                Ok(WaitOutcome::timeout(size))
            }
        }
    }

    /// Read raw spool bytes from a cursor.
    pub async fn read_spool(&self, from_cursor: u64, max_bytes: u64) -> Result<(String, u64)> {
        let max_bytes = if max_bytes == 0 {
            DEFAULT_READ_MAX
        } else {
            max_bytes.min(READ_HARD_CAP)
        };
        let (data, next) = self.spool.read(from_cursor, max_bytes).await?;
        Ok((String::from_utf8_lossy(&data).into_owned(), next))
    }

    /// Current mode, active block/session, and spool cursor.
    pub async fn status(&self) -> Result<PtyStatus> {
        let spool_cursor = self.spool.size().await?;
        let state = self.state.lock().await;
        Ok(PtyStatus {
            mode: state.mode,
            active_block_id: state.active.as_ref().map(|b| b.block_id.clone()),
            active_session_id: state.interactive_session_id.clone(),
            shell_id: state.shell_id.clone(),
            spool_cursor,
        })
    }

    /// Detach from the shell: stop the reader and resolve outstanding
    /// waiters. The shell itself stays under supervisor control.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        state.shell_id = None;
        drop(state);
        let size = self.spool.size().await.unwrap_or(0);
        self.waiters.cancel_all(size).await;
    }
}

async fn append_text(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// Registry of engines, one per conversation
pub struct PtyManager {
    conversations_dir: PathBuf,
    supervisor: Arc<dyn ShellSupervisor>,
    engines: Mutex<HashMap<String, Arc<PtyEngine>>>,
}

impl PtyManager {
    pub fn new(conversations_dir: PathBuf, supervisor: Arc<dyn ShellSupervisor>) -> Self {
        Self {
            conversations_dir,
            supervisor,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, conversation_id: &str) -> Arc<PtyEngine> {
        let mut engines = self.engines.lock().await;
        engines
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                PtyEngine::new(
                    conversation_id,
                    &self.conversations_dir,
                    self.supervisor.clone(),
                )
            })
            .clone()
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Arc<PtyEngine>> {
        self.engines.lock().await.get(conversation_id).cloned()
    }

    pub async fn close_all(&self) {
        let engines: Vec<_> = self.engines.lock().await.values().cloned().collect();
        for engine in engines {
            engine.close().await;
        }
    }
}
