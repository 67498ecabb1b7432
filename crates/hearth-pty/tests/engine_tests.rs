//! End-to-end tests for the PTY block engine against a scripted supervisor
//!
//! The fake supervisor lets tests inject output chunks as if a real shell
//! produced them, so the full chunk -> spool -> sentinel -> block pipeline
//! runs without spawning processes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use hearth_core::{
    CoreError, OutputRx, PipeWriter, Result as CoreResult, ShellId, ShellStatus, ShellSupervisor,
};
use hearth_pty::sentinel::{format_begin, format_end, format_prompt};
use hearth_pty::{MatchKind, PtyEngine, PtyError, PtyMode, WaitRequest};

struct FakeShell {
    tx: broadcast::Sender<Vec<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
}

#[derive(Default)]
struct FakeSupervisor {
    shells: Mutex<HashMap<ShellId, Arc<FakeShell>>>,
    next: AtomicU64,
}

impl FakeSupervisor {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn first_shell(&self) -> Option<ShellId> {
        self.shells.lock().unwrap().keys().next().cloned()
    }

    fn writes(&self, shell_id: &str) -> Vec<String> {
        self.shells.lock().unwrap()[shell_id]
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    fn feed(&self, shell_id: &str, chunk: impl Into<Vec<u8>>) {
        let shell = self.shells.lock().unwrap()[shell_id].clone();
        let _ = shell.tx.send(chunk.into());
    }

    fn feed_eof(&self, shell_id: &str) {
        self.feed(shell_id, Vec::new());
    }
}

#[async_trait]
impl ShellSupervisor for FakeSupervisor {
    async fn spawn_pty(
        &self,
        _argv: &[String],
        _cwd: Option<&Path>,
        _label: &str,
    ) -> CoreResult<ShellId> {
        let id = format!("fake-{}", self.next.fetch_add(1, Ordering::SeqCst));
        let (tx, _) = broadcast::channel(256);
        self.shells.lock().unwrap().insert(
            id.clone(),
            Arc::new(FakeShell {
                tx,
                writes: Mutex::new(Vec::new()),
            }),
        );
        Ok(id)
    }

    async fn spawn_pipe(
        &self,
        _argv: &[String],
        _cwd: Option<&Path>,
        _env: &HashMap<String, String>,
        _label: &str,
    ) -> CoreResult<ShellId> {
        Err(CoreError::Spawn("fake supervisor is pty-only".into()))
    }

    async fn write_to_pty(&self, shell_id: &str, data: &[u8]) -> CoreResult<()> {
        let shell = self
            .shells
            .lock()
            .unwrap()
            .get(shell_id)
            .cloned()
            .ok_or_else(|| CoreError::ShellUnavailable(shell_id.to_string()))?;
        shell.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn subscribe_output(&self, shell_id: &str) -> CoreResult<OutputRx> {
        let shells = self.shells.lock().unwrap();
        shells
            .get(shell_id)
            .map(|s| s.tx.subscribe())
            .ok_or_else(|| CoreError::ShellUnavailable(shell_id.to_string()))
    }

    fn get_pipe_state(&self, shell_id: &str) -> CoreResult<PipeWriter> {
        Err(CoreError::ShellUnavailable(shell_id.to_string()))
    }

    async fn terminate_shell(&self, _shell_id: &str, _force: bool) -> CoreResult<()> {
        Ok(())
    }

    fn find_shell_by_label(&self, _label: &str, _status: ShellStatus) -> Option<ShellId> {
        None
    }
}

async fn wait_for_first_write(sup: &FakeSupervisor) -> ShellId {
    for _ in 0..200 {
        if let Some(id) = sup.first_shell() {
            if !sup.writes(&id).is_empty() {
                return id;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine never wrote a command");
}

async fn wait_until_idle(engine: &Arc<PtyEngine>) {
    for _ in 0..200 {
        if engine.status().await.unwrap().mode == PtyMode::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine never returned to idle");
}

#[tokio::test]
async fn exec_frames_one_block() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c1", dir.path(), sup.clone());

    let sup2 = sup.clone();
    let feeder = tokio::spawn(async move {
        let shell = wait_for_first_write(&sup2).await;
        sup2.feed(
            &shell,
            format!("\n{}\n", format_begin(1, 1000, "/tmp", "echo hi && pwd")),
        );
        sup2.feed(&shell, "hi\n/tmp\n");
        sup2.feed(&shell, format!("\n{}\n", format_end(1, 1010, 0)));
    });

    let started = engine.exec("echo hi && pwd", Some("/tmp")).await.unwrap();
    assert_eq!(started.seq, 1);
    assert_eq!(started.block_id, "c1:1:1000");
    feeder.await.unwrap();
    wait_until_idle(&engine).await;

    // The submission was written base64-wrapped, never verbatim.
    let shell = sup.first_shell().unwrap();
    let writes = sup.writes(&shell).join("");
    assert!(writes.contains("base64 -d"));
    assert!(writes.starts_with("cd \"/tmp\""));

    // Exactly one completed block in the index.
    let page = engine.index().since(0, 50).await.unwrap();
    assert_eq!(page.items.len(), 1);
    let block = &page.items[0];
    assert_eq!(block.cmd, "echo hi && pwd");
    assert_eq!(block.exit_code, Some(0));
    assert_eq!(block.ts_end, Some(1010));

    // Output file holds the command output and no sentinel lines.
    let out = std::fs::read_to_string(block.output_path.as_ref().unwrap()).unwrap();
    assert!(out.contains("hi\n/tmp\n"));
    assert!(!out.contains("__FWS"));

    // The spool saw every byte.
    let (spooled, _) = engine.read_spool(0, 0).await.unwrap();
    assert!(spooled.contains("hi\n/tmp\n"));
}

#[tokio::test]
async fn waiter_matches_prior_output_with_absolute_cursor() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c1", dir.path(), sup.clone());

    let sup2 = sup.clone();
    let feeder = tokio::spawn(async move {
        let shell = wait_for_first_write(&sup2).await;
        sup2.feed(&shell, format!("\n{}\n", format_begin(1, 1000, "/tmp", "echo hi")));
        sup2.feed(&shell, "hi\n");
        sup2.feed(&shell, format!("\n{}\n", format_end(1, 1010, 0)));
    });
    engine.exec("echo hi", None).await.unwrap();
    feeder.await.unwrap();
    wait_until_idle(&engine).await;

    let outcome = engine
        .wait_for(WaitRequest::substring("hi\n", 0, 1000))
        .await
        .unwrap();
    assert!(outcome.matched);
    let (spooled, _) = engine.read_spool(0, 0).await.unwrap();
    let expected = spooled.find("hi\n").unwrap() as u64;
    assert_eq!(outcome.match_cursor, Some(expected));
    let span = outcome.match_span.unwrap();
    assert_eq!(span.end - span.start, 3);
}

#[tokio::test]
async fn exec_while_running_is_busy() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c1", dir.path(), sup.clone());

    let sup2 = sup.clone();
    let feeder = tokio::spawn(async move {
        let shell = wait_for_first_write(&sup2).await;
        // BEGIN only: the block stays running.
        sup2.feed(&shell, format!("\n{}\n", format_begin(1, 1000, "/", "sleep 99")));
    });
    engine.exec("sleep 99", None).await.unwrap();
    feeder.await.unwrap();

    let err = engine.exec("echo again", None).await.unwrap_err();
    assert!(matches!(err, PtyError::Busy));
    // State unchanged: still one running block.
    let status = engine.status().await.unwrap();
    assert_eq!(status.mode, PtyMode::BlockRunning);
}

#[tokio::test]
async fn interactive_session_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c2", dir.path(), sup.clone());

    let started = engine.exec_interactive("python3 -q", None).await.unwrap();
    assert!(started.session_id.starts_with("interactive:"));
    assert!(started.block_id.contains(":interactive:"));

    let shell = sup.first_shell().unwrap();
    sup.feed(&shell, ">>> print(1+1)\n2\n");

    let outcome = engine
        .wait_for(WaitRequest {
            pattern: "\n2\n".to_string(),
            kind: MatchKind::Substring,
            from_cursor: started.cursor,
            timeout_ms: 5000,
            max_bytes: 0,
        })
        .await
        .unwrap();
    assert!(outcome.matched);

    // Wrong session id is rejected, correct one ends the session.
    let err = engine.end_session(Some("interactive:0")).await.unwrap_err();
    assert!(matches!(err, PtyError::SessionMismatch));
    engine.end_session(Some(&started.session_id)).await.unwrap();

    // Ctrl+C went to the pty.
    assert!(sup.writes(&shell).iter().any(|w| w.as_str() == "\x03"));

    let status = engine.status().await.unwrap();
    assert_eq!(status.mode, PtyMode::Idle);
    let page = engine.index().since(0, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].seq, 0);
    assert_eq!(page.items[0].cmd, "python3 -q");
    assert!(page.items[0].ts_end.is_some());
}

#[tokio::test]
async fn prompt_sentinel_ends_interactive_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c2", dir.path(), sup.clone());

    engine.exec_interactive("top", None).await.unwrap();
    let shell = sup.first_shell().unwrap();
    sup.feed(&shell, format!("\n{}\n", format_prompt(2000, "/home", 130)));
    wait_until_idle(&engine).await;

    let page = engine.index().since(0, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn end_session_while_idle_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c3", dir.path(), sup);
    let err = engine.end_session(None).await.unwrap_err();
    assert!(matches!(err, PtyError::NoInteractiveSession));
}

#[tokio::test]
async fn eof_mid_block_completes_with_null_exit() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c4", dir.path(), sup.clone());

    let sup2 = sup.clone();
    let feeder = tokio::spawn(async move {
        let shell = wait_for_first_write(&sup2).await;
        sup2.feed(&shell, format!("\n{}\n", format_begin(1, 1000, "/", "cat")));
    });
    engine.exec("cat", None).await.unwrap();
    feeder.await.unwrap();

    let shell = sup.first_shell().unwrap();
    sup.feed_eof(&shell);
    wait_until_idle(&engine).await;

    let page = engine.index().since(0, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].exit_code, None);
    assert!(page.items[0].ts_end.is_some());
    // The shell is gone; a fresh exec would need a respawn.
    assert!(engine.status().await.unwrap().shell_id.is_none());
}

#[tokio::test]
async fn stale_end_with_mismatched_seq_is_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c5", dir.path(), sup.clone());

    let sup2 = sup.clone();
    let feeder = tokio::spawn(async move {
        let shell = wait_for_first_write(&sup2).await;
        sup2.feed(&shell, format!("\n{}\n", format_begin(2, 1000, "/", "ls")));
        // Stale END from an earlier block.
        sup2.feed(&shell, format!("\n{}\n", format_end(1, 1010, 0)));
    });
    engine.exec("ls", None).await.unwrap();
    feeder.await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Block 2 is still running.
    let status = engine.status().await.unwrap();
    assert_eq!(status.mode, PtyMode::BlockRunning);

    // Matching END completes it.
    let shell = sup.first_shell().unwrap();
    sup.feed(&shell, format!("\n{}\n", format_end(2, 1020, 3)));
    wait_until_idle(&engine).await;
    let page = engine.index().since(0, 10).await.unwrap();
    assert_eq!(page.items[0].exit_code, Some(3));
}

#[tokio::test(start_paused = true)]
async fn begin_timeout_keeps_shell_alive() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c6", dir.path(), sup.clone());

    let err = engine.exec("echo never-framed", None).await.unwrap_err();
    assert!(matches!(err, PtyError::BeginTimeout));
    // Shell is still attached and usable.
    assert!(engine.status().await.unwrap().shell_id.is_some());
}

#[tokio::test]
async fn wait_for_timeout_returns_resume_cursor() {
    let dir = tempfile::TempDir::new().unwrap();
    let sup = FakeSupervisor::new();
    let engine = PtyEngine::new("c7", dir.path(), sup.clone());
    engine.exec_interactive("cat", None).await.unwrap();
    let shell = sup.first_shell().unwrap();
    sup.feed(&shell, "some output\n");

    // Give the reader a moment to spool the chunk.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let outcome = engine
        .wait_for(WaitRequest::substring("never-appears", 0, 100))
        .await
        .unwrap();
    assert!(!outcome.matched);
    assert_eq!(outcome.error.as_deref(), Some("timeout"));
    assert_eq!(outcome.next_cursor, 12);
}
