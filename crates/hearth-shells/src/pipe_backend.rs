//! Piped processes via tokio::process
//!
//! ACP agents run with piped stdin/stdout. Stdout is pumped by an async
//! reader task into the shell's broadcast channel; stdin is exposed as a
//! serialized [`PipeWriter`]. Stderr is inherited so agent diagnostics land
//! in our own stderr.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};

use hearth_core::{CoreError, PipeWriter, Result};

const READ_BUF_SIZE: usize = 16 * 1024;
const TERM_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub(crate) struct PipeHandle {
    stdin: PipeWriter,
    child: Arc<Mutex<Child>>,
    pid: Option<u32>,
}

impl PipeHandle {
    pub fn spawn(
        argv: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        output_tx: broadcast::Sender<Vec<u8>>,
        alive: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CoreError::Spawn("empty argv".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::Spawn(format!("spawn {program} failed: {e}")))?;
        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoreError::Spawn("failed to capture stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Spawn("failed to capture stdout".to_string()))?;

        tokio::spawn(async move {
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let _ = output_tx.send(buf[..n].to_vec());
                    }
                }
            }
            alive.store(false, Ordering::SeqCst);
            // Zero-length chunk is the end-of-stream marker.
            let _ = output_tx.send(Vec::new());
        });

        Ok(Self {
            stdin: PipeWriter::new(Box::new(stdin)),
            child: Arc::new(Mutex::new(child)),
            pid,
        })
    }

    pub fn stdin(&self) -> PipeWriter {
        self.stdin.clone()
    }

    /// SIGTERM, a short grace period, then SIGKILL. `force` skips the
    /// graceful step.
    pub async fn terminate(&self, force: bool) -> Result<()> {
        #[cfg(unix)]
        if !force {
            if let Some(pid) = self.pid {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                let waited = tokio::time::timeout(TERM_GRACE, async {
                    self.child.lock().await.wait().await
                })
                .await;
                if waited.is_ok() {
                    return Ok(());
                }
            }
        }
        #[cfg(not(unix))]
        let _ = force;
        let mut guard = self.child.lock().await;
        let _ = guard.start_kill();
        let _ = guard.wait().await;
        Ok(())
    }
}
