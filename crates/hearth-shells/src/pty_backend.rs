//! PTY-attached processes via portable-pty
//!
//! The master side stays owned by the handle (dropping it would hang up the
//! terminal); a dedicated blocking thread reads output and fans it into the
//! shell's broadcast channel.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tokio::sync::broadcast;

use hearth_core::{CoreError, Result};

const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 120;
const READ_BUF_SIZE: usize = 16 * 1024;
const TERM_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub(crate) struct PtyHandle {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
    // Keeps the terminal open for the child's lifetime.
    _master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    pid: Option<u32>,
}

impl PtyHandle {
    pub fn spawn(
        argv: &[String],
        cwd: Option<&Path>,
        output_tx: broadcast::Sender<Vec<u8>>,
        alive: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CoreError::Spawn("empty argv".to_string()))?;

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CoreError::Spawn(format!("openpty failed: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }
        if std::env::var_os("TERM").is_none() {
            cmd.env("TERM", "xterm-256color");
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CoreError::Spawn(format!("spawn pty command failed: {e}")))?;
        let pid = child.process_id();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| CoreError::Spawn(format!("clone pty reader failed: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CoreError::Spawn(format!("take pty writer failed: {e}")))?;

        std::thread::Builder::new()
            .name("hearth-pty-read".to_string())
            .spawn(move || {
                let mut reader = reader;
                let mut buf = [0u8; READ_BUF_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            // Delivery is best-effort: no receivers is fine.
                            let _ = output_tx.send(buf[..n].to_vec());
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
                // Zero-length chunk is the end-of-stream marker.
                let _ = output_tx.send(Vec::new());
            })
            .map_err(|e| CoreError::Spawn(format!("reader thread failed: {e}")))?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            child: Arc::new(Mutex::new(child)),
            _master: Arc::new(Mutex::new(pair.master)),
            pid,
        })
    }

    pub fn writer(&self) -> Arc<Mutex<Box<dyn Write + Send>>> {
        self.writer.clone()
    }

    /// SIGTERM, a short grace period, then SIGKILL. `force` skips the
    /// graceful step.
    pub async fn terminate(&self, force: bool) -> Result<()> {
        let child = self.child.clone();
        let pid = self.pid;
        tokio::task::spawn_blocking(move || {
            #[cfg(not(unix))]
            let _ = force;
            #[cfg(unix)]
            if !force {
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                    let deadline = std::time::Instant::now() + TERM_GRACE;
                    while std::time::Instant::now() < deadline {
                        let mut guard = child.lock().expect("pty child lock poisoned");
                        if let Ok(Some(_)) = guard.try_wait() {
                            return Ok(());
                        }
                        drop(guard);
                        std::thread::sleep(Duration::from_millis(50));
                    }
                }
            }
            let mut guard = child.lock().expect("pty child lock poisoned");
            let _ = guard.kill();
            let _ = guard.wait();
            Ok(())
        })
        .await
        .map_err(|e| CoreError::Spawn(format!("terminate task failed: {e}")))?
    }
}
