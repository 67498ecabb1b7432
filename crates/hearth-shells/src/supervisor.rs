//! Shell registry and the `ShellSupervisor` implementation
//!
//! Shells are registered under monotonically assigned ids (`sh-<n>`), carry
//! a caller-chosen label for re-attach, and expose their output through a
//! broadcast channel shared by every subscriber.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use hearth_core::{
    CoreError, OutputRx, PipeWriter, Result, ShellId, ShellStatus, ShellSupervisor,
};

use crate::pipe_backend::PipeHandle;
use crate::pty_backend::PtyHandle;

pub(crate) enum Backend {
    Pty(PtyHandle),
    Pipe(PipeHandle),
}

pub(crate) struct ShellRecord {
    pub label: String,
    pub backend: Backend,
    pub output_tx: broadcast::Sender<Vec<u8>>,
    /// Cleared by the reader when the process reaches EOF
    pub alive: Arc<AtomicBool>,
}

impl ShellRecord {
    fn status(&self) -> ShellStatus {
        if self.alive.load(Ordering::SeqCst) {
            ShellStatus::Running
        } else {
            ShellStatus::Exited
        }
    }
}

/// In-process supervisor backing the `ShellSupervisor` contract
pub struct LocalSupervisor {
    shells: Mutex<HashMap<ShellId, ShellRecord>>,
    next_id: AtomicU64,
}

impl LocalSupervisor {
    pub fn new() -> Self {
        Self {
            shells: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn mint_id(&self) -> ShellId {
        format!("sh-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, id: ShellId, record: ShellRecord) {
        self.shells
            .lock()
            .expect("shell registry lock poisoned")
            .insert(id, record);
    }

    fn with_record<T>(&self, shell_id: &str, f: impl FnOnce(&ShellRecord) -> T) -> Result<T> {
        let shells = self.shells.lock().expect("shell registry lock poisoned");
        shells
            .get(shell_id)
            .map(f)
            .ok_or_else(|| CoreError::ShellUnavailable(shell_id.to_string()))
    }
}

impl Default for LocalSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShellSupervisor for LocalSupervisor {
    async fn spawn_pty(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        label: &str,
    ) -> Result<ShellId> {
        let id = self.mint_id();
        let (output_tx, _) = broadcast::channel(crate::OUTPUT_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let handle = PtyHandle::spawn(argv, cwd, output_tx.clone(), alive.clone())?;
        tracing::info!(shell_id = %id, %label, ?argv, "spawned pty shell");
        self.register(
            id.clone(),
            ShellRecord {
                label: label.to_string(),
                backend: Backend::Pty(handle),
                output_tx,
                alive,
            },
        );
        Ok(id)
    }

    async fn spawn_pipe(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        label: &str,
    ) -> Result<ShellId> {
        let id = self.mint_id();
        let (output_tx, _) = broadcast::channel(crate::OUTPUT_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let handle = PipeHandle::spawn(argv, cwd, env, output_tx.clone(), alive.clone())?;
        tracing::info!(shell_id = %id, %label, ?argv, "spawned pipe shell");
        self.register(
            id.clone(),
            ShellRecord {
                label: label.to_string(),
                backend: Backend::Pipe(handle),
                output_tx,
                alive,
            },
        );
        Ok(id)
    }

    async fn write_to_pty(&self, shell_id: &str, data: &[u8]) -> Result<()> {
        let (writer, alive) = self.with_record(shell_id, |rec| match &rec.backend {
            Backend::Pty(h) => Some((h.writer(), rec.alive.clone())),
            Backend::Pipe(_) => None,
        })?
        .ok_or_else(|| CoreError::ShellUnavailable(format!("{shell_id} is not a pty shell")))?;
        if !alive.load(Ordering::SeqCst) {
            return Err(CoreError::ShellUnavailable(format!("{shell_id} has exited")));
        }
        let data = data.to_vec();
        // PTY masters are blocking writers; keep them off the async threads.
        tokio::task::spawn_blocking(move || {
            let mut guard = writer.lock().expect("pty writer lock poisoned");
            use std::io::Write;
            guard.write_all(&data)?;
            guard.flush()
        })
        .await
        .map_err(|e| CoreError::Spawn(format!("pty write task failed: {e}")))??;
        Ok(())
    }

    fn subscribe_output(&self, shell_id: &str) -> Result<OutputRx> {
        self.with_record(shell_id, |rec| rec.output_tx.subscribe())
    }

    fn get_pipe_state(&self, shell_id: &str) -> Result<PipeWriter> {
        self.with_record(shell_id, |rec| match &rec.backend {
            Backend::Pipe(h) => Some(h.stdin()),
            Backend::Pty(_) => None,
        })?
        .ok_or_else(|| CoreError::ShellUnavailable(format!("{shell_id} is not a pipe shell")))
    }

    async fn terminate_shell(&self, shell_id: &str, force: bool) -> Result<()> {
        enum Kill {
            Pty(PtyHandle),
            Pipe(PipeHandle),
        }
        let kill = {
            let shells = self.shells.lock().expect("shell registry lock poisoned");
            match shells.get(shell_id) {
                Some(rec) => match &rec.backend {
                    Backend::Pty(h) => Kill::Pty(h.clone()),
                    Backend::Pipe(h) => Kill::Pipe(h.clone()),
                },
                None => return Err(CoreError::ShellUnavailable(shell_id.to_string())),
            }
        };
        match kill {
            Kill::Pty(h) => h.terminate(force).await?,
            Kill::Pipe(h) => h.terminate(force).await?,
        }
        tracing::info!(shell_id = %shell_id, force, "terminated shell");
        Ok(())
    }

    fn find_shell_by_label(&self, label: &str, status: ShellStatus) -> Option<ShellId> {
        let shells = self.shells.lock().expect("shell registry lock poisoned");
        shells
            .iter()
            .find(|(_, rec)| rec.label == label && rec.status() == status)
            .map(|(id, _)| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_shell_round_trip() {
        let sup = LocalSupervisor::new();
        let id = sup
            .spawn_pipe(
                &["cat".to_string()],
                None,
                &HashMap::new(),
                "test:cat",
            )
            .await
            .unwrap();

        let mut rx = sup.subscribe_output(&id).unwrap();
        let stdin = sup.get_pipe_state(&id).unwrap();
        stdin.write_line("hello").await.unwrap();

        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for output")
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&chunk), "hello\n");

        sup.terminate_shell(&id, true).await.unwrap();
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_chunk() {
        let sup = LocalSupervisor::new();
        let id = sup
            .spawn_pipe(&["cat".to_string()], None, &HashMap::new(), "test:fanout")
            .await
            .unwrap();

        let mut rx_a = sup.subscribe_output(&id).unwrap();
        let mut rx_b = sup.subscribe_output(&id).unwrap();
        sup.get_pipe_state(&id).unwrap().write_line("x").await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("subscriber missed chunk")
                .unwrap();
            assert_eq!(String::from_utf8_lossy(&chunk), "x\n");
        }
        sup.terminate_shell(&id, true).await.unwrap();
    }

    #[tokio::test]
    async fn find_by_label_matches_running_shells() {
        let sup = LocalSupervisor::new();
        let id = sup
            .spawn_pipe(&["cat".to_string()], None, &HashMap::new(), "agent-pty:c1")
            .await
            .unwrap();
        assert_eq!(
            sup.find_shell_by_label("agent-pty:c1", ShellStatus::Running),
            Some(id.clone())
        );
        assert_eq!(sup.find_shell_by_label("missing", ShellStatus::Running), None);
        sup.terminate_shell(&id, true).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_shell_is_an_error() {
        let sup = LocalSupervisor::new();
        assert!(sup.subscribe_output("sh-999").is_err());
        assert!(sup.write_to_pty("sh-999", b"x").await.is_err());
    }
}
