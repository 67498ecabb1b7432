//! Trait seams between the core subsystems
//!
//! [`ShellSupervisor`] is the narrow contract the core consumes from a
//! process supervisor; `hearth-shells` provides a local implementation but
//! nothing in the engine or multiplexer depends on it concretely.
//!
//! [`EventSink`] is the single upward-facing interface: routers and engines
//! publish through it instead of holding back-pointers into the hub or the
//! transcript store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex};

use crate::error::Result;
use crate::events::{TranscriptEntry, UiEvent};

/// Opaque shell identifier assigned by the supervisor
pub type ShellId = String;

/// Subscriber end of a shell's output fan-out.
///
/// Every chunk a process writes is delivered to every subscriber in the
/// order it was produced; chunks are opaque byte strings. A zero-length
/// chunk marks end of stream.
pub type OutputRx = broadcast::Receiver<Vec<u8>>;

/// Supervisor-reported process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStatus {
    Running,
    Exited,
}

/// Cloneable writer onto a piped process's stdin.
///
/// All clones share one lock, so concurrent logical sessions writing
/// through the same agent process serialize at this point (one in-flight
/// write at a time, never interleaved lines).
#[derive(Clone)]
pub struct PipeWriter {
    inner: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl PipeWriter {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write raw bytes and flush.
    pub async fn write_all(&self, data: &[u8]) -> std::io::Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_all(data).await?;
        guard.flush().await
    }

    /// Write one newline-terminated line.
    pub async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

/// The contract the core consumes from an external process supervisor
#[async_trait]
pub trait ShellSupervisor: Send + Sync {
    /// Start a process attached to a PTY.
    async fn spawn_pty(&self, argv: &[String], cwd: Option<&Path>, label: &str)
        -> Result<ShellId>;

    /// Start a process with piped stdin/stdout (ACP backend).
    async fn spawn_pipe(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        label: &str,
    ) -> Result<ShellId>;

    /// Best-effort write to the PTY; fails once the process has exited.
    async fn write_to_pty(&self, shell_id: &str, data: &[u8]) -> Result<()>;

    /// Subscribe to the shell's output chunks.
    fn subscribe_output(&self, shell_id: &str) -> Result<OutputRx>;

    /// Serialized stdin writer for a piped process.
    fn get_pipe_state(&self, shell_id: &str) -> Result<PipeWriter>;

    /// SIGTERM, then SIGKILL when `force` is set.
    async fn terminate_shell(&self, shell_id: &str, force: bool) -> Result<()>;

    /// Idempotent re-attach: find a shell previously spawned under `label`.
    fn find_shell_by_label(&self, label: &str, status: ShellStatus) -> Option<ShellId>;
}

/// Upward-facing sink for normalized events and transcript rows
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Fan an event out to live subscribers.
    async fn broadcast(&self, event: UiEvent);

    /// Append one row to the conversation's transcript (idempotent per
    /// `(conversation, item_id, role)`).
    async fn append_transcript(&self, conversation_id: &str, entry: TranscriptEntry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_writer_serializes_lines() {
        use tokio::io::AsyncReadExt;

        let (tx, mut rx) = tokio::io::duplex(1024);
        let writer = PipeWriter::new(Box::new(tx));
        writer.write_line("a").await.unwrap();
        writer.write_all(b"b\n").await.unwrap();
        // Clones share the same underlying stream and lock.
        let clone = writer.clone();
        clone.write_line("c").await.unwrap();

        let mut buf = vec![0u8; 6];
        rx.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"a\nb\nc\n");
    }
}
