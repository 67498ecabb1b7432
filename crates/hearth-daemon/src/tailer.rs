//! Durable tailers: from JSONL files to live subscribers and transcript
//!
//! Two tailers run per live conversation:
//!
//! - The **events tailer** follows `agent_pty/events.jsonl` and rebroadcasts
//!   each line to the hub (offset held in memory; a restart replays the
//!   file, which is what a fresh subscriber wants).
//! - The **transcript mirror** translates block lifecycle events into
//!   `role: "agent_pty"` transcript rows. Its offset is persisted next to
//!   the file, so a restart resumes exactly where it left off and no row
//!   is recorded twice.
//!
//! Both reset to offset 0 when the file shrinks (truncation recovery) and
//! retry errors on a fixed backoff forever; durability beats error
//! surfacing here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use hearth_core::{EventSink, TranscriptEntry, UiEvent};
use hearth_pty::AgentPtyLayout;

use crate::error::Result;
use crate::hub::EventHub;
use crate::transcript::TranscriptWriter;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Lines the mirror consumes per tick
const MIRROR_LINES_PER_TICK: usize = 50;

/// Mirrors block lifecycle events into the transcript from a persisted
/// byte offset
pub struct TranscriptMirror {
    conversation_id: String,
    events_path: PathBuf,
    offset_path: PathBuf,
    transcript: Arc<TranscriptWriter>,
    offset: Option<u64>,
}

impl TranscriptMirror {
    pub fn new(
        conversation_id: impl Into<String>,
        layout: &AgentPtyLayout,
        transcript: Arc<TranscriptWriter>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            events_path: layout.events_path(),
            offset_path: layout.transcript_offset_path(),
            transcript,
            offset: None,
        }
    }

    async fn load_offset(&self) -> u64 {
        match tokio::fs::read_to_string(&self.offset_path).await {
            Ok(raw) => raw.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    async fn save_offset(&self, offset: u64) -> Result<()> {
        if let Some(parent) = self.offset_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash never leaves a torn offset file.
        let tmp = self.offset_path.with_extension("tmp");
        tokio::fs::write(&tmp, offset.to_string()).await?;
        tokio::fs::rename(&tmp, &self.offset_path).await?;
        Ok(())
    }

    /// Consume up to [`MIRROR_LINES_PER_TICK`] new lines; returns how many
    /// rows were appended.
    pub async fn tick(&mut self) -> Result<usize> {
        let data = match tokio::fs::read(&self.events_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut offset = match self.offset {
            Some(offset) => offset,
            None => self.load_offset().await,
        };
        if offset > data.len() as u64 {
            tracing::warn!(
                conversation = %self.conversation_id,
                "events file shrank; resetting mirror offset"
            );
            offset = 0;
        }
        let tail = &data[offset as usize..];
        if tail.is_empty() {
            self.offset = Some(offset);
            return Ok(0);
        }

        let lines: Vec<&[u8]> = tail
            .split(|&b| b == b'\n')
            .take(MIRROR_LINES_PER_TICK)
            .collect();
        let mut appended = 0;
        let mut consumed = 0usize;
        let mut taken = 0usize;
        for line in &lines {
            if line.is_empty() && consumed + 1 >= tail.len() {
                break;
            }
            consumed += line.len();
            taken += 1;
            let Ok(event) = serde_json::from_slice::<UiEvent>(line) else {
                continue;
            };
            if let Some(entry) = mirror_entry(&event) {
                self.transcript
                    .append(&self.conversation_id, entry)
                    .await?;
                appended += 1;
            }
        }
        if taken > 0 {
            consumed += taken - 1;
            if (offset as usize) + consumed < data.len() {
                consumed += 1;
            }
        }
        let new_offset = offset + consumed as u64;
        self.offset = Some(new_offset);
        self.save_offset(new_offset).await?;
        Ok(appended)
    }
}

/// Translate a block lifecycle event into its transcript mirror row.
fn mirror_entry(event: &UiEvent) -> Option<TranscriptEntry> {
    match event {
        UiEvent::AgentBlockBegin { block, .. } => Some(TranscriptEntry::AgentPty {
            event: "agent_block_begin".to_string(),
            block_id: Some(block.block_id.clone()),
            block: Some(block.clone()),
            delta: None,
        }),
        UiEvent::AgentBlockDelta { block_id, delta, .. } => Some(TranscriptEntry::AgentPty {
            event: "agent_block_delta".to_string(),
            block_id: Some(block_id.clone()),
            block: None,
            delta: Some(delta.clone()),
        }),
        UiEvent::AgentBlockEnd { block, .. } => Some(TranscriptEntry::AgentPty {
            event: "agent_block_end".to_string(),
            block_id: Some(block.block_id.clone()),
            block: Some(block.clone()),
            delta: None,
        }),
        _ => None,
    }
}

/// Follow `events.jsonl` and rebroadcast each event line to the hub.
async fn events_tail_loop(conversation_id: String, events_path: PathBuf, hub: Arc<EventHub>) {
    let mut offset: u64 = 0;
    loop {
        let data = match tokio::fs::read(&events_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, error = %e, "events tail read failed");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };
        if offset > data.len() as u64 {
            offset = 0;
        }
        let tail = &data[offset as usize..];
        if tail.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }
        for line in tail.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if let Ok(event) = serde_json::from_slice::<UiEvent>(line) {
                hub.broadcast(event).await;
            }
        }
        offset = data.len() as u64;
    }
}

struct ConversationTailers {
    events: JoinHandle<()>,
    mirror: JoinHandle<()>,
}

/// Keeps both tailers alive per conversation
pub struct Tailers {
    conversations_dir: PathBuf,
    hub: Arc<EventHub>,
    transcript: Arc<TranscriptWriter>,
    tasks: StdMutex<HashMap<String, ConversationTailers>>,
}

impl Tailers {
    pub fn new(
        conversations_dir: PathBuf,
        hub: Arc<EventHub>,
        transcript: Arc<TranscriptWriter>,
    ) -> Self {
        Self {
            conversations_dir,
            hub,
            transcript,
            tasks: StdMutex::new(HashMap::new()),
        }
    }

    /// Start (or restart, if a task died) the tailers for a conversation.
    pub fn ensure(&self, conversation_id: &str) {
        let mut tasks = self.tasks.lock().expect("tailer tasks lock poisoned");
        if let Some(existing) = tasks.get(conversation_id) {
            if !existing.events.is_finished() && !existing.mirror.is_finished() {
                return;
            }
        }
        let layout = AgentPtyLayout::new(&self.conversations_dir, conversation_id);

        let events = tokio::spawn(events_tail_loop(
            conversation_id.to_string(),
            layout.events_path(),
            self.hub.clone(),
        ));

        let mut mirror_state =
            TranscriptMirror::new(conversation_id, &layout, self.transcript.clone());
        let conversation = conversation_id.to_string();
        let mirror = tokio::spawn(async move {
            loop {
                if let Err(e) = mirror_state.tick().await {
                    tracing::warn!(conversation = %conversation, error = %e, "transcript mirror tick failed");
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        });

        tasks.insert(
            conversation_id.to_string(),
            ConversationTailers { events, mirror },
        );
    }

    pub fn stop(&self, conversation_id: &str) {
        if let Some(tailers) = self
            .tasks
            .lock()
            .expect("tailer tasks lock poisoned")
            .remove(conversation_id)
        {
            tailers.events.abort();
            tailers.mirror.abort();
        }
    }

    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock().expect("tailer tasks lock poisoned");
        for (_, tailers) in tasks.drain() {
            tailers.events.abort();
            tailers.mirror.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{BlockRecord, BlockStatus};
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn block(conversation: &str, seq: u64) -> BlockRecord {
        BlockRecord {
            block_id: BlockRecord::make_id(conversation, seq, 1000),
            conversation_id: conversation.to_string(),
            seq,
            ts_begin: 1000,
            ts_end: Some(1100),
            cwd: "/tmp".to_string(),
            cmd: "echo hi".to_string(),
            status: BlockStatus::Completed,
            exit_code: Some(0),
            output_path: None,
        }
    }

    async fn append_event(path: &std::path::Path, event: &UiEvent) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .unwrap();
        let mut line = serde_json::to_string(event).unwrap();
        line.push('\n');
        file.write_all(line.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn mirror_translates_block_events() {
        let dir = TempDir::new().unwrap();
        let layout = AgentPtyLayout::new(dir.path(), "c1");
        let transcript = Arc::new(TranscriptWriter::new(dir.path().to_path_buf()));

        let begin = UiEvent::AgentBlockBegin {
            conversation_id: "c1".to_string(),
            block: block("c1", 1),
        };
        let delta = UiEvent::AgentBlockDelta {
            conversation_id: "c1".to_string(),
            block_id: "c1:1:1000".to_string(),
            delta: "hi\n".to_string(),
        };
        append_event(&layout.events_path(), &begin).await;
        append_event(&layout.events_path(), &delta).await;

        let mut mirror = TranscriptMirror::new("c1", &layout, transcript.clone());
        assert_eq!(mirror.tick().await.unwrap(), 2);

        let rows = transcript.read_all("c1").await.unwrap();
        assert_eq!(rows.len(), 2);
        match &rows[1].entry {
            TranscriptEntry::AgentPty { event, delta, .. } => {
                assert_eq!(event, "agent_block_delta");
                assert_eq!(delta.as_deref(), Some("hi\n"));
            }
            other => panic!("unexpected row: {other:?}"),
        }

        // Nothing new: no extra rows, offset stable.
        assert_eq!(mirror.tick().await.unwrap(), 0);
        assert_eq!(transcript.read_all("c1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mirror_offset_survives_restart() {
        let dir = TempDir::new().unwrap();
        let layout = AgentPtyLayout::new(dir.path(), "c1");
        let transcript = Arc::new(TranscriptWriter::new(dir.path().to_path_buf()));

        append_event(
            &layout.events_path(),
            &UiEvent::AgentBlockBegin {
                conversation_id: "c1".to_string(),
                block: block("c1", 1),
            },
        )
        .await;

        {
            let mut mirror = TranscriptMirror::new("c1", &layout, transcript.clone());
            assert_eq!(mirror.tick().await.unwrap(), 1);
        }

        // New process: a fresh mirror (fresh dedup state too) resumes from
        // the persisted offset and replays nothing.
        let transcript2 = Arc::new(TranscriptWriter::new(dir.path().to_path_buf()));
        let mut mirror = TranscriptMirror::new("c1", &layout, transcript2.clone());
        assert_eq!(mirror.tick().await.unwrap(), 0);
        assert_eq!(transcript2.read_all("c1").await.unwrap().len(), 1);

        // New events after restart flow through exactly once.
        append_event(
            &layout.events_path(),
            &UiEvent::AgentBlockEnd {
                conversation_id: "c1".to_string(),
                block: block("c1", 1),
            },
        )
        .await;
        assert_eq!(mirror.tick().await.unwrap(), 1);
        assert_eq!(transcript2.read_all("c1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mirror_resets_on_truncation() {
        let dir = TempDir::new().unwrap();
        let layout = AgentPtyLayout::new(dir.path(), "c1");
        let transcript = Arc::new(TranscriptWriter::new(dir.path().to_path_buf()));

        append_event(
            &layout.events_path(),
            &UiEvent::AgentBlockBegin {
                conversation_id: "c1".to_string(),
                block: block("c1", 1),
            },
        )
        .await;
        let mut mirror = TranscriptMirror::new("c1", &layout, transcript.clone());
        mirror.tick().await.unwrap();

        // Truncate and write a shorter file.
        tokio::fs::write(&layout.events_path(), b"").await.unwrap();
        append_event(
            &layout.events_path(),
            &UiEvent::AgentBlockBegin {
                conversation_id: "c1".to_string(),
                block: block("c1", 2),
            },
        )
        .await;
        assert_eq!(mirror.tick().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn events_tailer_rebroadcasts_to_hub() {
        let dir = TempDir::new().unwrap();
        let layout = AgentPtyLayout::new(dir.path(), "c1");
        let transcript = Arc::new(TranscriptWriter::new(dir.path().to_path_buf()));
        let hub = Arc::new(EventHub::new(transcript.clone()));
        let mut rx = hub.subscribe();

        let tailers = Tailers::new(dir.path().to_path_buf(), hub, transcript);
        tailers.ensure("c1");

        append_event(
            &layout.events_path(),
            &UiEvent::AgentBlockDelta {
                conversation_id: "c1".to_string(),
                block_id: "c1:1:1000".to_string(),
                delta: "out\n".to_string(),
            },
        )
        .await;

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("tailer never broadcast")
            .unwrap();
        assert!(matches!(event, UiEvent::AgentBlockDelta { delta, .. } if delta == "out\n"));
        tailers.stop_all();
    }
}
