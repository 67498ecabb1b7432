//! Transcript writer: append-only semantic history with idempotent rows
//!
//! One JSON object per line in `transcript.jsonl`. Rows that carry an
//! `item_id` are deduplicated in process memory by
//! `(conversation_id, item_id, role)`, so a router finalizing twice (e.g.
//! after a reconnect) appends exactly one line.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use hearth_core::{TranscriptEntry, TranscriptRow};

use crate::error::Result;

/// Writes transcript rows for every conversation under one base dir
pub struct TranscriptWriter {
    conversations_dir: PathBuf,
    write_lock: Mutex<()>,
    seen: StdMutex<HashSet<(String, String, String)>>,
}

impl TranscriptWriter {
    pub fn new(conversations_dir: PathBuf) -> Self {
        Self {
            conversations_dir,
            write_lock: Mutex::new(()),
            seen: StdMutex::new(HashSet::new()),
        }
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.conversations_dir
            .join(hearth_core::util::sanitize_conversation_id(conversation_id))
            .join("transcript.jsonl")
    }

    /// Append one row. Returns `false` when the row was suppressed as a
    /// duplicate.
    pub async fn append(&self, conversation_id: &str, entry: TranscriptEntry) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if let Some(item_id) = entry.item_id() {
            let key = (
                conversation_id.to_string(),
                item_id.to_string(),
                entry.role().to_string(),
            );
            let mut seen = self.seen.lock().expect("transcript seen lock poisoned");
            if !seen.insert(key) {
                return Ok(false);
            }
        }
        let row = TranscriptRow::new(entry);
        let mut line = serde_json::to_string(&row)?;
        line.push('\n');
        let path = self.path_for(conversation_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(true)
    }

    /// Read the full transcript for replay; malformed lines are skipped.
    pub async fn read_all(&self, conversation_id: &str) -> Result<Vec<TranscriptRow>> {
        let path = self.path_for(conversation_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
