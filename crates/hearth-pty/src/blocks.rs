//! The block index: `blocks.jsonl` and its query surface
//!
//! One line is appended per finished block (completed or interactive-end).
//! Queries read the whole file; conversations are human-scale and the
//! index stays small.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use hearth_core::BlockRecord;

use crate::error::{PtyError, Result};

const MAX_LIST_LIMIT: usize = 200;
const MAX_READ_BYTES: u64 = 512 * 1024;

/// A page of index rows plus the cursor to resume from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksPage {
    pub items: Vec<BlockRecord>,
    pub cursor: u64,
    pub next_cursor: u64,
}

/// One line match from `search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based line number in the block output
    pub line: usize,
    pub text: String,
}

/// Append/query handle over one conversation's `blocks.jsonl`
pub struct BlockIndex {
    path: PathBuf,
}

impl BlockIndex {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one finished block as a JSONL row.
    pub async fn append(&self, record: &BlockRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// List blocks appended at or after a byte cursor into the index file.
    /// Rows that fail to parse are skipped; the cursor still advances past
    /// them.
    pub async fn since(&self, cursor: u64, limit: usize) -> Result<BlocksPage> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BlocksPage {
                    items: Vec::new(),
                    cursor: 0,
                    next_cursor: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let cursor = cursor.min(data.len() as u64);
        let tail = &data[cursor as usize..];
        let lines: Vec<&[u8]> = tail.split(|&b| b == b'\n').take(limit).collect();
        let mut items = Vec::new();
        let mut consumed = 0usize;
        let mut taken = 0usize;
        for line in &lines {
            if line.is_empty() && consumed + 1 >= tail.len() {
                break;
            }
            consumed += line.len();
            taken += 1;
            if let Ok(record) = serde_json::from_slice::<BlockRecord>(line) {
                items.push(record);
            }
        }
        // Account for the newline separators between consumed lines.
        if taken > 0 {
            consumed += taken - 1;
            // Step past the trailing newline of the last consumed line, if
            // it exists in the file.
            if (cursor as usize) + consumed < data.len() {
                consumed += 1;
            }
        }
        Ok(BlocksPage {
            items,
            cursor,
            next_cursor: cursor + consumed as u64,
        })
    }

    /// Latest index row for a block id, scanning from the end.
    pub async fn get(&self, block_id: &str) -> Result<BlockRecord> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PtyError::BlockNotFound(block_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        for line in data.lines().rev() {
            if let Ok(record) = serde_json::from_str::<BlockRecord>(line) {
                if record.block_id == block_id {
                    return Ok(record);
                }
            }
        }
        Err(PtyError::BlockNotFound(block_id.to_string()))
    }

    /// Raw output bytes for a block, addressed by offset.
    pub async fn read_output(
        &self,
        block_id: &str,
        offset: u64,
        max_bytes: u64,
    ) -> Result<(String, u64, u64)> {
        let record = self.get(block_id).await?;
        let out_path = record
            .output_path
            .ok_or_else(|| PtyError::OutputMissing(block_id.to_string()))?;
        let data = tokio::fs::read(&out_path)
            .await
            .map_err(|_| PtyError::OutputMissing(block_id.to_string()))?;
        let max_bytes = max_bytes.clamp(1, MAX_READ_BYTES) as usize;
        let offset = offset.min(data.len() as u64) as usize;
        let end = (offset + max_bytes).min(data.len());
        let chunk = &data[offset..end];
        Ok((
            String::from_utf8_lossy(chunk).into_owned(),
            offset as u64,
            end as u64,
        ))
    }

    /// Substring search over a block's output lines.
    pub async fn search(
        &self,
        block_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let record = self.get(block_id).await?;
        let out_path = record
            .output_path
            .ok_or_else(|| PtyError::OutputMissing(block_id.to_string()))?;
        let text = tokio::fs::read_to_string(&out_path)
            .await
            .map_err(|_| PtyError::OutputMissing(block_id.to_string()))?;
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let mut hits = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.contains(query) {
                hits.push(SearchHit {
                    line: i + 1,
                    text: line.to_string(),
                });
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }
}
