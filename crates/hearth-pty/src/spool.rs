//! The output spool: one append-only file per conversation
//!
//! Every byte a conversation's shell produces lands here, newline-normalized
//! (`\r\n` and lone `\r` become `\n`). Readers address the spool by byte
//! cursor; a reader that advances its cursor monotonically never misses a
//! byte and never sees one twice.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::Result;

/// Default read window for spool reads
pub const DEFAULT_READ_MAX: u64 = 64 * 1024;
/// Hard cap per read request
pub const READ_HARD_CAP: u64 = 512 * 1024;

/// Normalize line endings: `\r\n` and lone `\r` become `\n`.
pub fn normalize_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' {
            out.push(b'\n');
            if i + 1 < data.len() && data[i + 1] == b'\n' {
                i += 1;
            }
        } else {
            out.push(data[i]);
        }
        i += 1;
    }
    out
}

struct SpoolState {
    size: u64,
    opened: bool,
}

/// Append-only byte log with cursor-addressed reads
pub struct Spool {
    path: PathBuf,
    state: Mutex<SpoolState>,
}

impl Spool {
    /// The file is opened lazily; an existing file's length seeds the
    /// cursor space so restarts never reuse offsets.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(SpoolState {
                size: 0,
                opened: false,
            }),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn ensure_open(&self, state: &mut SpoolState) -> Result<()> {
        if state.opened {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => state.size = meta.len(),
            Err(_) => {
                tokio::fs::write(&self.path, b"").await?;
                state.size = 0;
            }
        }
        state.opened = true;
        Ok(())
    }

    /// Append normalized bytes; returns the new length (the cursor just
    /// past the written data). Visible to `read` as soon as this returns.
    pub async fn append(&self, data: &[u8]) -> Result<u64> {
        let mut state = self.state.lock().await;
        self.ensure_open(&mut state).await?;
        let normalized = normalize_newlines(data);
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(&normalized).await?;
        file.flush().await?;
        state.size += normalized.len() as u64;
        Ok(state.size)
    }

    /// Read up to `max_bytes` from `from_cursor`; returns the data and
    /// `next_cursor = from_cursor + len(data)`. A cursor past the end
    /// clamps to the end and yields empty data.
    pub async fn read(&self, from_cursor: u64, max_bytes: u64) -> Result<(Vec<u8>, u64)> {
        let mut state = self.state.lock().await;
        self.ensure_open(&mut state).await?;
        if from_cursor >= state.size {
            return Ok((Vec::new(), state.size));
        }
        let to_read = max_bytes.min(state.size - from_cursor);
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(from_cursor)).await?;
        let mut buf = vec![0u8; to_read as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        let next = from_cursor + buf.len() as u64;
        Ok((buf, next))
    }

    /// Current spool length in bytes.
    pub async fn size(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        self.ensure_open(&mut state).await?;
        Ok(state.size)
    }
}
