//! Ring buffer of raw protocol lines
//!
//! Every raw line in or out of an agent process is recorded here,
//! truncated, timestamped, and bounded. Purely diagnostic: the buffer is
//! never a source of truth.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use hearth_core::util::utc_ts;

/// Default ring capacity
pub const RAW_RING_CAPACITY: usize = 200;
/// Per-entry payload truncation
const MAX_DATA_LEN: usize = 500;

/// Direction of a recorded line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawDirection {
    In,
    Out,
}

/// One recorded line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub ts: String,
    pub dir: RawDirection,
    /// First 8 chars of the conversation id
    pub convo: String,
    pub data: String,
}

/// Bounded FIFO of raw protocol lines
pub struct RawRing {
    entries: Mutex<VecDeque<RawEntry>>,
    capacity: usize,
}

impl RawRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, dir: RawDirection, conversation_id: &str, data: &str) {
        let convo = if conversation_id.is_empty() {
            "?".to_string()
        } else {
            conversation_id.chars().take(8).collect()
        };
        let data = if data.len() > MAX_DATA_LEN {
            let mut end = MAX_DATA_LEN;
            while !data.is_char_boundary(end) {
                end -= 1;
            }
            data[..end].to_string()
        } else {
            data.to_string()
        };
        let mut entries = self.entries.lock().expect("raw ring lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(RawEntry {
            ts: utc_ts(),
            dir,
            convo,
            data,
        });
    }

    /// The last `limit` entries, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<RawEntry> {
        let entries = self.entries.lock().expect("raw ring lock poisoned");
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }
}

impl Default for RawRing {
    fn default() -> Self {
        Self::new(RAW_RING_CAPACITY)
    }
}
