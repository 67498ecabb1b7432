//! Broadcast hub: the single fan-out point for live subscribers
//!
//! Subscribers (the out-of-scope WebSocket layer, the CLI `tail` command,
//! tests) each hold a receiver; a slow subscriber lags and loses the
//! oldest events rather than stalling producers. Durable history is the
//! transcript and the JSONL logs, never this channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use hearth_core::{EventSink, TranscriptEntry, UiEvent};

use crate::transcript::TranscriptWriter;

const HUB_CAPACITY: usize = 1024;

/// Event fan-out plus the transcript sink, as one [`EventSink`]
pub struct EventHub {
    tx: broadcast::Sender<UiEvent>,
    transcript: Arc<TranscriptWriter>,
}

impl EventHub {
    pub fn new(transcript: Arc<TranscriptWriter>) -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx, transcript }
    }

    /// Attach a live subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    pub fn transcript(&self) -> Arc<TranscriptWriter> {
        self.transcript.clone()
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn broadcast(&self, event: UiEvent) {
        // No receivers is fine; events are also durable via the logs.
        let _ = self.tx.send(event);
    }

    async fn append_transcript(&self, conversation_id: &str, entry: TranscriptEntry) {
        if let Err(e) = self.transcript.append(conversation_id, entry).await {
            tracing::warn!(conversation = %conversation_id, error = %e, "transcript append failed");
        }
    }
}
