//! Event sink that records everything for assertions

use std::sync::Mutex;

use async_trait::async_trait;

use hearth_core::{EventSink, TranscriptEntry, UiEvent};

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<UiEvent>>,
    pub rows: Mutex<Vec<(String, TranscriptEntry)>>,
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn broadcast(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }

    async fn append_transcript(&self, conversation_id: &str, entry: TranscriptEntry) {
        self.rows
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), entry));
    }
}

impl CollectingSink {
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| {
                serde_json::to_value(e).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }
}
