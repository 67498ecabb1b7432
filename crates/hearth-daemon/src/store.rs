//! Conversation store: the on-disk registry of conversations
//!
//! Each conversation owns a directory `<base>/conversations/<id>/` holding
//! `meta.json`, `transcript.jsonl` and the `agent_pty/` subtree. Meta is
//! created on first use with status `draft` and flips to `active` once a
//! backing agent session exists.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hearth_core::util::{sanitize_conversation_id, utc_ts};

use crate::error::{DaemonError, Result};

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Draft,
    Active,
}

/// Contents of `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub conversation_id: String,
    pub created_at: String,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
    pub status: ConversationStatus,
}

impl ConversationMeta {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            created_at: utc_ts(),
            thread_id: None,
            settings: serde_json::json!({}),
            status: ConversationStatus::Draft,
        }
    }
}

/// Registry of conversation directories under one base dir
pub struct ConversationStore {
    conversations_dir: PathBuf,
}

impl ConversationStore {
    /// `base_dir` is the application data root; conversations live in
    /// `<base_dir>/conversations/`.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            conversations_dir: base_dir.join("conversations"),
        }
    }

    pub fn conversations_dir(&self) -> &Path {
        &self.conversations_dir
    }

    pub fn conversation_dir(&self, conversation_id: &str) -> PathBuf {
        self.conversations_dir
            .join(sanitize_conversation_id(conversation_id))
    }

    pub fn meta_path(&self, conversation_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id).join("meta.json")
    }

    pub fn transcript_path(&self, conversation_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id).join("transcript.jsonl")
    }

    /// Load meta, creating the conversation with defaults on first use.
    pub async fn ensure(&self, conversation_id: &str) -> Result<ConversationMeta> {
        if let Some(meta) = self.load_meta(conversation_id).await? {
            return Ok(meta);
        }
        let meta = ConversationMeta::new(conversation_id);
        self.save_meta(conversation_id, &meta).await?;
        tracing::info!(conversation = %conversation_id, "created conversation");
        Ok(meta)
    }

    pub async fn load_meta(&self, conversation_id: &str) -> Result<Option<ConversationMeta>> {
        let path = self.meta_path(conversation_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw).map_err(|e| {
                DaemonError::ConversationUnavailable(format!(
                    "{conversation_id}: malformed meta.json: {e}"
                ))
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_meta(&self, conversation_id: &str, meta: &ConversationMeta) -> Result<()> {
        let path = self.meta_path(conversation_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(meta)?;
        tokio::fs::write(&path, raw).await?;
        Ok(())
    }

    /// Bind the agent session id as the conversation's thread id and mark
    /// the conversation active. Never overwrites an existing thread id.
    pub async fn bind_thread_id(&self, conversation_id: &str, thread_id: &str) -> Result<()> {
        let mut meta = self.ensure(conversation_id).await?;
        if meta.thread_id.is_none() {
            meta.thread_id = Some(thread_id.to_string());
            meta.status = ConversationStatus::Active;
            self.save_meta(conversation_id, &meta).await?;
        }
        Ok(())
    }

    /// Conversation ids found on disk (directories with a `meta.json`).
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.conversations_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if entry.path().join("meta.json").exists() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<String>> {
        for id in self.list().await? {
            if let Some(meta) = self.load_meta(&id).await? {
                if meta.thread_id.as_deref() == Some(thread_id) {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_creates_draft_meta() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        let meta = store.ensure("c1").await.unwrap();
        assert_eq!(meta.conversation_id, "c1");
        assert_eq!(meta.status, ConversationStatus::Draft);
        assert!(meta.thread_id.is_none());
        assert!(store.meta_path("c1").exists());

        // Idempotent: second ensure loads the same meta.
        let again = store.ensure("c1").await.unwrap();
        assert_eq!(again.created_at, meta.created_at);
    }

    #[tokio::test]
    async fn bind_thread_id_activates_once() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        store.ensure("c1").await.unwrap();
        store.bind_thread_id("c1", "sess-1").await.unwrap();

        let meta = store.load_meta("c1").await.unwrap().unwrap();
        assert_eq!(meta.thread_id.as_deref(), Some("sess-1"));
        assert_eq!(meta.status, ConversationStatus::Active);

        // A second bind does not overwrite.
        store.bind_thread_id("c1", "sess-2").await.unwrap();
        let meta = store.load_meta("c1").await.unwrap().unwrap();
        assert_eq!(meta.thread_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn list_and_find_by_thread_id() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        store.ensure("alpha").await.unwrap();
        store.ensure("beta").await.unwrap();
        store.bind_thread_id("beta", "t-9").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta"]);
        assert_eq!(
            store.find_by_thread_id("t-9").await.unwrap().as_deref(),
            Some("beta")
        );
        assert!(store.find_by_thread_id("t-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_are_sanitized_for_paths() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        store.ensure("weird/../id").await.unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec!["weird_.._id"]);
    }
}
