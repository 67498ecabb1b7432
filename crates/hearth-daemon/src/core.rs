//! The `Core` value: every subsystem, wired once at startup
//!
//! No package-level mutable state anywhere in the workspace; handlers
//! receive a `Core` (usually as `Arc<Core>`) and reach everything through
//! it. Upward flows go through the hub's `EventSink` interface, so no
//! subsystem holds a back-pointer into another.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use hearth_acp::mux::{AcpManager, SessionInfo, SessionMetaHook, WARMUP_TIMEOUT};
use hearth_core::ShellSupervisor;
use hearth_pty::PtyManager;

use crate::error::Result;
use crate::hub::EventHub;
use crate::store::{ConversationMeta, ConversationStore};
use crate::tailer::Tailers;
use crate::transcript::TranscriptWriter;

const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

/// Startup configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Application data root; conversations live under
    /// `<base_dir>/conversations/`
    pub base_dir: PathBuf,
    /// Directory holding `extensions.json` and extension manifests
    pub extensions_dir: PathBuf,
}

impl CoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        let extensions_dir = base_dir.join("extensions");
        Self {
            base_dir,
            extensions_dir,
        }
    }

    pub fn with_extensions_dir(mut self, extensions_dir: PathBuf) -> Self {
        self.extensions_dir = extensions_dir;
        self
    }
}

/// Persists the agent session id onto conversation meta when a session
/// binds.
struct BindThreadId {
    store: Arc<ConversationStore>,
}

#[async_trait]
impl SessionMetaHook for BindThreadId {
    async fn on_session_bound(&self, conversation_id: &str, session_id: &str) {
        if let Err(e) = self.store.bind_thread_id(conversation_id, session_id).await {
            tracing::warn!(conversation = %conversation_id, error = %e, "thread id bind failed");
        }
    }
}

/// All subsystems of one orchestrator process
pub struct Core {
    config: CoreConfig,
    store: Arc<ConversationStore>,
    transcript: Arc<TranscriptWriter>,
    hub: Arc<EventHub>,
    pty: PtyManager,
    acp: Arc<AcpManager>,
    tailers: Tailers,
    monitor: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Core {
    pub fn new(config: CoreConfig, supervisor: Arc<dyn ShellSupervisor>) -> Arc<Self> {
        let store = Arc::new(ConversationStore::new(&config.base_dir));
        let conversations_dir = store.conversations_dir().to_path_buf();
        let transcript = Arc::new(TranscriptWriter::new(conversations_dir.clone()));
        let hub = Arc::new(EventHub::new(transcript.clone()));
        let acp = Arc::new(
            AcpManager::new(
                config.extensions_dir.clone(),
                supervisor.clone(),
                hub.clone(),
            )
            .with_meta_hook(Arc::new(BindThreadId {
                store: store.clone(),
            })),
        );
        let pty = PtyManager::new(conversations_dir.clone(), supervisor);
        let tailers = Tailers::new(conversations_dir, hub.clone(), transcript.clone());
        Arc::new(Self {
            config,
            store,
            transcript,
            hub,
            pty,
            acp,
            tailers,
            monitor: StdMutex::new(None),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn transcript(&self) -> &Arc<TranscriptWriter> {
        &self.transcript
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn pty(&self) -> &PtyManager {
        &self.pty
    }

    pub fn acp(&self) -> &Arc<AcpManager> {
        &self.acp
    }

    /// Load extension manifests; call once at startup.
    pub fn load_extensions(&self) -> Result<usize> {
        Ok(self.acp.load_extensions()?)
    }

    /// Create-or-load a conversation and make sure its tailers run.
    pub async fn ensure_conversation(&self, conversation_id: &str) -> Result<ConversationMeta> {
        let meta = self.store.ensure(conversation_id).await?;
        self.tailers.ensure(conversation_id);
        Ok(meta)
    }

    /// Main entry for an ACP-backed conversation message: initialize the
    /// session on first use, then send the prompt.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        extension_id: &str,
        cwd: &std::path::Path,
        text: &str,
    ) -> Result<SessionInfo> {
        self.ensure_conversation(conversation_id).await?;
        if self.acp.get_session(conversation_id).is_none() {
            self.acp
                .init_session(conversation_id, extension_id, cwd)
                .await?;
        }
        Ok(self.acp.send_prompt(conversation_id, text).await?)
    }

    /// Warm every registered extension (concurrently).
    pub async fn warm_up_all(&self) -> std::collections::HashMap<String, bool> {
        self.acp.warm_up_all(WARMUP_TIMEOUT).await
    }

    /// Keep tailers alive for every known conversation.
    pub fn start_monitor(self: &Arc<Self>) {
        let mut monitor = self.monitor.lock().expect("monitor lock poisoned");
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let core = self.clone();
        *monitor = Some(tokio::spawn(async move {
            loop {
                match core.store.list().await {
                    Ok(ids) => {
                        for id in ids {
                            core.tailers.ensure(&id);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "conversation scan failed"),
                }
                tokio::time::sleep(MONITOR_INTERVAL).await;
            }
        }));
    }

    /// Stop tasks and detach from shells. Shared agent shells are left
    /// running under the supervisor.
    pub async fn shutdown(&self) {
        if let Some(task) = self.monitor.lock().expect("monitor lock poisoned").take() {
            task.abort();
        }
        self.tailers.stop_all();
        self.acp.close_all();
        self.pty.close_all().await;
    }
}
