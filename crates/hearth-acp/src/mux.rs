//! ACP multiplexer: one shared agent process per extension, many sessions
//!
//! Agent processes are slow to start (tens of seconds for Node-based
//! agents), so the first-start cost is paid once per server lifetime:
//!
//! 1. Warmup spawns the process under a synthetic conversation id and
//!    completes `initialize` only (the real cwd is unknown until a
//!    conversation binds).
//! 2. The first real session promotes the warmup shell to the shared
//!    shell for its extension.
//! 3. Every conversation gets its own ACP session (`session/new` with its
//!    own cwd) inside the shared process, with its own router and reader
//!    task. Concurrent turns on one process are disambiguated by
//!    `sessionId`.
//!
//! Session creation is serialized per extension, so the fixed `id=2`
//! `session/new` response is always unambiguous. Prompt responses are
//! correlated against the exact ids each session issued.
//!
//! Closing a session never kills the shared shell; shells outlive
//! sessions.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use hearth_core::manifest::{load_extension_manifest, load_extensions_index};
use hearth_core::util::now_ms;
use hearth_core::{AcpExtension, EventSink, PipeWriter, ShellId, ShellSupervisor};

use crate::debug::{RawDirection, RawRing};
use crate::error::{AcpError, Result};
use crate::router::EventRouter;
use crate::wire::{self, Incoming, LineFramer};

/// Warmup / handshake ceiling
pub const WARMUP_TIMEOUT: Duration = Duration::from_secs(60);
/// How long to poll for the `session/new` result before failing
const SESSION_ID_TIMEOUT: Duration = Duration::from_secs(3);
const SESSION_ID_POLL: Duration = Duration::from_millis(100);

/// Notifier for session binding (persisting `thread_id` on the
/// conversation meta lives above this crate).
#[async_trait]
pub trait SessionMetaHook: Send + Sync {
    async fn on_session_bound(&self, conversation_id: &str, session_id: &str);
}

/// Outcome of `init_session`
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub already_initialized: bool,
}

/// One logical ACP session bound to a conversation
pub struct AcpSession {
    pub conversation_id: String,
    pub extension_id: String,
    pub shell_id: ShellId,
    pub cwd: PathBuf,
    router: Arc<EventRouter>,
    writer: PipeWriter,
    session_id: StdMutex<Option<String>>,
    ready: AtomicBool,
    pending_session_new: AtomicBool,
    pending_prompts: StdMutex<HashSet<i64>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl AcpSession {
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().expect("session lock poisoned").clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    fn bind_session_id(&self, session_id: &str) {
        *self.session_id.lock().expect("session lock poisoned") = Some(session_id.to_string());
        self.pending_session_new.store(false, Ordering::SeqCst);
    }

    fn add_pending_prompt(&self, id: i64) {
        self.pending_prompts
            .lock()
            .expect("session lock poisoned")
            .insert(id);
    }

    fn take_pending_prompt(&self, id: i64) -> bool {
        self.pending_prompts
            .lock()
            .expect("session lock poisoned")
            .remove(&id)
    }
}

impl Drop for AcpSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().expect("session lock poisoned").take() {
            reader.abort();
        }
    }
}

/// Manager of extensions, shared agent processes and logical sessions
pub struct AcpManager {
    extensions_dir: PathBuf,
    supervisor: Arc<dyn ShellSupervisor>,
    sink: Arc<dyn EventSink>,
    ring: Arc<RawRing>,
    meta_hook: Option<Arc<dyn SessionMetaHook>>,
    extensions: StdMutex<HashMap<String, AcpExtension>>,
    sessions: StdMutex<HashMap<String, Arc<AcpSession>>>,
    shared_shells: StdMutex<HashMap<String, ShellId>>,
    warmup_shells: StdMutex<HashMap<String, ShellId>>,
    ready: StdMutex<HashMap<String, watch::Sender<bool>>>,
    creation_locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AcpManager {
    pub fn new(
        extensions_dir: PathBuf,
        supervisor: Arc<dyn ShellSupervisor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            extensions_dir,
            supervisor,
            sink,
            ring: Arc::new(RawRing::default()),
            meta_hook: None,
            extensions: StdMutex::new(HashMap::new()),
            sessions: StdMutex::new(HashMap::new()),
            shared_shells: StdMutex::new(HashMap::new()),
            warmup_shells: StdMutex::new(HashMap::new()),
            ready: StdMutex::new(HashMap::new()),
            creation_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Attach the hook that persists `thread_id` on session binding.
    pub fn with_meta_hook(mut self, hook: Arc<dyn SessionMetaHook>) -> Self {
        self.meta_hook = Some(hook);
        self
    }

    /// Load `extensions.json` and each enabled extension's manifest.
    pub fn load_extensions(&self) -> Result<usize> {
        let index_path = self.extensions_dir.join("extensions.json");
        if !index_path.exists() {
            tracing::info!(path = %index_path.display(), "no extensions.json; no agents registered");
            return Ok(0);
        }
        let index = load_extensions_index(&index_path)?;
        let mut loaded = 0;
        for entry in index.extensions {
            if !entry.enabled {
                continue;
            }
            if entry.kind != "acp" {
                tracing::warn!(id = %entry.id, kind = %entry.kind, "skipping unknown extension type");
                continue;
            }
            let manifest_path = self
                .extensions_dir
                .join(&entry.path)
                .join("manifest.json");
            if !manifest_path.exists() {
                tracing::warn!(id = %entry.id, path = %manifest_path.display(), "manifest missing");
                continue;
            }
            let manifest = load_extension_manifest(&manifest_path)?;
            let extension = AcpExtension::from_manifest(manifest, &entry.path)?;
            self.extensions
                .lock()
                .expect("extensions lock poisoned")
                .insert(extension.id.clone(), extension);
            loaded += 1;
        }
        tracing::info!(count = loaded, "loaded ACP extensions");
        Ok(loaded)
    }

    /// Register an extension directly (tests, programmatic setup).
    pub fn register_extension(&self, extension: AcpExtension) {
        self.extensions
            .lock()
            .expect("extensions lock poisoned")
            .insert(extension.id.clone(), extension);
    }

    pub fn get_extension(&self, extension_id: &str) -> Option<AcpExtension> {
        self.extensions
            .lock()
            .expect("extensions lock poisoned")
            .get(extension_id)
            .cloned()
    }

    pub fn list_extensions(&self) -> Vec<AcpExtension> {
        let mut list: Vec<AcpExtension> = self
            .extensions
            .lock()
            .expect("extensions lock poisoned")
            .values()
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn requires_eager_session_init(&self, extension_id: &str) -> bool {
        self.get_extension(extension_id)
            .map(|e| e.eager_session_init)
            .unwrap_or(false)
    }

    pub fn has_session(&self, conversation_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .contains_key(conversation_id)
    }

    pub fn get_session(&self, conversation_id: &str) -> Option<Arc<AcpSession>> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(conversation_id)
            .cloned()
    }

    /// Last raw protocol lines, oldest first.
    pub fn raw_buffer(&self, limit: usize) -> Vec<crate::debug::RawEntry> {
        self.ring.snapshot(limit)
    }

    pub fn is_ready(&self, extension_id: &str) -> bool {
        self.ready
            .lock()
            .expect("ready lock poisoned")
            .get(extension_id)
            .map(|tx| *tx.borrow())
            .unwrap_or(false)
    }

    /// Eagerly start an extension's agent process and complete the
    /// `initialize` handshake. Idempotent: a concurrent call awaits the
    /// in-flight warmup instead of spawning a second process. On timeout
    /// the process is left running so a retry can pick it up.
    pub async fn warm_up_extension(
        &self,
        extension_id: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let extension = self
            .get_extension(extension_id)
            .ok_or_else(|| AcpError::ExtensionNotFound(extension_id.to_string()))?;

        // Exactly one caller owns the handshake; everyone else joins the
        // in-flight warmup through the watch channel.
        enum Role {
            Owner(watch::Sender<bool>),
            Waiter(watch::Receiver<bool>),
        }
        let role = {
            let mut ready = self.ready.lock().expect("ready lock poisoned");
            match ready.get(extension_id) {
                Some(tx) => Role::Waiter(tx.subscribe()),
                None => {
                    let (tx, _) = watch::channel(false);
                    ready.insert(extension_id.to_string(), tx.clone());
                    Role::Owner(tx)
                }
            }
        };
        let ready_tx = match role {
            Role::Waiter(mut rx) => {
                if *rx.borrow() {
                    return Ok(true);
                }
                return Ok(tokio::time::timeout(timeout, rx.wait_for(|ready| *ready))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false));
            }
            Role::Owner(tx) => tx,
        };

        let warmup_conv = format!("__warmup__{extension_id}");
        // Reuse a warmup shell left over from a failed handshake.
        let shell_id = {
            let existing = self
                .warmup_shells
                .lock()
                .expect("warmup lock poisoned")
                .get(extension_id)
                .cloned();
            match existing {
                Some(id) => id,
                None => {
                    let label = format!("acp:{extension_id}:warmup");
                    let argv = extension.argv();
                    let id = self
                        .supervisor
                        .spawn_pipe(&argv, Some(&home_dir()), &extension.env, &label)
                        .await?;
                    self.warmup_shells
                        .lock()
                        .expect("warmup lock poisoned")
                        .insert(extension_id.to_string(), id.clone());
                    id
                }
            }
        };

        let mut output = self.supervisor.subscribe_output(&shell_id)?;
        let writer = self.supervisor.get_pipe_state(&shell_id)?;
        let init_line = serde_json::to_string(&wire::initialize_request())?;
        self.ring.push(RawDirection::Out, &warmup_conv, &init_line);
        writer.write_line(&init_line).await.map_err(AcpError::Io)?;
        tracing::info!(extension = %extension_id, shell_id = %shell_id, "warmup: sent initialize");

        let ring = self.ring.clone();
        let handshake = async {
            let mut framer = LineFramer::new();
            loop {
                match output.recv().await {
                    Ok(chunk) => {
                        if chunk.is_empty() {
                            ring.push(RawDirection::In, &warmup_conv, "[EOF]");
                            return false;
                        }
                        for line in framer.push(&chunk) {
                            if line.is_empty() {
                                continue;
                            }
                            ring.push(RawDirection::In, &warmup_conv, &line);
                            let Some(msg) = wire::parse_line(&line) else {
                                continue;
                            };
                            if let Some(Incoming::Response { id, result, .. }) =
                                wire::classify(&msg)
                            {
                                if id == json!(wire::INIT_REQUEST_ID) && result.is_some() {
                                    return true;
                                }
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return false,
                }
            }
        };

        match tokio::time::timeout(timeout, handshake).await {
            Ok(true) => {
                let _ = ready_tx.send(true);
                tracing::info!(extension = %extension_id, "warmup complete");
                Ok(true)
            }
            Ok(false) => {
                // Handshake failed outright; allow a retry to restart it.
                self.ready
                    .lock()
                    .expect("ready lock poisoned")
                    .remove(extension_id);
                Ok(false)
            }
            Err(_) => {
                tracing::warn!(extension = %extension_id, "warmup timed out; shell left running");
                self.ready
                    .lock()
                    .expect("ready lock poisoned")
                    .remove(extension_id);
                Ok(false)
            }
        }
    }

    /// Warm up every registered extension concurrently.
    pub async fn warm_up_all(&self, timeout: Duration) -> HashMap<String, bool> {
        let ids: Vec<String> = self.list_extensions().into_iter().map(|e| e.id).collect();
        let mut results = HashMap::new();
        let futures: Vec<_> = ids
            .iter()
            .map(|id| self.warm_up_extension(id, timeout))
            .collect();
        for (id, outcome) in ids.iter().zip(futures::future::join_all(futures).await) {
            results.insert(id.clone(), outcome.unwrap_or(false));
        }
        results
    }

    /// Wait for an extension to be ready, starting warmup if none is in
    /// flight.
    pub async fn wait_ready(&self, extension_id: &str, timeout: Duration) -> Result<bool> {
        let existing = {
            let ready = self.ready.lock().expect("ready lock poisoned");
            ready.get(extension_id).map(|tx| tx.subscribe())
        };
        match existing {
            Some(mut rx) => {
                if *rx.borrow() {
                    return Ok(true);
                }
                Ok(tokio::time::timeout(timeout, rx.wait_for(|r| *r))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false))
            }
            None => self.warm_up_extension(extension_id, timeout).await,
        }
    }

    fn creation_lock(&self, extension_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.creation_locks
            .lock()
            .expect("creation locks poisoned")
            .entry(extension_id.to_string())
            .or_default()
            .clone()
    }

    /// Initialize an ACP session for a conversation against the shared
    /// shell of `extension_id`, creating/promoting the shell as needed.
    pub async fn init_session(
        &self,
        conversation_id: &str,
        extension_id: &str,
        cwd: &Path,
    ) -> Result<SessionInfo> {
        if let Some(session) = self.get_session(conversation_id) {
            if let Some(session_id) = session.session_id() {
                return Ok(SessionInfo {
                    session_id,
                    already_initialized: true,
                });
            }
        }

        let cwd = absolutize(cwd);
        let creation_lock = self.creation_lock(extension_id);
        let _creation = creation_lock.lock().await;

        // Resolve the shared shell, promoting a warmup shell when ready.
        let shell_id = {
            let shared = self
                .shared_shells
                .lock()
                .expect("shared lock poisoned")
                .get(extension_id)
                .cloned();
            match shared {
                Some(id) => id,
                None => {
                    if !self.is_ready(extension_id)
                        && !self.wait_ready(extension_id, WARMUP_TIMEOUT).await?
                    {
                        return Err(AcpError::Timeout(format!(
                            "{extension_id} agent failed to start"
                        )));
                    }
                    let warm = self
                        .warmup_shells
                        .lock()
                        .expect("warmup lock poisoned")
                        .get(extension_id)
                        .cloned()
                        .ok_or_else(|| {
                            AcpError::SessionNotReady(format!(
                                "no shell available for {extension_id}"
                            ))
                        })?;
                    self.shared_shells
                        .lock()
                        .expect("shared lock poisoned")
                        .insert(extension_id.to_string(), warm.clone());
                    tracing::info!(
                        extension = %extension_id,
                        shell_id = %warm,
                        "promoted warmup shell to shared"
                    );
                    warm
                }
            }
        };

        let writer = self.supervisor.get_pipe_state(&shell_id)?;
        let router = Arc::new(EventRouter::new(
            conversation_id,
            self.sink.clone(),
            Some(writer.clone()),
            self.ring.clone(),
        ));
        let session = Arc::new(AcpSession {
            conversation_id: conversation_id.to_string(),
            extension_id: extension_id.to_string(),
            shell_id: shell_id.clone(),
            cwd: cwd.clone(),
            router,
            writer: writer.clone(),
            session_id: StdMutex::new(None),
            ready: AtomicBool::new(false),
            pending_session_new: AtomicBool::new(false),
            pending_prompts: StdMutex::new(HashSet::new()),
            reader: StdMutex::new(None),
        });
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .insert(conversation_id.to_string(), session.clone());

        let output = self.supervisor.subscribe_output(&shell_id)?;
        let reader = tokio::spawn(session_reader(
            session.clone(),
            output,
            self.ring.clone(),
            self.meta_hook.clone(),
        ));
        *session.reader.lock().expect("session lock poisoned") = Some(reader);

        // session/new with the conversation's real cwd.
        session.pending_session_new.store(true, Ordering::SeqCst);
        let request = wire::session_new_request(&cwd.display().to_string());
        let line = serde_json::to_string(&request)?;
        self.ring.push(RawDirection::Out, conversation_id, &line);
        writer.write_line(&line).await.map_err(AcpError::Io)?;
        tracing::info!(conversation = %conversation_id, cwd = %cwd.display(), "sent session/new");

        let deadline = tokio::time::Instant::now() + SESSION_ID_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SESSION_ID_POLL).await;
            if let Some(session_id) = session.session_id() {
                session.ready.store(true, Ordering::SeqCst);
                return Ok(SessionInfo {
                    session_id,
                    already_initialized: false,
                });
            }
        }
        Err(AcpError::Timeout(
            "waiting for session id from session/new".to_string(),
        ))
    }

    /// Send one prompt on an initialized session. Emits the turn-start
    /// events before the request is written, so `turn_started` precedes
    /// every delta of the turn.
    pub async fn send_prompt(&self, conversation_id: &str, text: &str) -> Result<SessionInfo> {
        let session = self
            .get_session(conversation_id)
            .ok_or_else(|| AcpError::SessionNotFound(conversation_id.to_string()))?;

        // The session may still be capturing its session id.
        let deadline = tokio::time::Instant::now() + SESSION_ID_TIMEOUT;
        let session_id = loop {
            if let Some(id) = session.session_id() {
                break id;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AcpError::SessionNotReady(conversation_id.to_string()));
            }
            tokio::time::sleep(SESSION_ID_POLL).await;
        };

        session.router.on_turn_start(text).await;

        let id = now_ms() as i64;
        session.add_pending_prompt(id);
        let request = wire::session_prompt_request(id, &session_id, text);
        let line = serde_json::to_string(&request)?;
        self.ring.push(RawDirection::Out, conversation_id, &line);
        session.writer.write_line(&line).await.map_err(AcpError::Io)?;
        Ok(SessionInfo {
            session_id,
            already_initialized: true,
        })
    }

    /// Cancel the in-flight prompt; the agent answers the prompt request
    /// with `stopReason = cancelled`.
    pub async fn cancel_prompt(&self, conversation_id: &str) -> Result<()> {
        let session = self
            .get_session(conversation_id)
            .ok_or_else(|| AcpError::SessionNotFound(conversation_id.to_string()))?;
        let session_id = session
            .session_id()
            .ok_or_else(|| AcpError::SessionNotReady(conversation_id.to_string()))?;
        let line = serde_json::to_string(&wire::session_cancel_notification(&session_id))?;
        self.ring.push(RawDirection::Out, conversation_id, &line);
        session.writer.write_line(&line).await.map_err(AcpError::Io)?;
        Ok(())
    }

    /// Drop a conversation's session and stop its reader. The shared
    /// shell stays up for the extension's other sessions.
    pub fn close_session(&self, conversation_id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(conversation_id);
        match removed {
            Some(session) => {
                if let Some(reader) = session
                    .reader
                    .lock()
                    .expect("session lock poisoned")
                    .take()
                {
                    reader.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .keys()
            .cloned()
            .collect();
        for id in ids {
            self.close_session(&id);
        }
    }
}

/// Reader task for one session: frames lines off the shared shell's
/// output, filters by session, answers requests through the router, and
/// correlates responses against the ids this session issued.
async fn session_reader(
    session: Arc<AcpSession>,
    mut output: hearth_core::OutputRx,
    ring: Arc<RawRing>,
    meta_hook: Option<Arc<dyn SessionMetaHook>>,
) {
    let conversation_id = session.conversation_id.clone();
    let mut framer = LineFramer::new();
    loop {
        match output.recv().await {
            Ok(chunk) => {
                if chunk.is_empty() {
                    ring.push(RawDirection::In, &conversation_id, "[EOF]");
                    tracing::info!(conversation = %conversation_id, "agent stream EOF");
                    break;
                }
                for line in framer.push(&chunk) {
                    if line.is_empty() {
                        continue;
                    }
                    ring.push(RawDirection::In, &conversation_id, &line);
                    let Some(msg) = wire::parse_line(&line) else {
                        continue;
                    };
                    let Some(incoming) = wire::classify(&msg) else {
                        continue;
                    };
                    dispatch(&session, &meta_hook, incoming).await;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(conversation = %conversation_id, missed, "acp reader lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn dispatch(
    session: &Arc<AcpSession>,
    meta_hook: &Option<Arc<dyn SessionMetaHook>>,
    incoming: Incoming,
) {
    match incoming {
        Incoming::Response { id, result, error } => {
            // session/new capture: unambiguous because creation is
            // serialized per extension.
            if session.pending_session_new.load(Ordering::SeqCst)
                && id == json!(wire::SESSION_NEW_REQUEST_ID)
            {
                if let Some(result) = &result {
                    if let Some(session_id) = result.get("sessionId").and_then(Value::as_str) {
                        session.bind_session_id(session_id);
                        tracing::info!(
                            conversation = %session.conversation_id,
                            session_id,
                            "captured session id"
                        );
                        if let Some(hook) = meta_hook {
                            hook.on_session_bound(&session.conversation_id, session_id)
                                .await;
                        }
                        return;
                    }
                }
                if let Some(error) = &error {
                    session.pending_session_new.store(false, Ordering::SeqCst);
                    session.router.on_rpc_error(error).await;
                    return;
                }
            }
            // Prompt responses: only ids this session issued.
            if let Some(id) = id.as_i64() {
                if session.take_pending_prompt(id) {
                    if let Some(result) = &result {
                        session.router.on_prompt_response(result).await;
                    } else if let Some(error) = &error {
                        session.router.on_rpc_error(error).await;
                    }
                }
            }
            // Anything else belongs to a sibling session on the shared
            // shell.
        }
        Incoming::Notification { ref method, ref params } => {
            if method == "session/update" && params_session_matches(params, session) {
                session
                    .router
                    .route(&Incoming::Notification {
                        method: method.clone(),
                        params: params.clone(),
                    })
                    .await;
            }
        }
        Incoming::Request { ref params, .. } => {
            if params_session_matches(params, session) {
                session.router.route(&incoming).await;
            }
        }
    }
}

fn params_session_matches(params: &Value, session: &AcpSession) -> bool {
    let Some(param_sid) = params.get("sessionId").and_then(Value::as_str) else {
        return false;
    };
    session.session_id().as_deref() == Some(param_sid)
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    if let Ok(stripped) = path.strip_prefix("~") {
        return home_dir().join(stripped);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutize_handles_tilde_and_relative() {
        assert_eq!(absolutize(Path::new("/abs")), PathBuf::from("/abs"));
        let home = absolutize(Path::new("~/work"));
        assert!(home.is_absolute() || home.starts_with("."));
        assert!(home.ends_with("work"));
        let rel = absolutize(Path::new("rel/dir"));
        assert!(rel.ends_with("rel/dir"));
    }
}
