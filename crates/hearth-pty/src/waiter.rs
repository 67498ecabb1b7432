//! Waiter registry: pending match predicates over the spool
//!
//! `wait_for` scans existing spool bytes synchronously first; only if
//! nothing matches does it register a predicate. Registered predicates are
//! re-run against the cumulative data visible from their `from_cursor`
//! every time the spool grows, in the same task that performed the append,
//! so registration and resolution never race the writer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};

use crate::error::Result;
use crate::sentinel::{b64_field, MARKER_PROMPT};
use crate::spool::Spool;

/// Scan window applied per append cycle
pub const SCAN_WINDOW: u64 = 1024 * 1024;

/// How a `wait_for` pattern is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Substring,
    Regex,
    /// Wait for the shell prompt sentinel; parses `cwd`/`exit` into `extra`
    Prompt,
}

/// A `wait_for` request
#[derive(Debug, Clone)]
pub struct WaitRequest {
    pub pattern: String,
    pub kind: MatchKind,
    pub from_cursor: u64,
    pub timeout_ms: u64,
    pub max_bytes: u64,
}

impl WaitRequest {
    pub fn substring(pattern: impl Into<String>, from_cursor: u64, timeout_ms: u64) -> Self {
        Self {
            pattern: pattern.into(),
            kind: MatchKind::Substring,
            from_cursor,
            timeout_ms,
            max_bytes: SCAN_WINDOW,
        }
    }
}

/// Absolute byte offsets of a match in the spool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub start: u64,
    pub end: u64,
}

/// Fields decoded from a prompt sentinel match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptExtra {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<i32>,
}

/// Outcome of a `wait_for`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitOutcome {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_cursor: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_span: Option<MatchSpan>,
    /// Where the caller should resume scanning from
    pub next_cursor: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<PromptExtra>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WaitOutcome {
    pub fn timeout(next_cursor: u64) -> Self {
        Self {
            matched: false,
            match_text: None,
            match_cursor: None,
            match_span: None,
            next_cursor,
            extra: None,
            error: Some("timeout".to_string()),
        }
    }

    pub fn cancelled(next_cursor: u64) -> Self {
        Self {
            matched: false,
            match_text: None,
            match_cursor: None,
            match_span: None,
            next_cursor,
            extra: None,
            error: Some("cancelled".to_string()),
        }
    }
}

struct RelativeMatch {
    index: usize,
    end: usize,
    text: String,
    extra: Option<PromptExtra>,
}

/// Compiled match predicate
pub(crate) enum Matcher {
    Substring(String),
    Regex(Regex),
    Prompt,
}

impl Matcher {
    pub fn compile(req: &WaitRequest) -> Result<Self> {
        Ok(match req.kind {
            MatchKind::Substring => Matcher::Substring(req.pattern.clone()),
            MatchKind::Regex => Matcher::Regex(Regex::new(&req.pattern)?),
            MatchKind::Prompt => Matcher::Prompt,
        })
    }

    fn find(&self, data: &str) -> Option<RelativeMatch> {
        match self {
            Matcher::Substring(needle) => data.find(needle).map(|index| RelativeMatch {
                index,
                end: index + needle.len(),
                text: needle.clone(),
                extra: None,
            }),
            Matcher::Regex(re) => re.find(data).map(|m| RelativeMatch {
                index: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
                extra: None,
            }),
            Matcher::Prompt => data.find(MARKER_PROMPT).map(|index| {
                let line_end = data[index..]
                    .find('\n')
                    .map(|off| index + off)
                    .unwrap_or(data.len());
                let line = &data[index..line_end];
                let mut extra = PromptExtra::default();
                for tok in line.split_whitespace().skip(1) {
                    if let Some((k, v)) = tok.split_once('=') {
                        match k {
                            "cwd_b64" => extra.cwd = Some(b64_field(v)),
                            "ts" => extra.ts = v.parse().ok(),
                            "exit" => extra.exit = v.parse().ok(),
                            _ => {}
                        }
                    }
                }
                RelativeMatch {
                    index,
                    end: index + MARKER_PROMPT.len(),
                    text: MARKER_PROMPT.to_string(),
                    extra: Some(extra),
                }
            }),
        }
    }
}

struct PendingWaiter {
    matcher: Matcher,
    from_cursor: u64,
    tx: oneshot::Sender<WaitOutcome>,
}

/// Per-conversation set of pending predicates
pub struct WaiterRegistry {
    waiters: Mutex<Vec<PendingWaiter>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Scan spool bytes from `from_cursor` once; absolute offsets in the
    /// result.
    pub(crate) async fn scan_once(
        spool: &Spool,
        matcher: &Matcher,
        from_cursor: u64,
        max_bytes: u64,
    ) -> Result<Option<WaitOutcome>> {
        let (data, data_end) = spool.read(from_cursor, max_bytes).await?;
        let text = String::from_utf8_lossy(&data);
        Ok(matcher.find(&text).map(|m| WaitOutcome {
            matched: true,
            match_text: Some(m.text),
            match_cursor: Some(from_cursor + m.index as u64),
            match_span: Some(MatchSpan {
                start: from_cursor + m.index as u64,
                end: from_cursor + m.end as u64,
            }),
            next_cursor: data_end,
            extra: m.extra,
            error: None,
        }))
    }

    /// Register a predicate; it resolves on a later append (or is dropped
    /// when the caller gives up and its receiver closes).
    pub(crate) async fn register(
        &self,
        matcher: Matcher,
        from_cursor: u64,
    ) -> oneshot::Receiver<WaitOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.push(PendingWaiter {
            matcher,
            from_cursor,
            tx,
        });
        rx
    }

    /// Re-run every pending predicate against the spool. Called by the
    /// engine after each append.
    pub async fn check(&self, spool: &Spool) {
        let mut waiters = self.waiters.lock().await;
        if waiters.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(waiters.len());
        for waiter in waiters.drain(..) {
            if waiter.tx.is_closed() {
                continue;
            }
            match Self::scan_once(spool, &waiter.matcher, waiter.from_cursor, SCAN_WINDOW).await {
                Ok(Some(outcome)) => {
                    let _ = waiter.tx.send(outcome);
                }
                Ok(None) => remaining.push(waiter),
                Err(e) => {
                    tracing::warn!(error = %e, "waiter scan failed");
                    remaining.push(waiter);
                }
            }
        }
        *waiters = remaining;
    }

    /// Resolve every pending waiter as unmatched (conversation closing).
    pub async fn cancel_all(&self, next_cursor: u64) {
        let mut waiters = self.waiters.lock().await;
        for waiter in waiters.drain(..) {
            let _ = waiter.tx.send(WaitOutcome::cancelled(next_cursor));
        }
    }
}

impl Default for WaiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel::format_prompt;
    use tempfile::TempDir;

    fn spool_in(dir: &TempDir) -> Spool {
        Spool::new(dir.path().join("output.spool"))
    }

    fn req(kind: MatchKind, pattern: &str, from: u64) -> WaitRequest {
        WaitRequest {
            pattern: pattern.to_string(),
            kind,
            from_cursor: from,
            timeout_ms: 1000,
            max_bytes: SCAN_WINDOW,
        }
    }

    #[tokio::test]
    async fn substring_match_reports_absolute_offsets() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        spool.append(b"prefix hi suffix").await.unwrap();

        let matcher = Matcher::compile(&req(MatchKind::Substring, "hi", 0)).unwrap();
        let outcome = WaiterRegistry::scan_once(&spool, &matcher, 0, SCAN_WINDOW)
            .await
            .unwrap()
            .expect("should match");
        assert!(outcome.matched);
        assert_eq!(outcome.match_cursor, Some(7));
        assert_eq!(
            outcome.match_span,
            Some(MatchSpan { start: 7, end: 9 })
        );
        assert_eq!(outcome.next_cursor, 16);
    }

    #[tokio::test]
    async fn offsets_respect_from_cursor() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        spool.append(b"aaa bbb aaa").await.unwrap();

        let matcher = Matcher::compile(&req(MatchKind::Substring, "aaa", 4)).unwrap();
        let outcome = WaiterRegistry::scan_once(&spool, &matcher, 4, SCAN_WINDOW)
            .await
            .unwrap()
            .expect("should match second occurrence");
        assert_eq!(outcome.match_cursor, Some(8));
    }

    #[tokio::test]
    async fn regex_match() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        spool.append(b"exit code: 42\n").await.unwrap();

        let matcher = Matcher::compile(&req(MatchKind::Regex, r"code: (\d+)", 0)).unwrap();
        let outcome = WaiterRegistry::scan_once(&spool, &matcher, 0, SCAN_WINDOW)
            .await
            .unwrap()
            .expect("should match");
        assert_eq!(outcome.match_text.as_deref(), Some("code: 42"));
    }

    #[tokio::test]
    async fn prompt_match_decodes_extra() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let line = format!("{}\n", format_prompt(123, "/work", 0));
        spool.append(line.as_bytes()).await.unwrap();

        let matcher = Matcher::compile(&req(MatchKind::Prompt, "", 0)).unwrap();
        let outcome = WaiterRegistry::scan_once(&spool, &matcher, 0, SCAN_WINDOW)
            .await
            .unwrap()
            .expect("should match prompt");
        let extra = outcome.extra.expect("prompt extra");
        assert_eq!(extra.cwd.as_deref(), Some("/work"));
        assert_eq!(extra.ts, Some(123));
        assert_eq!(extra.exit, Some(0));
    }

    #[tokio::test]
    async fn registered_waiter_resolves_on_check() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let registry = WaiterRegistry::new();

        let matcher = Matcher::compile(&req(MatchKind::Substring, "ready", 0)).unwrap();
        let rx = registry.register(matcher, 0).await;

        spool.append(b"not yet").await.unwrap();
        registry.check(&spool).await;

        spool.append(b" ready now").await.unwrap();
        registry.check(&spool).await;

        let outcome = rx.await.unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.match_cursor, Some(8));
    }

    #[tokio::test]
    async fn equal_predicates_resolve_independently() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let registry = WaiterRegistry::new();

        let rx1 = registry
            .register(
                Matcher::compile(&req(MatchKind::Substring, "x", 0)).unwrap(),
                0,
            )
            .await;
        let rx2 = registry
            .register(
                Matcher::compile(&req(MatchKind::Substring, "x", 0)).unwrap(),
                0,
            )
            .await;

        spool.append(b"x").await.unwrap();
        registry.check(&spool).await;

        assert!(rx1.await.unwrap().matched);
        assert!(rx2.await.unwrap().matched);
    }

    #[tokio::test]
    async fn cancel_all_resolves_unmatched() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let registry = WaiterRegistry::new();
        let rx = registry
            .register(
                Matcher::compile(&req(MatchKind::Substring, "never", 0)).unwrap(),
                0,
            )
            .await;
        registry.cancel_all(spool.size().await.unwrap()).await;
        let outcome = rx.await.unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.error.as_deref(), Some("cancelled"));
    }
}
