//! Responders for agent-initiated fs/terminal requests
//!
//! Agents call back into the client for file access and terminal control.
//! File operations run against the local filesystem under the host's
//! privileges; terminal operations are stubs that answer success with
//! empty output until a real backend is wired through `hearth-shells`.

use serde_json::{json, Value};

use crate::wire;

/// Filesystem request handler (`fs/read_text_file`, `fs/write_text_file`)
#[derive(Debug, Default, Clone)]
pub struct FsHandler;

impl FsHandler {
    /// Answer `fs/read_text_file`. `line` (1-based) and `limit` select a
    /// window of lines when present.
    pub async fn read_text_file(&self, id: &Value, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return wire::error_response(id, -32602, "missing path");
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let line = params.get("line").and_then(Value::as_u64);
                let limit = params.get("limit").and_then(Value::as_u64);
                let content = if line.is_some() || limit.is_some() {
                    let skip = line.map(|l| l.saturating_sub(1) as usize).unwrap_or(0);
                    let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);
                    let mut windowed: String = content
                        .lines()
                        .skip(skip)
                        .take(take)
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !windowed.is_empty() {
                        windowed.push('\n');
                    }
                    windowed
                } else {
                    content
                };
                wire::result_response(id, json!({"content": content}))
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "fs/read_text_file failed");
                wire::error_response(id, -32603, &format!("read failed: {e}"))
            }
        }
    }

    /// Answer `fs/write_text_file`, creating parent directories.
    pub async fn write_text_file(&self, id: &Value, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(Value::as_str) else {
            return wire::error_response(id, -32602, "missing path");
        };
        let content = params
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(parent) = std::path::Path::new(path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(path, error = %e, "fs/write_text_file mkdir failed");
                return wire::error_response(id, -32603, &format!("write failed: {e}"));
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => wire::result_response(id, json!({})),
            Err(e) => {
                tracing::warn!(path, error = %e, "fs/write_text_file failed");
                wire::error_response(id, -32603, &format!("write failed: {e}"))
            }
        }
    }
}

/// Terminal request stubs (`terminal/*`)
///
/// Every method answers success so agents that probe the capability keep
/// working; output is always empty.
#[derive(Debug, Default, Clone)]
pub struct TerminalStubs;

impl TerminalStubs {
    pub fn handle(&self, method: &str, id: &Value, params: &Value) -> Option<Value> {
        let session_id = params
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        match method {
            "terminal/create" => Some(wire::result_response(
                id,
                json!({"terminalId": format!("term_{session_id}")}),
            )),
            "terminal/output" => Some(wire::result_response(
                id,
                json!({"output": "", "truncated": false, "exitStatus": null}),
            )),
            "terminal/wait_for_exit" => {
                Some(wire::result_response(id, json!({"exitCode": 0})))
            }
            "terminal/kill" | "terminal/release" => {
                Some(wire::result_response(id, json!({})))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_text_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "one\ntwo\nthree\n").await.unwrap();

        let fs = FsHandler;
        let id = json!(5);
        let resp = fs
            .read_text_file(&id, &json!({"path": path.display().to_string()}))
            .await;
        assert_eq!(resp["id"], 5);
        assert_eq!(resp["result"]["content"], "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn read_with_line_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "one\ntwo\nthree\n").await.unwrap();

        let fs = FsHandler;
        let resp = fs
            .read_text_file(
                &json!(1),
                &json!({"path": path.display().to_string(), "line": 2, "limit": 1}),
            )
            .await;
        assert_eq!(resp["result"]["content"], "two\n");
    }

    #[tokio::test]
    async fn read_missing_file_is_an_error() {
        let fs = FsHandler;
        let resp = fs
            .read_text_file(&json!(1), &json!({"path": "/no/such/file"}))
            .await;
        assert!(resp.get("error").is_some());
    }

    #[tokio::test]
    async fn write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep/nested/f.txt");
        let fs = FsHandler;
        let resp = fs
            .write_text_file(
                &json!(9),
                &json!({"path": path.display().to_string(), "content": "data"}),
            )
            .await;
        assert!(resp.get("error").is_none());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "data");
    }

    #[test]
    fn terminal_stubs_answer_success() {
        let stubs = TerminalStubs;
        let id = json!(3);
        let params = json!({"sessionId": "s1"});

        let created = stubs.handle("terminal/create", &id, &params).unwrap();
        assert_eq!(created["result"]["terminalId"], "term_s1");

        let output = stubs.handle("terminal/output", &id, &params).unwrap();
        assert_eq!(output["result"]["output"], "");

        let exit = stubs.handle("terminal/wait_for_exit", &id, &params).unwrap();
        assert_eq!(exit["result"]["exitCode"], 0);

        assert!(stubs.handle("terminal/kill", &id, &params).is_some());
        assert!(stubs.handle("terminal/release", &id, &params).is_some());
        assert!(stubs.handle("terminal/resize", &id, &params).is_none());
    }
}
