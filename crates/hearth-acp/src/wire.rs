//! Newline-delimited JSON-RPC 2.0 framing for ACP
//!
//! Each transport line is one complete JSON object. Incoming objects are
//! classified by shape:
//!
//! - `method` and `id` present: request from the agent (must be answered
//!   with the same id)
//! - `method` only: notification
//! - `result` or `error` present: response to one of our requests,
//!   correlated by id
//!
//! Outgoing request ids follow a fixed scheme: `1` for `initialize`, `2`
//! for `session/new`, and the current unix-millis for `session/prompt`.
//! Uniqueness per connection is all correctness requires; millis are
//! sufficient at human prompt pace.

use serde_json::{json, Value};

/// ACP protocol version we advertise
pub const PROTOCOL_VERSION: u64 = 1;
/// Fixed id for the `initialize` request
pub const INIT_REQUEST_ID: i64 = 1;
/// Fixed id for `session/new` (one in-flight per shell at a time)
pub const SESSION_NEW_REQUEST_ID: i64 = 2;

/// Client identity sent in `initialize`
pub const CLIENT_NAME: &str = "hearth";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A classified incoming JSON-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<Value>,
    },
}

/// Parse one transport line. Returns `None` for blank lines, non-JSON
/// noise (agents log freely on stdout during startup) and objects that are
/// not JSON-RPC shaped.
pub fn parse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;
    if obj.contains_key("method") || obj.contains_key("result") || obj.contains_key("error") {
        Some(value)
    } else {
        None
    }
}

/// Classify a parsed message by its JSON-RPC shape.
pub fn classify(message: &Value) -> Option<Incoming> {
    let obj = message.as_object()?;
    let method = obj.get("method").and_then(Value::as_str);
    let id = obj.get("id").filter(|v| !v.is_null()).cloned();
    match (method, id) {
        (Some(method), Some(id)) => Some(Incoming::Request {
            id,
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        }),
        (Some(method), None) => Some(Incoming::Notification {
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        }),
        (None, id) => {
            if !obj.contains_key("result") && !obj.contains_key("error") {
                return None;
            }
            Some(Incoming::Response {
                id: id.unwrap_or(Value::Null),
                result: obj.get("result").filter(|v| !v.is_null()).cloned(),
                error: obj.get("error").filter(|v| !v.is_null()).cloned(),
            })
        }
    }
}

/// `initialize` request (id 1).
pub fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": INIT_REQUEST_ID,
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "clientCapabilities": {
                "fs": {"readTextFile": true, "writeTextFile": true},
                "terminal": true
            },
            "clientInfo": {"name": CLIENT_NAME, "version": CLIENT_VERSION}
        }
    })
}

/// `session/new` request (id 2). `cwd` must be absolute.
pub fn session_new_request(cwd: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": SESSION_NEW_REQUEST_ID,
        "method": "session/new",
        "params": {
            "cwd": cwd,
            "mcpServers": []
        }
    })
}

/// `session/prompt` request with a caller-chosen unique id.
pub fn session_prompt_request(id: i64, session_id: &str, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "session/prompt",
        "params": {
            "sessionId": session_id,
            "prompt": [{"type": "text", "text": text}]
        }
    })
}

/// `session/cancel` notification.
pub fn session_cancel_notification(session_id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "session/cancel",
        "params": {"sessionId": session_id}
    })
}

/// Successful response to an agent request.
pub fn result_response(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Error response to an agent request.
pub fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Assembles complete lines out of arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one chunk; returns the complete lines it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_filters_noise() {
        assert!(parse_line("").is_none());
        assert!(parse_line("Loading model...").is_none());
        assert!(parse_line("{\"progress\": 0.5}").is_none());
        assert!(parse_line("{\"method\": \"session/update\"}").is_some());
        assert!(parse_line("{\"id\": 1, \"result\": {}}").is_some());
    }

    #[test]
    fn classify_request_vs_notification_vs_response() {
        let req = json!({"jsonrpc": "2.0", "id": 42, "method": "session/request_permission", "params": {}});
        assert!(matches!(
            classify(&req),
            Some(Incoming::Request { method, .. }) if method == "session/request_permission"
        ));

        let notif = json!({"jsonrpc": "2.0", "method": "session/update", "params": {}});
        assert!(matches!(
            classify(&notif),
            Some(Incoming::Notification { method, .. }) if method == "session/update"
        ));

        let resp = json!({"jsonrpc": "2.0", "id": 2, "result": {"sessionId": "s1"}});
        match classify(&resp) {
            Some(Incoming::Response { id, result, error }) => {
                assert_eq!(id, json!(2));
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn error_responses_classify_as_responses() {
        let resp = json!({"jsonrpc": "2.0", "id": 7, "error": {"code": -32000, "message": "boom"}});
        assert!(matches!(
            classify(&resp),
            Some(Incoming::Response { error: Some(_), .. })
        ));
    }

    #[test]
    fn initialize_request_shape() {
        let req = initialize_request();
        assert_eq!(req["id"], 1);
        assert_eq!(req["method"], "initialize");
        assert_eq!(req["params"]["protocolVersion"], 1);
        assert_eq!(req["params"]["clientCapabilities"]["fs"]["readTextFile"], true);
        assert_eq!(req["params"]["clientCapabilities"]["terminal"], true);
    }

    #[test]
    fn session_requests_shape() {
        let new = session_new_request("/work");
        assert_eq!(new["id"], 2);
        assert_eq!(new["params"]["cwd"], "/work");
        assert_eq!(new["params"]["mcpServers"], json!([]));

        let prompt = session_prompt_request(1714000000000, "s1", "Hello");
        assert_eq!(prompt["id"], 1714000000000i64);
        assert_eq!(prompt["params"]["prompt"][0]["type"], "text");
        assert_eq!(prompt["params"]["prompt"][0]["text"], "Hello");

        let cancel = session_cancel_notification("s1");
        assert!(cancel.get("id").is_none());
        assert_eq!(cancel["method"], "session/cancel");
    }

    #[test]
    fn framer_reassembles_split_lines() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"method\":").is_empty());
        let lines = framer.push(b"\"x\"}\n{\"id\":1,\"result\":{}}\r\n{\"partial");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"method\":\"x\"}");
        assert_eq!(lines[1], "{\"id\":1,\"result\":{}}");
        let rest = framer.push(b"\":true}\n");
        assert_eq!(rest, vec!["{\"partial\":true}"]);
    }
}
