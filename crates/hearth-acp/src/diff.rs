//! Diff extraction and deduplication signatures
//!
//! Agent payloads carry diffs under several shapes (`diff`, `patch`,
//! `unified_diff`, `changes[].diff`, `fileChanges.*.diff`). Some providers
//! re-send the same diff on every delta; the router keeps a per-turn set of
//! signatures so each distinct diff is emitted once.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Extract a canonical diff text and the affected path from a payload.
///
/// The path comes from an explicit field when present, otherwise from the
/// `+++ b/<path>` header, otherwise from the `diff --git` header.
pub fn extract_diff_with_path(payload: &Value) -> Option<(String, Option<String>)> {
    let obj = payload.as_object()?;

    for key in ["diff", "patch", "unified_diff"] {
        if let Some(text) = obj.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                let path = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| extract_path_from_diff(text));
                return Some((text.to_string(), path));
            }
        }
    }

    if let Some(changes) = obj.get("changes").and_then(Value::as_array) {
        let mut chunks = Vec::new();
        let mut path = None;
        for change in changes {
            if let Some(text) = change.get("diff").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    chunks.push(text.to_string());
                    if path.is_none() {
                        path = change.get("path").and_then(Value::as_str).map(str::to_string);
                    }
                }
            }
        }
        if !chunks.is_empty() {
            let combined = chunks.join("\n");
            let path = path.or_else(|| extract_path_from_diff(&combined));
            return Some((combined, path));
        }
    }

    if let Some(file_changes) = obj.get("fileChanges").and_then(Value::as_object) {
        let mut chunks = Vec::new();
        let mut path = None;
        for (fpath, change) in file_changes {
            let text = change
                .get("diff")
                .and_then(Value::as_str)
                .or_else(|| change.get("patch").and_then(Value::as_str));
            if let Some(text) = text {
                if !text.trim().is_empty() {
                    chunks.push(text.to_string());
                    if path.is_none() {
                        path = Some(fpath.clone());
                    }
                }
            }
        }
        if !chunks.is_empty() {
            return Some((chunks.join("\n"), path));
        }
    }

    None
}

/// Pull a file path out of unified diff headers.
pub fn extract_path_from_diff(diff_text: &str) -> Option<String> {
    for line in diff_text.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.len() >= 2 {
                let bpath = parts[1];
                return Some(bpath.strip_prefix("b/").unwrap_or(bpath).to_string());
            }
        }
        if let Some(path) = line.strip_prefix("+++ ") {
            let path = path.trim();
            if path != "/dev/null" {
                return Some(path.strip_prefix("b/").unwrap_or(path).to_string());
            }
        }
        if let Some(path) = line.strip_prefix("--- ") {
            let path = path.trim();
            if path != "/dev/null" {
                return Some(path.strip_prefix("a/").unwrap_or(path).to_string());
            }
        }
    }
    None
}

/// Stable signature over file headers, hunk headers and the full text.
pub fn diff_signature(diff_text: &str) -> String {
    if diff_text.is_empty() {
        return "empty".to_string();
    }
    let mut files = Vec::new();
    let mut hunks = Vec::new();
    for line in diff_text.lines() {
        if line.starts_with("+++ ") || line.starts_with("--- ") {
            files.push(line.trim());
        } else if line.starts_with("@@") {
            hunks.push(line.trim());
        }
    }
    let mut hasher = Sha256::new();
    for part in files.iter().chain(hunks.iter()) {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\n");
    hasher.update(diff_text.as_bytes());
    hex::encode(hasher.finalize())
}
