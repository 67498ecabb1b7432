//! The `__FWS_*` sentinel line protocol
//!
//! The rc script emits three marker line shapes:
//!
//! ```text
//! __FWS_BLOCK_BEGIN__ seq=<u64> ts=<u64_ms> cwd_b64=<base64> cmd_b64=<base64>
//! __FWS_BLOCK_END__   seq=<u64> ts=<u64_ms> exit=<i32>
//! __FWS_PROMPT__      ts=<u64_ms> cwd_b64=<base64> exit=<i32>
//! ```
//!
//! Parsing is lenient: tokens are split on whitespace after the marker
//! name, each token splits on the first `=`, unknown keys are ignored and
//! malformed values fall back to defaults (framing is best-effort, a bad
//! marker must never take the engine down).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub const MARKER_BEGIN: &str = "__FWS_BLOCK_BEGIN__";
pub const MARKER_END: &str = "__FWS_BLOCK_END__";
pub const MARKER_PROMPT: &str = "__FWS_PROMPT__";

/// A parsed sentinel line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    Begin {
        seq: u64,
        ts: Option<u64>,
        cwd: String,
        cmd: String,
    },
    End {
        seq: u64,
        ts: Option<u64>,
        exit: Option<i32>,
    },
    Prompt {
        ts: Option<u64>,
        cwd: Option<String>,
        exit: Option<i32>,
    },
}

/// Decode a base64 field; malformed input yields an empty string.
pub fn b64_field(value: &str) -> String {
    BASE64
        .decode(value.as_bytes())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Encode a value the way the rc's `__fws_b64` helper does.
pub fn b64_encode(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

fn parse_kv(line: &str) -> Vec<(&str, &str)> {
    line.split_whitespace()
        .skip(1)
        .filter_map(|tok| tok.split_once('='))
        .collect()
}

/// Parse a line containing one of the marker names; `None` for ordinary
/// output lines.
pub fn parse_sentinel(line: &str) -> Option<Sentinel> {
    if line.contains(MARKER_BEGIN) {
        let trimmed = &line[line.find(MARKER_BEGIN)?..];
        let mut seq = 0u64;
        let mut ts = None;
        let mut cwd = String::new();
        let mut cmd = String::new();
        for (k, v) in parse_kv(trimmed) {
            match k {
                "seq" => seq = v.parse().unwrap_or(0),
                "ts" => ts = v.parse().ok(),
                "cwd_b64" => cwd = b64_field(v),
                "cmd_b64" => cmd = b64_field(v),
                _ => {}
            }
        }
        return Some(Sentinel::Begin { seq, ts, cwd, cmd });
    }
    if line.contains(MARKER_END) {
        let trimmed = &line[line.find(MARKER_END)?..];
        let mut seq = 0u64;
        let mut ts = None;
        let mut exit = None;
        for (k, v) in parse_kv(trimmed) {
            match k {
                "seq" => seq = v.parse().unwrap_or(0),
                "ts" => ts = v.parse().ok(),
                "exit" => exit = v.parse().ok(),
                _ => {}
            }
        }
        return Some(Sentinel::End { seq, ts, exit });
    }
    if line.contains(MARKER_PROMPT) {
        let trimmed = &line[line.find(MARKER_PROMPT)?..];
        let mut ts = None;
        let mut cwd = None;
        let mut exit = None;
        for (k, v) in parse_kv(trimmed) {
            match k {
                "ts" => ts = v.parse().ok(),
                "cwd_b64" => cwd = Some(b64_field(v)),
                "exit" => exit = v.parse().ok(),
                _ => {}
            }
        }
        return Some(Sentinel::Prompt { ts, cwd, exit });
    }
    None
}

/// Format a BEGIN line the way the rc emits it (tests and tooling).
pub fn format_begin(seq: u64, ts: u64, cwd: &str, cmd: &str) -> String {
    format!(
        "{MARKER_BEGIN} seq={seq} ts={ts} cwd_b64={} cmd_b64={}",
        b64_encode(cwd),
        b64_encode(cmd)
    )
}

/// Format an END line the way the rc emits it.
pub fn format_end(seq: u64, ts: u64, exit: i32) -> String {
    format!("{MARKER_END} seq={seq} ts={ts} exit={exit}")
}

/// Format a PROMPT line the way the rc emits it.
pub fn format_prompt(ts: u64, cwd: &str, exit: i32) -> String {
    format!("{MARKER_PROMPT} ts={ts} cwd_b64={} exit={exit}", b64_encode(cwd))
}
