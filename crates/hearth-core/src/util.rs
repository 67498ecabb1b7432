//! Small shared helpers: timestamps and filesystem-safe ids

use chrono::Utc;

/// Current wall-clock time in milliseconds since the epoch.
///
/// Sentinel timestamps and prompt-request ids use this resolution; it only
/// needs to be unique at human pace.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Current UTC timestamp in ISO-8601 format, used for transcript rows.
pub fn utc_ts() -> String {
    Utc::now().to_rfc3339()
}

/// Reduce a conversation id to a filesystem-safe name.
///
/// Anything outside `[A-Za-z0-9._-]` collapses to `_`; an id that sanitizes
/// to nothing becomes `"unknown"` rather than an empty path component.
pub fn sanitize_conversation_id(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_sub = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            last_was_sub = false;
        } else if !last_was_sub {
            out.push('_');
            last_was_sub = true;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_chars() {
        assert_eq!(sanitize_conversation_id("abc-123_x.y"), "abc-123_x.y");
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_conversation_id("a/b//c"), "a_b_c");
    }

    #[test]
    fn sanitize_empty_becomes_unknown() {
        assert_eq!(sanitize_conversation_id("///"), "unknown");
        assert_eq!(sanitize_conversation_id(""), "unknown");
    }

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
