//! `hearth send` / `wait-for` / `read-spool` / `status`

use std::sync::Arc;

use anyhow::{bail, Result};

use hearth_daemon::Core;
use hearth_pty::{MatchKind, WaitRequest};

pub async fn send(core: Arc<Core>, conversation: String, data: String) -> Result<()> {
    core.ensure_conversation(&conversation).await?;
    let engine = core.pty().get_or_create(&conversation).await;
    engine.ensure_shell(None).await?;
    engine.send(&unescape(&data)).await?;
    Ok(())
}

pub async fn wait_for(
    core: Arc<Core>,
    conversation: String,
    pattern: String,
    match_type: String,
    from_cursor: u64,
    timeout_ms: u64,
) -> Result<()> {
    let kind = match match_type.as_str() {
        "substring" => MatchKind::Substring,
        "regex" => MatchKind::Regex,
        "prompt" => MatchKind::Prompt,
        other => bail!("unknown match type: {other}"),
    };
    core.ensure_conversation(&conversation).await?;
    let engine = core.pty().get_or_create(&conversation).await;
    let outcome = engine
        .wait_for(WaitRequest {
            pattern,
            kind,
            from_cursor,
            timeout_ms,
            max_bytes: 0,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.matched {
        bail!("no match");
    }
    Ok(())
}

pub async fn read_spool(
    core: Arc<Core>,
    conversation: String,
    from_cursor: u64,
    max_bytes: u64,
) -> Result<()> {
    let engine = core.pty().get_or_create(&conversation).await;
    let (data, next_cursor) = engine.read_spool(from_cursor, max_bytes).await?;
    print!("{data}");
    eprintln!("next_cursor: {next_cursor}");
    Ok(())
}

pub async fn status(core: Arc<Core>, conversation: String) -> Result<()> {
    let engine = core.pty().get_or_create(&conversation).await;
    let status = engine.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Translate the common escapes so control bytes can be sent from a shell:
/// `\n`, `\r`, `\t`, and `\xNN`. `\xNN` yields the literal byte, so values
/// past 0x7F are not re-encoded as UTF-8.
fn unescape(data: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut chars = data.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let byte = hi
                    .zip(lo)
                    .and_then(|(h, l)| u8::from_str_radix(&format!("{h}{l}"), 16).ok());
                match byte {
                    Some(byte) => out.push(byte),
                    None => {
                        // Malformed escape: pass it through untouched.
                        out.extend_from_slice(b"\\x");
                        for ch in [hi, lo].into_iter().flatten() {
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                }
            }
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_control_sequences() {
        assert_eq!(unescape("print(1)\\n"), b"print(1)\n");
        assert_eq!(unescape("\\x03"), b"\x03");
        assert_eq!(unescape("a\\tb"), b"a\tb");
        assert_eq!(unescape("plain"), b"plain");
        assert_eq!(unescape("\\q"), b"\\q");
    }

    #[test]
    fn unescape_high_bytes_stay_raw() {
        // One literal byte, not a 2-byte UTF-8 encoding of U+00FF.
        assert_eq!(unescape("\\xff"), vec![0xff]);
        assert_eq!(unescape("\\x80\\x81"), vec![0x80, 0x81]);
        // A truncated escape is passed through untouched.
        assert_eq!(unescape("\\x9"), b"\\x9");
    }
}
