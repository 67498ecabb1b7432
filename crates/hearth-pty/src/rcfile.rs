//! Generated bash rc for supervised agent shells
//!
//! The rc defines the sentinel emit helpers and wires them into the shell
//! in one of two modes, selected by the `__FWS_MANUAL` environment
//! variable:
//!
//! - **Manual** (`__FWS_MANUAL=1`, the engine's default): the host wraps
//!   every submitted command in a single BEGIN/END pair, so compound
//!   commands stay one block. The rc only emits `__FWS_PROMPT__` from
//!   `PROMPT_COMMAND` and is ready immediately.
//! - **Automatic**: a DEBUG trap emits BEGIN before each simple command
//!   and `PROMPT_COMMAND` emits END + PROMPT. Readiness is reached at the
//!   first prompt; earlier begins are suppressed.
//!
//! Assignments to the hook variables themselves and anything mentioning a
//! marker name are ignored by the preexec filter so the instrumentation
//! never frames itself.

use std::path::Path;

use crate::error::Result;

const RC_TEMPLATE: &str = r#"__FWS_SEQ=0
__FWS_LAST_SEQ=""
__FWS_IN_MARKER=0
__FWS_READY=0
__FWS_MANUAL="${__FWS_MANUAL:-0}"

__fws_b64() { printf %s "$1" | base64 | tr -d '\n'; }
__fws_now_ms() {
  date +%s%3N 2>/dev/null && return 0
  awk 'BEGIN { srand(); printf "%d\n", srand() * 1000 }'
}

__fws_emit_begin() {
  local cmd="$1"
  local cwd="$2"
  local ts="$3"
  local seq="$4"
  local cwd_b64="$(__fws_b64 "$cwd")"
  local cmd_b64="$(__fws_b64 "$cmd")"
  printf '\n__FWS_BLOCK_BEGIN__ seq=%s ts=%s cwd_b64=%s cmd_b64=%s\n' "$seq" "$ts" "$cwd_b64" "$cmd_b64"
}

__fws_emit_end() {
  local exit_code="$1"
  local ts="$2"
  local seq="$3"
  printf '\n__FWS_BLOCK_END__ seq=%s ts=%s exit=%s\n' "$seq" "$ts" "$exit_code"
}

__fws_emit_prompt() {
  local exit_code="${1:-$?}"
  local ts="$(__fws_now_ms)"
  local cwd="$(pwd -P 2>/dev/null || pwd)"
  local cwd_b64="$(__fws_b64 "$cwd")"
  printf '\n__FWS_PROMPT__ ts=%s cwd_b64=%s exit=%s\n' "$ts" "$cwd_b64" "$exit_code"
}

__fws_should_ignore_cmd() {
  local cmd="$1"
  case "$cmd" in
    PS1=*|PROMPT_COMMAND=*|__FWS_READY=*|__FWS_SEQ=*|__FWS_LAST_SEQ=*|__FWS_IN_MARKER=*|trap*|shopt*|set\ +o*|set\ -o*)
      return 0
      ;;
    *__FWS_BLOCK_BEGIN__*|*__FWS_BLOCK_END__*|*__FWS_PROMPT__*) return 0 ;;
    __fws_*|__FWS_*) return 0 ;;
  esac
  return 1
}

if [ "${__FWS_MANUAL}" = "1" ]; then
  # Manual mode: the host wraps each submission in one BEGIN/END pair so
  # compound commands stay one block.
  __FWS_READY=1

  __fws_manual_precmd() {
    local ec="$?"
    __fws_emit_prompt "$ec"
  }
  PROMPT_COMMAND="__fws_manual_precmd"
else
  trap '__fws_preexec' DEBUG
  __fws_preexec() {
    if [ "${__FWS_IN_MARKER}" = "1" ]; then return 0; fi
    # No begins until the shell has reached its first prompt.
    if [ "${__FWS_READY}" != "1" ]; then return 0; fi
    case "$-" in *i*) ;; *) return 0 ;; esac
    local cmd="${BASH_COMMAND}"
    if __fws_should_ignore_cmd "$cmd"; then return 0; fi
    __FWS_IN_MARKER=1
    __FWS_SEQ=$((__FWS_SEQ + 1))
    __FWS_LAST_SEQ="$__FWS_SEQ"
    local ts="$(__fws_now_ms)"
    local cwd="$(pwd -P 2>/dev/null || pwd)"
    __fws_emit_begin "$cmd" "$cwd" "$ts" "$__FWS_SEQ"
    __FWS_IN_MARKER=0
  }

  __fws_precmd() {
    if [ "${__FWS_IN_MARKER}" = "1" ]; then return 0; fi
    if [ "${__FWS_READY}" != "1" ]; then
      __FWS_READY=1
      __fws_emit_prompt
      return 0
    fi
    if [ -z "${__FWS_LAST_SEQ}" ]; then
      __fws_emit_prompt
      return 0
    fi
    __FWS_IN_MARKER=1
    local exit_code="$?"
    local ts="$(__fws_now_ms)"
    __fws_emit_end "$exit_code" "$ts" "$__FWS_LAST_SEQ"
    __FWS_LAST_SEQ=""
    __FWS_IN_MARKER=0
    __fws_emit_prompt
  }

  PROMPT_COMMAND="__fws_precmd"
fi

PS1="agent-pty> "
"#;

/// The rc script contents.
pub fn rc_script() -> &'static str {
    RC_TEMPLATE
}

/// Write the rc script, creating parent directories as needed.
pub async fn write_rcfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, RC_TEMPLATE).await?;
    Ok(())
}

/// The argv used to start a supervised shell in manual mode.
pub fn manual_shell_argv(rcfile: &Path) -> Vec<String> {
    vec![
        "env".to_string(),
        "__FWS_MANUAL=1".to_string(),
        "bash".to_string(),
        "--rcfile".to_string(),
        rcfile.display().to_string(),
        "-i".to_string(),
    ]
}

/// The wrapped command line written to the PTY for one block-mode
/// submission. The command travels base64-encoded to dodge quoting, and
/// the whole submission runs under a single BEGIN/END pair.
///
/// `eval` keeps compound commands (`a && b`) as one block; heredocs and
/// other multi-line constructs should use interactive mode instead.
pub fn wrap_block_command(cmd: &str, cwd: Option<&str>) -> String {
    let cmd_b64 = crate::sentinel::b64_encode(cmd);
    let wrapped = format!(
        "__fws_cmd=\"$(printf %s '{cmd_b64}' | base64 -d 2>/dev/null)\"; \
if [ -n \"$__fws_cmd\" ]; then \
__FWS_SEQ=$((__FWS_SEQ + 1)); __fws_seq=\"$__FWS_SEQ\"; \
__fws_ts=\"$(__fws_now_ms)\"; __fws_cwd=\"$(pwd -P 2>/dev/null || pwd)\"; \
__fws_emit_begin \"$__fws_cmd\" \"$__fws_cwd\" \"$__fws_ts\" \"$__fws_seq\"; \
eval \"$__fws_cmd\"; __fws_ec=\"$?\"; __fws_ts2=\"$(__fws_now_ms)\"; \
__fws_emit_end \"$__fws_ec\" \"$__fws_ts2\" \"$__fws_seq\"; \
fi\n"
    );
    match cwd {
        Some(cwd) => format!("cd \"{cwd}\" 2>/dev/null || cd \"{cwd}\"\n{wrapped}"),
        None => wrapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_defines_all_emitters() {
        let rc = rc_script();
        assert!(rc.contains("__fws_emit_begin()"));
        assert!(rc.contains("__fws_emit_end()"));
        assert!(rc.contains("__fws_emit_prompt()"));
        assert!(rc.contains("__FWS_MANUAL"));
        assert!(rc.contains("trap '__fws_preexec' DEBUG"));
    }

    #[test]
    fn ignore_rules_cover_hook_assignments() {
        let rc = rc_script();
        assert!(rc.contains("PS1=*|PROMPT_COMMAND=*"));
        assert!(rc.contains("*__FWS_BLOCK_BEGIN__*"));
    }

    #[test]
    fn manual_argv_shape() {
        let argv = manual_shell_argv(Path::new("/tmp/rc.sh"));
        assert_eq!(argv[0], "env");
        assert_eq!(argv[1], "__FWS_MANUAL=1");
        assert_eq!(argv[2], "bash");
        assert!(argv.contains(&"-i".to_string()));
    }

    #[test]
    fn wrapped_command_is_single_block() {
        let wrapped = wrap_block_command("echo hi && pwd", None);
        // One BEGIN and one END emission per submission.
        assert_eq!(wrapped.matches("__fws_emit_begin").count(), 1);
        assert_eq!(wrapped.matches("__fws_emit_end").count(), 1);
        // Command text travels base64-encoded, never verbatim.
        assert!(!wrapped.contains("echo hi && pwd"));
        assert!(wrapped.ends_with('\n'));
    }

    #[test]
    fn wrapped_command_prepends_cd() {
        let wrapped = wrap_block_command("ls", Some("/work"));
        assert!(wrapped.starts_with("cd \"/work\""));
    }

    #[tokio::test]
    async fn write_rcfile_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent_pty").join("bashrc_agent_pty.sh");
        write_rcfile(&path).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("__FWS_PROMPT__"));
    }
}
