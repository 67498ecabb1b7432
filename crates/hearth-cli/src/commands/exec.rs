//! `hearth exec` - run one command as a block and print its output

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use hearth_daemon::Core;
use hearth_pty::PtyMode;

const COMPLETION_POLL: Duration = Duration::from_millis(100);
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn execute(
    core: Arc<Core>,
    conversation: String,
    cwd: Option<String>,
    cmd: String,
) -> Result<()> {
    core.ensure_conversation(&conversation).await?;
    let engine = core.pty().get_or_create(&conversation).await;
    let started = engine
        .exec(&cmd, cwd.as_deref())
        .await
        .context("exec failed")?;
    tracing::debug!(block_id = %started.block_id, "block started");

    // Wait for the END sentinel to land.
    let deadline = tokio::time::Instant::now() + COMPLETION_TIMEOUT;
    loop {
        if engine.status().await?.mode == PtyMode::Idle {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("command did not finish within {COMPLETION_TIMEOUT:?}");
        }
        tokio::time::sleep(COMPLETION_POLL).await;
    }

    let block = engine.index().get(&started.block_id).await?;
    let (output, _, _) = engine
        .index()
        .read_output(&started.block_id, 0, 512 * 1024)
        .await?;
    print!("{output}");
    match block.exit_code {
        Some(0) => Ok(()),
        Some(code) => bail!("command exited with status {code}"),
        None => bail!("command ended without an exit status"),
    }
}
