//! `hearth extensions` / `warm-up` / `prompt`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use hearth_core::UiEvent;
use hearth_daemon::Core;

const TURN_TIMEOUT: Duration = Duration::from_secs(600);

pub fn list_extensions(core: Arc<Core>) -> Result<()> {
    let extensions = core.acp().list_extensions();
    if extensions.is_empty() {
        println!("no extensions registered");
        return Ok(());
    }
    for ext in extensions {
        println!(
            "{:<16} {:<24} {} {}",
            ext.id,
            ext.name,
            ext.command,
            ext.args.join(" ")
        );
    }
    Ok(())
}

pub async fn warm_up(core: Arc<Core>) -> Result<()> {
    let results = core.warm_up_all().await;
    for (id, ok) in results {
        println!("{id}: {}", if ok { "ready" } else { "failed" });
    }
    Ok(())
}

/// Send one prompt and stream the turn's events to stdout until the
/// closing `activity` event.
pub async fn prompt(
    core: Arc<Core>,
    conversation: String,
    extension: String,
    cwd: Option<String>,
    text: String,
) -> Result<()> {
    let cwd = cwd
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut events = core.hub().subscribe();
    core.handle_message(&conversation, &extension, &cwd, &text)
        .await?;

    let deadline = tokio::time::Instant::now() + TURN_TIMEOUT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv()).await??;
        if event.conversation_id() != conversation {
            continue;
        }
        println!("{}", serde_json::to_string(&event)?);
        if matches!(event, UiEvent::Activity { active: false, .. }) {
            break;
        }
    }
    Ok(())
}
