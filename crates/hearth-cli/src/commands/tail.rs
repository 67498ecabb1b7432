//! `hearth tail` - stream a conversation's live event feed

use std::sync::Arc;

use anyhow::Result;

use hearth_daemon::Core;

pub async fn execute(core: Arc<Core>, conversation: String) -> Result<()> {
    core.ensure_conversation(&conversation).await?;
    let mut events = core.hub().subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                if event.conversation_id() == conversation {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event feed lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}
