//! End-to-end Core tests over the scripted mock agent

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use hearth_acp::test_support::{MockAgentConfig, MockAgentSupervisor};
use hearth_core::{AcpExtension, TurnStatus, UiEvent};
use hearth_daemon::{ConversationStatus, Core, CoreConfig};

fn extension(id: &str) -> AcpExtension {
    AcpExtension {
        id: id.to_string(),
        name: id.to_string(),
        command: "mock-agent".to_string(),
        args: vec![],
        env: Default::default(),
        capabilities: json!({}),
        shellspec: format!("shellspec/{id}.yaml"),
        path: id.to_string(),
        eager_session_init: false,
    }
}

#[tokio::test]
async fn acp_turn_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = MockAgentSupervisor::new(MockAgentConfig::default());
    let core = Core::new(CoreConfig::new(dir.path().to_path_buf()), supervisor);
    core.acp().register_extension(extension("gemini"));

    let mut rx = core.hub().subscribe();
    core.handle_message("c3", "gemini", Path::new("/work"), "Hello")
        .await
        .unwrap();

    // Drain the hub until the turn completes.
    let mut types = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("turn never completed")
            .unwrap();
        let ty = serde_json::to_value(&event).unwrap()["type"]
            .as_str()
            .unwrap()
            .to_string();
        let done = matches!(event, UiEvent::Activity { active: false, .. });
        types.push(ty);
        if done {
            break;
        }
    }
    assert_eq!(
        types,
        vec![
            "message",
            "turn_started",
            "activity",
            "reasoning_delta",
            "assistant_delta",
            "assistant_delta",
            "assistant_finalize",
            "turn_completed",
            "activity",
        ]
    );

    // Transcript on disk: user, reasoning, assistant, status.
    let rows = core.transcript().read_all("c3").await.unwrap();
    let roles: Vec<&str> = rows.iter().map(|r| r.entry.role()).collect();
    assert_eq!(roles, vec!["user", "reasoning", "assistant", "status"]);
    match &rows[3].entry {
        hearth_core::TranscriptEntry::Status { status, stop_reason } => {
            assert_eq!(*status, TurnStatus::Success);
            assert_eq!(stop_reason, "end_turn");
        }
        other => panic!("expected status row, got {other:?}"),
    }

    // Meta captured the agent session id and went active.
    let meta = core.store().load_meta("c3").await.unwrap().unwrap();
    assert_eq!(meta.thread_id.as_deref(), Some("mock-session-1"));
    assert_eq!(meta.status, ConversationStatus::Active);

    core.shutdown().await;
}

#[tokio::test]
async fn second_message_reuses_the_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = MockAgentSupervisor::new(MockAgentConfig::default());
    let core = Core::new(CoreConfig::new(dir.path().to_path_buf()), supervisor.clone());
    core.acp().register_extension(extension("gemini"));

    let first = core
        .handle_message("c1", "gemini", Path::new("/w"), "one")
        .await
        .unwrap();
    let second = core
        .handle_message("c1", "gemini", Path::new("/w"), "two")
        .await
        .unwrap();
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(
        supervisor
            .spawn_count
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    core.shutdown().await;
}

#[tokio::test]
async fn ensure_conversation_creates_meta() {
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = MockAgentSupervisor::new(MockAgentConfig::default());
    let core = Core::new(CoreConfig::new(dir.path().to_path_buf()), supervisor);

    let meta = core.ensure_conversation("fresh").await.unwrap();
    assert_eq!(meta.status, ConversationStatus::Draft);
    assert!(core.store().meta_path("fresh").exists());
    assert_eq!(core.store().list().await.unwrap(), vec!["fresh"]);
    core.shutdown().await;
}
