use std::time::Duration;

use crate::api::BackendClient;
use crate::config::WorkspaceConfig;
use crate::ws::WsEvent;

use super::app::App;
use super::types::{AppMessage, FocusedPane, InputMode};

fn test_app() -> App {
    let config = WorkspaceConfig::default();
    let client = BackendClient::new(
        "http://localhost:8000",
        Duration::from_secs(config.backend.timeout_seconds),
    )
    .unwrap();
    App::new(client, config, "proj-test".to_string())
}

#[test]
fn test_initial_state() {
    let app = test_app();
    assert_eq!(app.input_mode, InputMode::Normal);
    assert_eq!(app.focused_pane, FocusedPane::Chat);
    assert!(!app.is_processing);
    assert!(!app.should_quit);
    assert!(app.workspace.messages.is_empty());
}

#[test]
fn test_pane_cycle_wraps() {
    let mut pane = FocusedPane::Chat;
    for _ in 0..4 {
        pane = pane.next();
    }
    assert_eq!(pane, FocusedPane::Chat);
}

#[tokio::test]
async fn test_submit_prompt_starts_stream() {
    let mut app = test_app();
    app.input = "build me a todo app".to_string();
    app.submit_prompt();

    assert!(app.is_processing);
    assert!(app.input.is_empty());
    // User message plus the empty streaming assistant message.
    assert_eq!(app.workspace.messages.len(), 2);
    assert!(app.workspace.streaming_id().is_some());
}

#[tokio::test]
async fn test_empty_prompt_ignored() {
    let mut app = test_app();
    app.input = "   ".to_string();
    app.submit_prompt();
    assert!(!app.is_processing);
    assert!(app.workspace.messages.is_empty());
}

#[tokio::test]
async fn test_stop_clears_flag_and_ignores_late_frames() {
    let mut app = test_app();
    app.input = "hello".to_string();
    app.submit_prompt();
    let id = app.workspace.streaming_id().unwrap();

    app.handle_message(AppMessage::StreamDelta {
        id,
        text: "partial".to_string(),
    });
    app.stop_stream();
    assert!(!app.is_processing);

    // Frames still in flight after Stop must not mutate the message.
    app.handle_message(AppMessage::StreamDelta {
        id,
        text: " late".to_string(),
    });
    assert_eq!(app.workspace.message(id).unwrap().content, "partial");

    // The reader's final close is still delivered and stays a no-op.
    app.handle_message(AppMessage::StreamClosed { id });
    assert!(!app.is_processing);
}

#[tokio::test]
async fn test_stream_closed_always_clears_processing() {
    let mut app = test_app();
    app.input = "hello".to_string();
    app.submit_prompt();
    let id = app.workspace.streaming_id().unwrap();

    app.handle_message(AppMessage::StreamError {
        id,
        error: "connection reset".to_string(),
    });
    app.handle_message(AppMessage::StreamClosed { id });

    assert!(!app.is_processing);
    let message = app.workspace.message(id).unwrap();
    assert!(message.content.contains("connection reset"));
}

#[test]
fn test_files_loaded_replaces_tree() {
    let mut app = test_app();
    app.load_error = Some("old".to_string());

    let files = vec![
        crate::workspace::ProjectFile::new("/app/index.js", "x".into()),
        crate::workspace::ProjectFile::new("/app/util.js", "y".into()),
    ];
    app.handle_message(AppMessage::FilesLoaded(Ok(files)));

    assert_eq!(app.workspace.files.len(), 2);
    assert!(app.load_error.is_none());
}

#[test]
fn test_character_written_updates_active_editor() {
    let mut app = test_app();
    app.handle_message(AppMessage::Ws(WsEvent::FileAnnounced {
        path: "/app/index.js".to_string(),
    }));
    assert_eq!(app.workspace.active_file.as_deref(), Some("/app/index.js"));

    app.handle_message(AppMessage::Ws(WsEvent::CodeCharacterWritten {
        path: "/app/index.js".to_string(),
        content: "const x".to_string(),
        line: 0,
        column: 7,
    }));

    assert_eq!(app.workspace.file("/app/index.js").unwrap().content, "const x");
    // The view itself only changes on the next throttled tick.
    app.live_editor.finish(std::time::Instant::now());
    assert_eq!(app.live_editor.view.content, "const x");
}

#[test]
fn test_character_written_for_background_file() {
    let mut app = test_app();
    app.workspace.upsert_file("/app/index.js", String::new());
    app.workspace.open_file("/app/index.js");

    app.handle_message(AppMessage::Ws(WsEvent::CodeCharacterWritten {
        path: "/app/other.js".to_string(),
        content: "let y".to_string(),
        line: 0,
        column: 5,
    }));

    // Content lands in the workspace without stealing the editor.
    assert_eq!(app.workspace.active_file.as_deref(), Some("/app/index.js"));
    assert_eq!(app.workspace.file("/app/other.js").unwrap().content, "let y");
}

#[tokio::test]
async fn test_command_approval_flow_declined() {
    let mut app = test_app();
    app.input = "set it up".to_string();
    app.submit_prompt();
    let id = app.workspace.streaming_id().unwrap();

    app.handle_message(AppMessage::StreamDelta {
        id,
        text: "TERMINAL: npm install\n".to_string(),
    });

    let pending = app.workspace.next_pending_command().unwrap();
    app.decline_next_command();
    assert!(app.workspace.message(pending).is_none());
    assert!(app.workspace.next_pending_command().is_none());
}

#[test]
fn test_ws_disconnect_reflected_in_state() {
    let mut app = test_app();
    app.handle_message(AppMessage::WsConnected(true));
    assert!(app.ws_connected);

    app.handle_message(AppMessage::WsConnected(false));
    assert!(!app.ws_connected);
    assert!(app.status_message.contains("reconnecting"));
}

#[test]
fn test_generation_error_recorded_as_problem() {
    let mut app = test_app();
    app.handle_message(AppMessage::Ws(WsEvent::GenerationError {
        message: "build exploded".to_string(),
    }));
    assert_eq!(app.workspace.problems.len(), 1);
    assert_eq!(app.workspace.problems[0].source, "agent");
}
