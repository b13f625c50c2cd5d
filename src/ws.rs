use std::collections::HashSet;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::tui::types::AppMessage;

/// Backend events delivered over the smart-agent WebSocket, normalized at
/// the ingestion boundary. Wire names vary (`code.character_written`,
/// `code_character_written`, `code_written` are all the same event);
/// callers only ever see the tagged variants.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    GenerationStarted,
    GenerationStep { description: String },
    GenerationProgress { percent: f64, message: Option<String> },
    FileAnnounced { path: String },
    CodeCharacterWritten { path: String, content: String, line: usize, column: usize },
    EditorContentUpdated { path: String, content: String },
    FileCreated { path: String },
    GenerationFinished,
    GenerationError { message: String },
    DependencyInstalled { package: String },
    BuildUpdate { status: String },
    GitCommitted { message: String },
    Unknown(String),
}

pub fn parse_event(raw: &str) -> Option<WsEvent> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping malformed WebSocket frame: {}", e);
            return None;
        }
    };

    let kind = value
        .get("type")
        .or_else(|| value.get("event"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let text = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let number = |key: &str| value.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as usize;

    let event = match kind.as_str() {
        "generation.started" | "generation_started" => WsEvent::GenerationStarted,
        "generation.step" | "generation_step" => WsEvent::GenerationStep {
            description: text("step"),
        },
        "generation.progress" | "generation_progress" => WsEvent::GenerationProgress {
            percent: value
                .get("percent")
                .or_else(|| value.get("progress"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            message: value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        },
        "file.announced" | "file_announced" => WsEvent::FileAnnounced { path: text("path") },
        "code_character_written" | "code.character_written" | "code_written" => {
            WsEvent::CodeCharacterWritten {
                path: text("path"),
                content: content_field(&value),
                line: number("line"),
                column: number("column"),
            }
        }
        "editor.content_updated" | "editor_content_updated" => WsEvent::EditorContentUpdated {
            path: text("path"),
            content: content_field(&value),
        },
        "file.created" | "file_created" => WsEvent::FileCreated { path: text("path") },
        "generation.finished" | "generation_finished" => WsEvent::GenerationFinished,
        "generation.error" | "generation_error" => WsEvent::GenerationError {
            message: value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("generation failed")
                .to_string(),
        },
        "dependency.installed" | "dependency_installed" => WsEvent::DependencyInstalled {
            package: text("package"),
        },
        "build.update" | "build_update" => WsEvent::BuildUpdate {
            status: text("status"),
        },
        "git.committed" | "git_committed" => WsEvent::GitCommitted {
            message: text("message"),
        },
        _ => WsEvent::Unknown(kind),
    };

    Some(event)
}

fn content_field(value: &Value) -> String {
    for key in ["content", "text", "code"] {
        if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    String::new()
}

/// Connect to the smart-agent WebSocket and forward events to the app
/// channel. Reconnects forever with the configured delay; stops only when
/// the receiving side of the channel is gone. Unknown event kinds are
/// logged once per kind.
pub fn spawn_ws_listener(
    url: String,
    reconnect_delay: Duration,
    tx: mpsc::UnboundedSender<AppMessage>,
) {
    tokio::spawn(async move {
        let mut unknown_logged: HashSet<String> = HashSet::new();

        loop {
            match connect_async(url.as_str()).await {
                Ok((mut socket, _)) => {
                    info!("WebSocket connected: {}", url);
                    let _ = tx.send(AppMessage::WsConnected(true));

                    while let Some(message) = socket.next().await {
                        match message {
                            Ok(Message::Text(raw)) => {
                                if let Some(event) = parse_event(&raw) {
                                    if let WsEvent::Unknown(kind) = &event {
                                        if unknown_logged.insert(kind.clone()) {
                                            warn!("Unknown WebSocket event kind: {:?}", kind);
                                        }
                                        continue;
                                    }
                                    if tx.send(AppMessage::Ws(event)).is_err() {
                                        return;
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(e) => {
                                warn!("WebSocket read error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("WebSocket connect failed: {}", e);
                }
            }

            if tx.send(AppMessage::WsConnected(false)).is_err() {
                return;
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_written_aliases_normalize() {
        for kind in ["code_character_written", "code.character_written", "code_written"] {
            let raw = format!(
                "{{\"type\":\"{}\",\"path\":\"/a.js\",\"content\":\"let x\",\"line\":1,\"column\":5}}",
                kind
            );
            let event = parse_event(&raw).unwrap();
            assert_eq!(
                event,
                WsEvent::CodeCharacterWritten {
                    path: "/a.js".into(),
                    content: "let x".into(),
                    line: 1,
                    column: 5,
                },
                "alias {}",
                kind
            );
        }
    }

    #[test]
    fn test_event_field_as_type_key() {
        let event = parse_event("{\"event\":\"generation.started\"}").unwrap();
        assert_eq!(event, WsEvent::GenerationStarted);
    }

    #[test]
    fn test_unknown_kind_is_tagged_not_dropped() {
        let event = parse_event("{\"type\":\"telemetry.blob\"}").unwrap();
        assert_eq!(event, WsEvent::Unknown("telemetry.blob".into()));
    }

    #[test]
    fn test_malformed_frame_skipped() {
        assert_eq!(parse_event("{oops"), None);
    }

    #[test]
    fn test_progress_accepts_both_field_names() {
        let event =
            parse_event("{\"type\":\"generation.progress\",\"progress\":0.4}").unwrap();
        assert_eq!(
            event,
            WsEvent::GenerationProgress {
                percent: 0.4,
                message: None
            }
        );
    }

    #[test]
    fn test_file_created() {
        let event = parse_event("{\"type\":\"file.created\",\"path\":\"src/main.rs\"}").unwrap();
        assert_eq!(
            event,
            WsEvent::FileCreated {
                path: "src/main.rs".into()
            }
        );
    }
}
