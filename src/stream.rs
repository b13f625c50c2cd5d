use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{BackendClient, ChatTurn};
use crate::tui::types::AppMessage;

/// One decoded frame of a chat SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Content(String),
    Done,
    Error(String),
}

/// Incremental decoder for `data: {json}\n\n` framing.
///
/// Network reads may split a logical line anywhere, so the decoder keeps a
/// carry-over buffer: each chunk is appended, complete lines are processed,
/// and the trailing partial line waits for the next chunk. The decoded
/// frame sequence is identical for every chunking of the same byte stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);

            if let Some(frame) = decode_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }
}

fn decode_line(line: &str) -> Option<SseFrame> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            // Framing anomaly; skip the line, never surface to the user.
            warn!("Skipping malformed SSE frame: {} ({:?})", e, data);
            return None;
        }
    };

    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return Some(SseFrame::Error(error.to_string()));
    }
    if value.get("done").and_then(|v| v.as_bool()) == Some(true) {
        return Some(SseFrame::Done);
    }
    if let Some(content) = value.get("content").and_then(|v| v.as_str()) {
        return Some(SseFrame::Content(content.to_string()));
    }

    debug!("Ignoring unrecognized SSE payload: {}", data);
    None
}

/// Spawn the chat stream reader for one assistant message.
///
/// Frames are forwarded to the app channel in arrival order. Whatever the
/// exit path (done frame, error frame, network failure, early close), a
/// final `StreamClosed` is always sent so the loading flag can never stay
/// stuck.
pub fn spawn_chat_stream(
    client: BackendClient,
    history: Vec<ChatTurn>,
    message_id: Uuid,
    tx: mpsc::UnboundedSender<AppMessage>,
) {
    tokio::spawn(async move {
        read_stream(client, history, message_id, tx.clone()).await;
        let _ = tx.send(AppMessage::StreamClosed { id: message_id });
    });
}

async fn read_stream(
    client: BackendClient,
    history: Vec<ChatTurn>,
    message_id: Uuid,
    tx: mpsc::UnboundedSender<AppMessage>,
) {
    let url = format!("{}/api/chat", client.base_url());
    let request = client
        .http()
        .post(&url)
        .json(&serde_json::json!({ "messages": history, "stream": true }));

    let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let _ = tx.send(AppMessage::StreamError {
                id: message_id,
                error: format!("Chat request failed ({}): {}", status, body),
            });
            return;
        }
        Err(e) => {
            let _ = tx.send(AppMessage::StreamError {
                id: message_id,
                error: format!("Could not reach the backend: {}", e),
            });
            return;
        }
    };

    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                // Keep whatever content already arrived; the message is
                // finalized with it rather than dropped.
                let _ = tx.send(AppMessage::StreamError {
                    id: message_id,
                    error: format!("Stream read error: {}", e),
                });
                return;
            }
        };

        for frame in decoder.push(&String::from_utf8_lossy(&chunk)) {
            match frame {
                SseFrame::Content(text) => {
                    let _ = tx.send(AppMessage::StreamDelta {
                        id: message_id,
                        text,
                    });
                }
                SseFrame::Done => {
                    let _ = tx.send(AppMessage::StreamDone { id: message_id });
                    return;
                }
                SseFrame::Error(error) => {
                    let _ = tx.send(AppMessage::StreamError {
                        id: message_id,
                        error,
                    });
                    return;
                }
            }
        }
    }

    // Stream ended without a done frame; treat as complete.
    let _ = tx.send(AppMessage::StreamDone { id: message_id });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut SseDecoder, chunks: &[&str]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.push(chunk));
        }
        frames
    }

    #[test]
    fn test_basic_frames() {
        let mut decoder = SseDecoder::new();
        let frames = collect(
            &mut decoder,
            &["data: {\"content\":\"hello\"}\n\ndata: {\"done\":true}\n\n"],
        );
        assert_eq!(
            frames,
            vec![SseFrame::Content("hello".into()), SseFrame::Done]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let stream = "data: {\"content\":\"abc\"}\n\ndata: {\"content\":\"def\"}\n\ndata: {\"done\":true}\n\n";

        // Decode the whole stream in one piece as the reference.
        let mut whole = SseDecoder::new();
        let expected = whole.push(stream);

        // Then at every possible split point.
        for split in 0..=stream.len() {
            let mut decoder = SseDecoder::new();
            let frames = collect(&mut decoder, &[&stream[..split], &stream[split..]]);
            assert_eq!(frames, expected, "split at byte {}", split);
        }

        // And byte-at-a-time.
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for i in 0..stream.len() {
            frames.extend(decoder.push(&stream[i..i + 1]));
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_malformed_json_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push("data: {not json}\ndata: {\"content\":\"ok\"}\n");
        assert_eq!(frames, vec![SseFrame::Content("ok".into())]);
    }

    #[test]
    fn test_error_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push("data: {\"error\":\"model unavailable\"}\n\n");
        assert_eq!(frames, vec![SseFrame::Error("model unavailable".into())]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(": keepalive\nevent: message\ndata: {\"content\":\"x\"}\n");
        assert_eq!(frames, vec![SseFrame::Content("x".into())]);
    }
}
