use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use parlance_agent::{ConversationLedger, StreamEvent};
use parlance_audio::{sniff_extension, Transcriber};
use parlance_core::session::SessionStore;

use crate::bootstrap::AppState;
use crate::conversations::log_conversation;

const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

type SseStream = BoxStream<'static, Result<Event, Infallible>>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Accumulates the streamed reply so the finished conversation can be
/// logged when the `done` event arrives.
struct SseDriver {
    receiver: mpsc::Receiver<StreamEvent>,
    conversations_dir: PathBuf,
    user_text: String,
    source: &'static str,
    pending: Option<Event>,
    response: Vec<String>,
    thinking: Vec<String>,
}

fn content_event(name: &'static str, content: &str) -> Event {
    Event::default()
        .event(name)
        .json_data(serde_json::json!({ "content": content }))
        .unwrap_or_else(|_| Event::default().event(name).data(content.replace('\n', " ")))
}

fn event_stream(driver: SseDriver) -> SseStream {
    stream::unfold(driver, |mut driver| async move {
        if let Some(pending) = driver.pending.take() {
            return Some((Ok(pending), driver));
        }

        let event = match driver.receiver.recv().await? {
            StreamEvent::Thinking(thinking) => {
                driver.thinking.push(thinking.clone());
                content_event("thinking", &thinking)
            }
            StreamEvent::Text(text) => {
                driver.response.push(text.clone());
                content_event("text", &text)
            }
            StreamEvent::Done { conversation_id } => {
                log_conversation(
                    &driver.conversations_dir,
                    &driver.user_text,
                    &driver.response.join("\n"),
                    &driver.thinking.join("\n"),
                    Some(driver.source),
                );
                Event::default()
                    .event("done")
                    .json_data(serde_json::json!({ "conversation_id": conversation_id }))
                    .unwrap_or_else(|_| Event::default().event("done").data(conversation_id))
            }
            StreamEvent::Error(message) => {
                error!(%message, "chat stream failed");
                content_event("error", &message)
            }
        };

        Some((Ok(event), driver))
    })
    .boxed()
}

fn start_stream(state: &Arc<AppState>, message: String, source: &'static str) -> SseDriver {
    let routing = state.routing();
    let agent = state.session.current_agent();
    let (cwd, _voice) = state.agent_context(&routing, agent.as_deref());
    let conversations_dir = state.conversations_dir(agent.as_deref());
    let ledger = ConversationLedger::new(&conversations_dir);

    info!(source, agent = agent.as_deref().unwrap_or("default"), "starting chat stream");
    let receiver = state.claude.stream(message.clone(), cwd, ledger);

    SseDriver {
        receiver,
        conversations_dir,
        user_text: message,
        source,
        pending: None,
        response: Vec::new(),
        thinking: Vec::new(),
    }
}

/// POST /api/chat — stream the assistant's reply as server-sent events.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let driver = start_stream(&state, request.message, "chat");
    Sse::new(event_stream(driver))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn error_only_stream(message: &str) -> SseStream {
    let event = content_event("error", message);
    stream::once(async move { Ok(event) }).boxed()
}

/// POST /api/chat/audio — raw audio in, transcription event first, then
/// the same streamed reply as /api/chat.
pub async fn chat_audio(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if body.len() > MAX_AUDIO_BYTES {
        return Sse::new(error_only_stream("File too large. Maximum size is 25MB."))
            .into_response();
    }

    let suffix = format!(".{}", sniff_extension(&body));
    let transcribed = async {
        let temp = tempfile::Builder::new().suffix(&suffix).tempfile().ok()?;
        std::fs::write(temp.path(), &body).ok()?;
        state.transcriber.transcribe(temp.path()).await.ok()
    }
    .await;

    let Some(text) = transcribed.filter(|text| !text.trim().is_empty()) else {
        return Sse::new(error_only_stream(
            "Could not transcribe audio - the recording may be silent or too short",
        ))
        .into_response();
    };

    let mut driver = start_stream(&state, text.clone(), "audio");
    driver.pending = Some(content_event("transcription", &text));
    Sse::new(event_stream(driver))
        .keep_alive(KeepAlive::default())
        .into_response()
}
