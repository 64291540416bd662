use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info, warn};

use parlance_agent::{slugify_topic, spawn_research, ClaudeError, ConversationLedger};
use parlance_audio::{convert, sniff_extension, AudioError, ErrorCue, Synthesizer, Transcriber};
use parlance_core::extract::{extract, DEFAULT_SCAN_WINDOW};
use parlance_core::routing::builtin;
use parlance_core::session::{LastCommand, SessionStore};
use parlance_core::undo::undo_last;

use crate::bootstrap::AppState;
use crate::conversations::{last_agent_reply, log_conversation};

/// Phrases that reset the day's conversation.
const RESET_PHRASES: [&str; 2] = ["start a new conversation", "reset the conversation"];
/// Phrases that ask how full the context window is.
const CONTEXT_PHRASES: [&str; 2] = ["context usage", "how much context"];

fn matches_any(text: &str, phrases: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim();
    phrases.iter().any(|phrase| trimmed.contains(phrase))
}

fn audio_response(audio: Vec<u8>, media_type: &'static str) -> Response {
    ([(header::CONTENT_TYPE, media_type)], audio).into_response()
}

/// The audible failure path: a cue sound when one is available, a plain
/// status otherwise.
async fn cue_response(state: &AppState, cue: ErrorCue, status: StatusCode, detail: &str) -> Response {
    match state.sounds.error_sound(cue).await {
        Some(sound) => audio_response(sound, state.sounds.format().media_type()),
        None => (status, detail.to_string()).into_response(),
    }
}

async fn chime_response(state: &AppState) -> Response {
    match state.sounds.success_chime().await {
        Some(chime) => audio_response(chime, state.sounds.format().media_type()),
        None => audio_response(Vec::new(), state.sounds.format().media_type()),
    }
}

fn claude_cue(err: &ClaudeError) -> ErrorCue {
    match err {
        // A missing binary will not fix itself between requests.
        ClaudeError::Spawn { .. } => ErrorCue::Fatal,
        _ => ErrorCue::General,
    }
}

fn synthesis_cue(err: &AudioError) -> ErrorCue {
    match err {
        AudioError::Io(_) => ErrorCue::Fatal,
        _ => ErrorCue::SynthesisFailed,
    }
}

/// Markdown markers read terribly out loud.
fn strip_markdown(text: &str) -> String {
    text.chars().filter(|ch| !matches!(ch, '*' | '_' | '`')).collect()
}

/// Synthesize a reply in the configured output format with the
/// notification jingle in front.
async fn speak(state: &AppState, text: &str, voice: Option<&str>) -> Result<Vec<u8>, AudioError> {
    let speech = state.synthesizer.synthesize(text, voice).await?;
    let converted = convert(speech.audio, speech.format, state.sounds.format()).await?;
    Ok(state.sounds.prepend_notification(converted).await)
}

/// POST /voice — raw audio in, audio reply out. The whole routing story
/// lives here: transcribe, extract, sticky-switch, resolve, dispatch.
pub async fn voice(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let media_type = state.sounds.format().media_type();
    info!(bytes = body.len(), "voice request received");

    if body.len() < 100 {
        warn!("audio body too short");
        return cue_response(
            &state,
            ErrorCue::EmptyTranscription,
            StatusCode::BAD_REQUEST,
            "no audio data received",
        )
        .await;
    }

    let suffix = format!(".{}", sniff_extension(&body));
    let temp = match tempfile::Builder::new().suffix(&suffix).tempfile() {
        Ok(temp) => temp,
        Err(err) => {
            error!(error = %err, "could not stage audio");
            return cue_response(
                &state,
                ErrorCue::General,
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not stage audio",
            )
            .await;
        }
    };
    if let Err(err) = std::fs::write(temp.path(), &body) {
        error!(error = %err, "could not stage audio");
        return cue_response(
            &state,
            ErrorCue::General,
            StatusCode::INTERNAL_SERVER_ERROR,
            "could not stage audio",
        )
        .await;
    }

    let user_text = match state.transcriber.transcribe(temp.path()).await {
        Ok(text) => text,
        Err(err) => {
            error!(error = %err, "transcription failed");
            return cue_response(
                &state,
                ErrorCue::General,
                StatusCode::INTERNAL_SERVER_ERROR,
                "transcription failed",
            )
            .await;
        }
    };
    info!(%user_text, "transcription complete");

    if user_text.trim().is_empty() {
        warn!("empty transcription");
        return cue_response(
            &state,
            ErrorCue::EmptyTranscription,
            StatusCode::BAD_REQUEST,
            "could not transcribe audio",
        )
        .await;
    }

    respond_to_utterance(&state, user_text, media_type).await
}

/// Everything after transcription. Split out so the text path is one
/// straight read from extraction to reply.
async fn respond_to_utterance(
    state: &Arc<AppState>,
    original_text: String,
    media_type: &'static str,
) -> Response {
    let routing = state.routing();
    let mut current_agent = state.session.current_agent();
    let extraction = extract(&original_text, &routing, DEFAULT_SCAN_WINDOW);
    let mut user_text = original_text.clone();

    if extraction.has_agent_keyword {
        // Sticky agent switch: the extracted agent (or explicit default)
        // becomes the session's agent before anything else happens.
        if extraction.agent != current_agent {
            if let Err(err) = state.session.save_current_agent(extraction.agent.as_deref()) {
                warn!(error = %err, "could not persist agent switch");
            }
            current_agent = extraction.agent.clone();
            info!(agent = current_agent.as_deref().unwrap_or("default"), "switched agent");
        }

        if let Some(command_name) = &extraction.command {
            let (cwd, voice) = state.agent_context(&routing, current_agent.as_deref());
            let conversations_dir = state.conversations_dir(current_agent.as_deref());

            let Some(command) = routing.command_for_agent(command_name, current_agent.as_deref())
            else {
                warn!(
                    command = %command_name,
                    agent = current_agent.as_deref().unwrap_or("default"),
                    "command not available for agent"
                );
                return cue_response(
                    state,
                    ErrorCue::EmptyTranscription,
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "command not available for this agent",
                )
                .await;
            };

            match command_name.as_str() {
                builtin::UNDO => {
                    let undone = match state.session.last_command() {
                        Some(last) => {
                            let undone = undo_last(&last.command, &last.agent_path);
                            if let Err(err) = state.session.clear_last_command() {
                                warn!(error = %err, "could not clear last command");
                            }
                            undone
                        }
                        None => false,
                    };

                    if !undone {
                        return cue_response(
                            state,
                            ErrorCue::EmptyTranscription,
                            StatusCode::OK,
                            "nothing to undo",
                        )
                        .await;
                    }
                    log_conversation(&conversations_dir, &original_text, "[undo]", "", None);
                    return chime_response(state).await;
                }

                builtin::REPEAT => {
                    let Some(last_reply) = last_agent_reply(&conversations_dir) else {
                        return cue_response(
                            state,
                            ErrorCue::EmptyTranscription,
                            StatusCode::OK,
                            "nothing to repeat",
                        )
                        .await;
                    };
                    return match speak(state, &last_reply, voice.as_deref()).await {
                        Ok(audio) => {
                            log_conversation(
                                &conversations_dir,
                                &original_text,
                                "[repeated]",
                                "",
                                None,
                            );
                            audio_response(audio, media_type)
                        }
                        Err(err) => {
                            error!(error = %err, "repeat synthesis failed");
                            cue_response(
                                state,
                                synthesis_cue(&err),
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "synthesis failed",
                            )
                            .await
                        }
                    };
                }

                builtin::RESEARCH => {
                    let topic_slug = slugify_topic(&extraction.message);
                    let output_dir = cwd.join("research");
                    let spawned = spawn_research(
                        state.claude.binary(),
                        &extraction.message,
                        &output_dir,
                        &topic_slug,
                    );
                    let output_file = match spawned {
                        Ok(output_file) => output_file,
                        Err(err) => {
                            error!(error = %err, "could not spawn research");
                            return cue_response(
                                state,
                                ErrorCue::General,
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "could not start research",
                            )
                            .await;
                        }
                    };

                    let file_name = output_file
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let confirmation = format!(
                        "Started research on {}. Results will be saved to {file_name}",
                        extraction.message
                    );
                    return match speak(state, &confirmation, voice.as_deref()).await {
                        Ok(audio) => {
                            log_conversation(
                                &conversations_dir,
                                &original_text,
                                &confirmation,
                                "",
                                None,
                            );
                            audio_response(audio, media_type)
                        }
                        Err(err) => {
                            error!(error = %err, "research confirmation synthesis failed");
                            cue_response(
                                state,
                                synthesis_cue(&err),
                                StatusCode::INTERNAL_SERVER_ERROR,
                                "synthesis failed",
                            )
                            .await
                        }
                    };
                }

                _ => {
                    if extraction.message.trim().is_empty() {
                        warn!(command = %command_name, "command with no message");
                        return cue_response(
                            state,
                            ErrorCue::EmptyTranscription,
                            StatusCode::BAD_REQUEST,
                            "command needs a message",
                        )
                        .await;
                    }

                    let success = match state.prompts.load(command_name, &cwd) {
                        Some(prompt) => {
                            state.claude.execute_command(&prompt, &extraction.message, &cwd).await
                        }
                        None => false,
                    };

                    if success && command.silent {
                        let saved = state.session.save_last_command(LastCommand {
                            agent: current_agent.clone(),
                            command: command_name.clone(),
                            message: extraction.message.clone(),
                            agent_path: cwd.clone(),
                        });
                        if let Err(err) = saved {
                            warn!(error = %err, "could not persist last command");
                        }
                        log_conversation(
                            &conversations_dir,
                            &original_text,
                            &format!("[{command_name}]"),
                            "",
                            None,
                        );
                        return chime_response(state).await;
                    }

                    // Failed or spoken command: hand the residual message
                    // to the conversation path.
                    user_text = extraction.message.clone();
                }
            }
        } else {
            // Agent switch only; talk about whatever words remain.
            if !extraction.message.is_empty() {
                user_text = extraction.message.clone();
            }
        }
    }

    converse(state, &routing, current_agent.as_deref(), &original_text, &user_text, media_type)
        .await
}

/// The conversational tail of the pipeline: reset/context shortcuts, a
/// Claude turn, then synthesis.
async fn converse(
    state: &Arc<AppState>,
    routing: &parlance_core::routing::RoutingConfig,
    current_agent: Option<&str>,
    original_text: &str,
    user_text: &str,
    media_type: &'static str,
) -> Response {
    let (cwd, voice) = state.agent_context(routing, current_agent);
    let conversations_dir = state.conversations_dir(current_agent);
    let ledger = ConversationLedger::new(&conversations_dir);

    let mut thinking = String::new();
    let assistant_text = if matches_any(user_text, &RESET_PHRASES) {
        info!("resetting conversation");
        ledger.clear();
        "Starting a new conversation.".to_string()
    } else if matches_any(user_text, &CONTEXT_PHRASES) {
        ledger.context_usage_summary()
    } else if user_text.trim().is_empty() {
        // The trigger phrase was the whole utterance.
        "I'm here. What would you like to discuss?".to_string()
    } else {
        match state.claude.ask(user_text, &cwd, &ledger).await {
            Ok(reply) => {
                info!(chars = reply.text.len(), "claude replied");
                thinking = reply.thinking;
                reply.text
            }
            Err(err) => {
                error!(error = %err, "claude request failed");
                return cue_response(
                    state,
                    claude_cue(&err),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "assistant request failed",
                )
                .await;
            }
        }
    };

    let speech_text = strip_markdown(&assistant_text);
    match speak(state, &speech_text, voice.as_deref()).await {
        Ok(audio) => {
            log_conversation(&conversations_dir, user_text, &assistant_text, &thinking, None);
            audio_response(audio, media_type)
        }
        Err(err) => {
            error!(error = %err, "synthesis failed");
            cue_response(
                state,
                synthesis_cue(&err),
                StatusCode::INTERNAL_SERVER_ERROR,
                "synthesis failed",
            )
            .await
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TranscriptionBody {
    pub text: String,
}

/// POST /transcribe — debug endpoint: audio in, text out, no assistant.
pub async fn transcribe_only(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TranscriptionBody>, StatusCode> {
    let suffix = format!(".{}", sniff_extension(&body));
    let temp = tempfile::Builder::new()
        .suffix(&suffix)
        .tempfile()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    std::fs::write(temp.path(), &body).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let text = state
        .transcriber
        .transcribe(temp.path())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(TranscriptionBody { text }))
}

#[derive(Debug, serde::Deserialize)]
pub struct TtsBody {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// POST /tts — debug endpoint: text in, audio out, no assistant.
pub async fn tts_only(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TtsBody>,
) -> Result<Response, StatusCode> {
    let speech = state
        .synthesizer
        .synthesize(&body.text, body.voice.as_deref())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let converted = convert(speech.audio, speech.format, state.sounds.format())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(audio_response(converted, state.sounds.format().media_type()))
}
