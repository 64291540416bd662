use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use parlance_core::session::SessionStore;

use crate::bootstrap::AppState;

/// Append one exchange to the day's conversation log:
/// a `## HH:MM` section with the user's words, optional agent thinking,
/// and the agent's reply.
pub fn log_conversation(
    conversations_dir: &Path,
    user_text: &str,
    assistant_text: &str,
    thinking_text: &str,
    source: Option<&str>,
) {
    if let Err(err) = fs::create_dir_all(conversations_dir) {
        warn!(dir = %conversations_dir.display(), error = %err, "could not create log dir");
        return;
    }

    let now = Local::now();
    let log_file = conversations_dir.join(format!("{}.md", now.format("%Y-%m-%d")));

    let marker = source.map(|s| format!(" [{s}]")).unwrap_or_default();
    let mut entry = format!("\n## {}{marker}\n**You:** {user_text}\n\n", now.format("%H:%M"));
    if !thinking_text.is_empty() {
        entry.push_str(&format!("**Agent thinking:** {thinking_text}\n\n"));
    }
    entry.push_str(&format!("**Agent:** {assistant_text}\n"));

    let appended = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .and_then(|mut file| std::io::Write::write_all(&mut file, entry.as_bytes()));
    if let Err(err) = appended {
        warn!(path = %log_file.display(), error = %err, "could not append conversation log");
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    pub timestamp: String,
}

fn section_header() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^## (\d{1,2}:\d{2}).*$").expect("section header pattern is valid")
    })
}

/// Text after `marker`, cut at the first of `stops` (or the section end).
fn field_after<'a>(section: &'a str, marker: &str, stops: &[&str]) -> Option<&'a str> {
    let start = section.find(marker)? + marker.len();
    let tail = &section[start..];
    let end = stops.iter().filter_map(|stop| tail.find(stop)).min().unwrap_or(tail.len());
    let value = tail[..end].trim();
    (!value.is_empty()).then_some(value)
}

/// Parse one day's markdown log into ordered messages.
pub fn parse_log(content: &str) -> Vec<LogMessage> {
    let headers = section_header().captures_iter(content).collect::<Vec<_>>();
    let mut messages = Vec::new();

    for (index, header) in headers.iter().enumerate() {
        let timestamp = header.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        let section_start = header.get(0).map(|m| m.end()).unwrap_or_default();
        let section_end = headers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());
        let section = &content[section_start..section_end];

        if let Some(user) =
            field_after(section, "**You:** ", &["\n**Agent thinking:**", "\n**Agent:**"])
        {
            messages.push(LogMessage {
                role: "user",
                content: user.to_string(),
                thinking: String::new(),
                timestamp: timestamp.clone(),
            });
        }

        let thinking = field_after(section, "**Agent thinking:** ", &["\n**Agent:**"])
            .unwrap_or_default()
            .to_string();

        if let Some(agent) = field_after(section, "**Agent:** ", &[]) {
            messages.push(LogMessage {
                role: "assistant",
                content: agent.to_string(),
                thinking,
                timestamp,
            });
        }
    }

    messages
}

/// The most recent agent reply in today's log, for the repeat command.
pub fn last_agent_reply(conversations_dir: &Path) -> Option<String> {
    let content = fs::read_to_string(todays_log_file(conversations_dir)).ok()?;
    parse_log(&content)
        .into_iter()
        .rev()
        .find(|message| message.role == "assistant")
        .map(|message| message.content)
}

fn preview_of(content: &str, max_chars: usize) -> String {
    parse_log(content)
        .into_iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content.chars().take(max_chars).collect())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub date: String,
    pub preview: String,
    pub agent: String,
}

fn date_stem() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"))
}

fn stored_conversation_id(conversations_dir: &Path, date: &str) -> Option<String> {
    let raw = fs::read_to_string(conversations_dir.join(".claude-session.json")).ok()?;
    let value = serde_json::from_str::<serde_json::Value>(&raw).ok()?;
    (value.get("date")?.as_str()? == date)
        .then(|| value.get("conversation_id")?.as_str().map(str::to_string))
        .flatten()
}

/// GET /api/conversations — one summary per logged day for the active
/// agent, newest first.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ConversationSummary>> {
    let agent = state.session.current_agent();
    let conversations_dir = state.conversations_dir(agent.as_deref());
    let agent_label =
        agent.unwrap_or_else(|| crate::bootstrap::DEFAULT_CONVERSATIONS_NAME.to_string());

    let mut summaries = Vec::new();
    if let Ok(entries) = fs::read_dir(&conversations_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else { continue };
            if path.extension().and_then(|ext| ext.to_str()) != Some("md")
                || !date_stem().is_match(stem)
            {
                continue;
            }

            let preview =
                fs::read_to_string(&path).map(|content| preview_of(&content, 100)).unwrap_or_default();
            let id = stored_conversation_id(&conversations_dir, stem)
                .unwrap_or_else(|| stem.to_string());

            summaries.push(ConversationSummary {
                id,
                date: stem.to_string(),
                preview,
                agent: agent_label.clone(),
            });
        }
    }

    summaries.sort_by(|a, b| b.date.cmp(&a.date));
    Json(summaries)
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    3
}

#[derive(Debug, Serialize)]
pub struct RecentMessages {
    pub messages: Vec<LogMessage>,
}

/// GET /api/conversations/recent?days=N — the last N days of messages,
/// merged oldest-first so the newest sits at the bottom of a chat view.
pub async fn recent_messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Json<RecentMessages> {
    let agent = state.session.current_agent();
    let conversations_dir = state.conversations_dir(agent.as_deref());

    let today = Local::now().date_naive();
    let mut dated = Vec::new();
    for offset in (0..params.days.max(0)).rev() {
        let date = today - Duration::days(offset);
        let date_str = date.format("%Y-%m-%d").to_string();
        let file = conversations_dir.join(format!("{date_str}.md"));
        if let Ok(content) = fs::read_to_string(&file) {
            for message in parse_log(&content) {
                dated.push((format!("{date_str}T{}", message.timestamp), message));
            }
        }
    }

    dated.sort_by(|a, b| a.0.cmp(&b.0));
    Json(RecentMessages { messages: dated.into_iter().map(|(_, message)| message).collect() })
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: String,
    pub messages: Vec<LogMessage>,
}

/// GET /api/conversations/{id} — a full day by date, or by the stored
/// conversation ID when the UI hands one back.
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<ConversationDetail>, StatusCode> {
    let agent = state.session.current_agent();
    let conversations_dir = state.conversations_dir(agent.as_deref());

    let date = if date_stem().is_match(&id) {
        Some(id.clone())
    } else {
        stored_date_for_id(&conversations_dir, &id)
    };

    let Some(date) = date else {
        return Err(StatusCode::NOT_FOUND);
    };
    let content = fs::read_to_string(conversations_dir.join(format!("{date}.md")))
        .map_err(|_| StatusCode::NOT_FOUND)?;

    Ok(Json(ConversationDetail { id, messages: parse_log(&content) }))
}

fn stored_date_for_id(conversations_dir: &Path, conversation_id: &str) -> Option<String> {
    let raw = fs::read_to_string(conversations_dir.join(".claude-session.json")).ok()?;
    let value = serde_json::from_str::<serde_json::Value>(&raw).ok()?;
    (value.get("conversation_id")?.as_str()? == conversation_id)
        .then(|| value.get("date")?.as_str().map(str::to_string))
        .flatten()
}

pub fn todays_log_file(conversations_dir: &Path) -> PathBuf {
    conversations_dir.join(format!("{}.md", Local::now().format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{last_agent_reply, log_conversation, parse_log, preview_of, todays_log_file};

    const SAMPLE: &str = "\n## 09:15\n**You:** what's for lunch\n\n**Agent:** Leftover curry.\n\
                          \n## 14:30 [chat]\n**You:** remind me to stretch\n\n\
                          **Agent thinking:** short reminder, keep it light\n\n\
                          **Agent:** Stretch break at three.\n";

    #[test]
    fn parses_sections_with_and_without_thinking() {
        let messages = parse_log(SAMPLE);
        assert_eq!(messages.len(), 4);

        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "what's for lunch");
        assert_eq!(messages[0].timestamp, "09:15");

        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "Leftover curry.");
        assert_eq!(messages[1].thinking, "");

        assert_eq!(messages[3].thinking, "short reminder, keep it light");
        assert_eq!(messages[3].content, "Stretch break at three.");
        assert_eq!(messages[3].timestamp, "14:30");
    }

    #[test]
    fn empty_or_garbled_logs_parse_to_nothing() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("no headers here\njust prose").is_empty());
    }

    #[test]
    fn preview_is_the_last_user_message_truncated() {
        assert_eq!(preview_of(SAMPLE, 100), "remind me to stretch");
        assert_eq!(preview_of(SAMPLE, 6), "remind");
        assert_eq!(preview_of("", 100), "");
    }

    #[test]
    fn log_then_repeat_round_trip() {
        let dir = TempDir::new().expect("tempdir");

        log_conversation(dir.path(), "diet agent what should I eat", "Try the soup.", "", None);
        log_conversation(dir.path(), "and after that?", "A walk outside.", "it is sunny", Some("chat"));

        assert_eq!(last_agent_reply(dir.path()).as_deref(), Some("A walk outside."));

        let content = fs::read_to_string(todays_log_file(dir.path())).expect("log file");
        assert!(content.contains("**You:** diet agent what should I eat"));
        assert!(content.contains("[chat]"));
        assert!(content.contains("**Agent thinking:** it is sunny"));
    }

    #[test]
    fn last_agent_reply_is_none_without_todays_log() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(last_agent_reply(dir.path()), None);
    }
}
