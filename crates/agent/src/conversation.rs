use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Token accounting reported by the final `result` line of a Claude run.
/// Latest-call values, not cumulative: each call's `input_tokens` already
/// covers the full resumed history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct StoredConversation {
    date: String,
    conversation_id: String,
    #[serde(default)]
    usage: Usage,
}

/// Daily conversation continuity for one agent's conversations directory.
/// A conversation ID is only worth resuming on the day it was created;
/// a new day starts a fresh conversation.
#[derive(Clone, Debug)]
pub struct ConversationLedger {
    dir: PathBuf,
}

impl ConversationLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_file(&self) -> PathBuf {
        self.dir.join(".claude-session.json")
    }

    fn read(&self) -> Option<StoredConversation> {
        let raw = fs::read_to_string(self.session_file()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Today's conversation ID, if one is on file.
    pub fn todays_conversation_id(&self) -> Option<String> {
        let stored = self.read()?;
        (stored.date == today()).then_some(stored.conversation_id)
    }

    /// Record the conversation ID and latest usage under today's date.
    pub fn save(&self, conversation_id: &str, usage: Usage) {
        let stored = StoredConversation {
            date: today(),
            conversation_id: conversation_id.to_string(),
            usage,
        };

        if let Err(err) = fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(self.session_file(), serde_json::to_string(&stored)?))
        {
            warn!(dir = %self.dir.display(), error = %err, "could not persist conversation id");
        }
    }

    /// Forget the current conversation so the next request starts fresh.
    pub fn clear(&self) {
        let file = self.session_file();
        if file.exists() {
            if let Err(err) = fs::remove_file(&file) {
                warn!(path = %file.display(), error = %err, "could not clear conversation");
            }
        }
    }

    /// A voice-friendly summary of how full the context window is.
    pub fn context_usage_summary(&self) -> String {
        let Some(stored) = self.read() else {
            return "No active conversation yet.".to_string();
        };

        if stored.date != today() {
            return "No conversation today yet.".to_string();
        }

        let input_tokens = stored.usage.input_tokens;
        let cache_tokens = stored.usage.cache_read_input_tokens;

        // input_tokens is the whole resumed context against a ~200k window.
        let status = if input_tokens > 150_000 {
            "Getting long, consider starting fresh."
        } else if input_tokens > 100_000 {
            "Past halfway, keep an eye on it."
        } else if input_tokens > 50_000 {
            "About a quarter used."
        } else {
            "Plenty of room."
        };

        let cache_pct = if input_tokens > 0 { cache_tokens * 100 / input_tokens } else { 0 };
        format!("{}k tokens in context, {cache_pct}% cached. {status}", input_tokens / 1000)
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{ConversationLedger, Usage};

    #[test]
    fn save_and_resume_same_day() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = ConversationLedger::new(dir.path());

        assert_eq!(ledger.todays_conversation_id(), None);
        ledger.save("abc-123", Usage::default());
        assert_eq!(ledger.todays_conversation_id().as_deref(), Some("abc-123"));

        ledger.clear();
        assert_eq!(ledger.todays_conversation_id(), None);
    }

    #[test]
    fn stale_date_is_not_resumed() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = ConversationLedger::new(dir.path());
        fs::write(
            dir.path().join(".claude-session.json"),
            r#"{"date":"2001-01-01","conversation_id":"old-id"}"#,
        )
        .expect("fixture write");

        assert_eq!(ledger.todays_conversation_id(), None);
        assert_eq!(ledger.context_usage_summary(), "No conversation today yet.");
    }

    #[test]
    fn corrupt_session_file_reads_as_absent() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = ConversationLedger::new(dir.path());
        fs::write(dir.path().join(".claude-session.json"), "{broken").expect("fixture write");

        assert_eq!(ledger.todays_conversation_id(), None);
        assert_eq!(ledger.context_usage_summary(), "No active conversation yet.");
    }

    #[test]
    fn usage_summary_reports_fill_level() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = ConversationLedger::new(dir.path());

        ledger.save(
            "abc",
            Usage { input_tokens: 120_000, output_tokens: 900, cache_read_input_tokens: 60_000 },
        );
        let summary = ledger.context_usage_summary();
        assert!(summary.starts_with("120k tokens in context, 50% cached."), "got: {summary}");
        assert!(summary.contains("Past halfway"));

        ledger.save("abc", Usage { input_tokens: 10_000, ..Usage::default() });
        assert!(ledger.context_usage_summary().contains("Plenty of room."));
    }
}
