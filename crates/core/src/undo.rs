use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;
use tracing::{info, warn};

/// How a command's last effect can be rolled back. Undo is structural on
/// purpose: it removes the last line or the last section, whatever that
/// entry contains, so it works even when the entry is malformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UndoKind {
    /// Drop the last line of this month's append-only JSONL journal.
    JournalLine,
    /// Drop the trailing dated section of the free-text notes document.
    NoteSection,
}

fn undo_kind(command: &str) -> Option<UndoKind> {
    match command {
        "log" => Some(UndoKind::JournalLine),
        "listen" | "note" => Some(UndoKind::NoteSection),
        _ => None,
    }
}

/// Undo the last entry produced by `command` under `agent_path`. Returns
/// whether anything was removed; a missing or empty target is a quiet
/// failure, never an error.
pub fn undo_last(command: &str, agent_path: &Path) -> bool {
    match undo_kind(command) {
        Some(UndoKind::JournalLine) => undo_journal_line(agent_path),
        Some(UndoKind::NoteSection) => undo_note_section(agent_path),
        None => {
            warn!(%command, "no undo handler for command");
            false
        }
    }
}

fn journal_file(agent_path: &Path) -> PathBuf {
    let month = Local::now().format("%Y-%m");
    agent_path.join("journal").join(format!("{month}.jsonl"))
}

fn undo_journal_line(agent_path: &Path) -> bool {
    let journal = journal_file(agent_path);
    let Ok(content) = fs::read_to_string(&journal) else {
        warn!(path = %journal.display(), "no journal to undo");
        return false;
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        warn!(path = %journal.display(), "journal is empty");
        return false;
    }

    let mut lines = trimmed.lines().collect::<Vec<_>>();
    lines.pop();
    let remaining =
        if lines.is_empty() { String::new() } else { format!("{}\n", lines.join("\n")) };

    if let Err(err) = fs::write(&journal, remaining) {
        warn!(path = %journal.display(), error = %err, "could not rewrite journal");
        return false;
    }

    info!(path = %journal.display(), "removed last journal entry");
    true
}

fn trailing_note_section() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\n## \d{4}-\d{2}-\d{2} \d{2}:\d{2}\n[^#]*$")
            .expect("note section pattern is valid")
    })
}

fn undo_note_section(agent_path: &Path) -> bool {
    let notes = agent_path.join("notes.md");
    let Ok(content) = fs::read_to_string(&notes) else {
        warn!(path = %notes.display(), "no notes to undo");
        return false;
    };

    let Some(section) = trailing_note_section().find(&content) else {
        warn!(path = %notes.display(), "no note section found to undo");
        return false;
    };

    if let Err(err) = fs::write(&notes, &content[..section.start()]) {
        warn!(path = %notes.display(), error = %err, "could not rewrite notes");
        return false;
    }

    info!(path = %notes.display(), "removed last note section");
    true
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::Local;
    use tempfile::TempDir;

    use super::undo_last;

    fn write_journal(agent_path: &Path, content: &str) -> std::path::PathBuf {
        let journal_dir = agent_path.join("journal");
        fs::create_dir_all(&journal_dir).expect("journal dir");
        let file = journal_dir.join(format!("{}.jsonl", Local::now().format("%Y-%m")));
        fs::write(&file, content).expect("journal fixture");
        file
    }

    #[test]
    fn removes_exactly_the_last_journal_line() {
        let dir = TempDir::new().expect("tempdir");
        let file = write_journal(dir.path(), "{\"food\":\"breakfast\"}\n{\"food\":\"lunch\"}\n");

        assert!(undo_last("log", dir.path()));
        assert_eq!(fs::read_to_string(&file).expect("journal"), "{\"food\":\"breakfast\"}\n");
    }

    #[test]
    fn journal_undo_never_inspects_line_content() {
        let dir = TempDir::new().expect("tempdir");
        let file = write_journal(dir.path(), "{\"ok\":true}\nnot even json\n");

        assert!(undo_last("log", dir.path()));
        assert_eq!(fs::read_to_string(&file).expect("journal"), "{\"ok\":true}\n");
    }

    #[test]
    fn empty_journal_fails_quietly_and_repeatedly() {
        let dir = TempDir::new().expect("tempdir");
        let file = write_journal(dir.path(), "  \n");

        assert!(!undo_last("log", dir.path()));
        assert!(!undo_last("log", dir.path()), "second undo must also fail without corrupting");
        assert_eq!(fs::read_to_string(&file).expect("journal"), "  \n");
    }

    #[test]
    fn single_line_journal_undoes_to_empty() {
        let dir = TempDir::new().expect("tempdir");
        let file = write_journal(dir.path(), "{\"food\":\"toast\"}\n");

        assert!(undo_last("log", dir.path()));
        assert_eq!(fs::read_to_string(&file).expect("journal"), "");
        assert!(!undo_last("log", dir.path()), "nothing left to undo");
    }

    #[test]
    fn missing_journal_fails_quietly() {
        let dir = TempDir::new().expect("tempdir");
        assert!(!undo_last("log", dir.path()));
    }

    #[test]
    fn removes_the_trailing_note_section() {
        let dir = TempDir::new().expect("tempdir");
        let notes = dir.path().join("notes.md");
        fs::write(
            &notes,
            "# Notes\n\n## 2026-01-01 10:00\nFirst idea\n\n## 2026-01-01 11:00\nSecond idea\n",
        )
        .expect("notes fixture");

        assert!(undo_last("listen", dir.path()));
        let content = fs::read_to_string(&notes).expect("notes");
        assert!(content.contains("First idea"));
        assert!(!content.contains("Second idea"));
    }

    #[test]
    fn note_alias_shares_the_note_undo() {
        let dir = TempDir::new().expect("tempdir");
        let notes = dir.path().join("notes.md");
        fs::write(&notes, "# Notes\n\n## 2026-02-03 09:15\nOnly idea\n").expect("notes fixture");

        assert!(undo_last("note", dir.path()));
        assert_eq!(fs::read_to_string(&notes).expect("notes"), "# Notes\n");
    }

    #[test]
    fn section_starting_at_byte_zero_is_not_matched() {
        // The pattern is anchored on the preceding newline, matching the
        // reference behavior: a document that opens directly with a dated
        // header has no removable trailing section.
        let dir = TempDir::new().expect("tempdir");
        let notes = dir.path().join("notes.md");
        fs::write(&notes, "## 2026-02-03 09:15\nOnly idea\n").expect("notes fixture");

        assert!(!undo_last("note", dir.path()));
    }

    #[test]
    fn notes_without_sections_fail_quietly() {
        let dir = TempDir::new().expect("tempdir");
        let notes = dir.path().join("notes.md");
        fs::write(&notes, "just prose, no dated sections\n").expect("notes fixture");

        assert!(!undo_last("listen", dir.path()));
        assert_eq!(
            fs::read_to_string(&notes).expect("notes"),
            "just prose, no dated sections\n"
        );
    }

    #[test]
    fn missing_notes_fail_quietly() {
        let dir = TempDir::new().expect("tempdir");
        assert!(!undo_last("listen", dir.path()));
    }

    #[test]
    fn unknown_command_cannot_be_undone() {
        let dir = TempDir::new().expect("tempdir");
        assert!(!undo_last("research", dir.path()));
        assert!(!undo_last("made-up", dir.path()));
    }
}
