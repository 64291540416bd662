use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Snapshot of the most recent executed command, kept for undo/repeat.
/// Overwritten on every execution, consumed by undo.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LastCommand {
    pub agent: Option<String>,
    pub command: String,
    pub message: String,
    pub agent_path: PathBuf,
}

/// The whole persisted session record. Fields this crate does not own are
/// carried through `extra` so a read-modify-write never drops them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command: Option<LastCommand>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Why a persisted record could not be produced. Callers of the public
/// store API never see this; both kinds collapse to the empty record.
#[derive(Debug, Error)]
pub enum SessionReadError {
    #[error("session record does not exist")]
    Missing,
    #[error("session record is unreadable or malformed: {0}")]
    Corrupt(String),
}

/// Sticky-agent and last-command persistence across stateless requests.
///
/// Reads swallow missing/corrupt state into the empty record; every
/// mutation is a whole-record read-modify-write so concurrent writers of
/// unrelated fields cannot clobber each other.
pub trait SessionStore: Send + Sync {
    fn current_agent(&self) -> Option<String>;
    fn save_current_agent(&self, agent: Option<&str>) -> io::Result<()>;
    fn last_command(&self) -> Option<LastCommand>;
    fn save_last_command(&self, last: LastCommand) -> io::Result<()>;
    fn clear_last_command(&self) -> io::Result<()>;
}

/// JSON-file-backed store. A single small record, mutated under a lock so
/// overlapping requests serialize their read-modify-write cycles.
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Result<SessionRecord, SessionReadError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SessionReadError::Missing)
            }
            Err(err) => return Err(SessionReadError::Corrupt(err.to_string())),
        };
        serde_json::from_str(&raw).map_err(|err| SessionReadError::Corrupt(err.to_string()))
    }

    /// The record as the rest of the system sees it: corruption and
    /// absence are both just "empty state".
    pub fn record(&self) -> SessionRecord {
        match self.read_record() {
            Ok(record) => record,
            Err(SessionReadError::Missing) => SessionRecord::default(),
            Err(SessionReadError::Corrupt(reason)) => {
                warn!(path = %self.path.display(), %reason, "treating session record as empty");
                SessionRecord::default()
            }
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut SessionRecord)) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut record = self.record();
        apply(&mut record);
        let serialized = serde_json::to_string(&record)?;
        fs::write(&self.path, serialized)
    }
}

impl SessionStore for FileSessionStore {
    fn current_agent(&self) -> Option<String> {
        self.record().current_agent
    }

    fn save_current_agent(&self, agent: Option<&str>) -> io::Result<()> {
        self.mutate(|record| record.current_agent = agent.map(str::to_string))
    }

    fn last_command(&self) -> Option<LastCommand> {
        self.record().last_command
    }

    fn save_last_command(&self, last: LastCommand) -> io::Result<()> {
        self.mutate(|record| record.last_command = Some(last))
    }

    fn clear_last_command(&self) -> io::Result<()> {
        self.mutate(|record| record.last_command = None)
    }
}

/// Process-local store for tests and dry runs.
#[derive(Default)]
pub struct InMemorySessionStore {
    record: Mutex<SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(&self, apply: impl FnOnce(&mut SessionRecord) -> T) -> T {
        let mut record = self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut record)
    }
}

impl SessionStore for InMemorySessionStore {
    fn current_agent(&self) -> Option<String> {
        self.with_record(|record| record.current_agent.clone())
    }

    fn save_current_agent(&self, agent: Option<&str>) -> io::Result<()> {
        self.with_record(|record| record.current_agent = agent.map(str::to_string));
        Ok(())
    }

    fn last_command(&self) -> Option<LastCommand> {
        self.with_record(|record| record.last_command.clone())
    }

    fn save_last_command(&self, last: LastCommand) -> io::Result<()> {
        self.with_record(|record| record.last_command = Some(last));
        Ok(())
    }

    fn clear_last_command(&self) -> io::Result<()> {
        self.with_record(|record| record.last_command = None);
        Ok(())
    }
}
