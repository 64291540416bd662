use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Source of the instruction text behind prompt-backed voice commands.
/// Each command is a markdown file named after it; an agent's own
/// `voice-commands/` directory shadows the global one.
#[derive(Clone, Debug)]
pub struct CommandPrompts {
    global_dir: PathBuf,
}

impl CommandPrompts {
    pub fn new(global_dir: impl Into<PathBuf>) -> Self {
        Self { global_dir: global_dir.into() }
    }

    pub fn load(&self, command: &str, agent_path: &Path) -> Option<String> {
        let agent_file = agent_path.join("voice-commands").join(format!("{command}.md"));
        if let Ok(prompt) = fs::read_to_string(&agent_file) {
            info!(path = %agent_file.display(), "loaded agent command prompt");
            return Some(prompt);
        }

        let global_file = self.global_dir.join(format!("{command}.md"));
        if let Ok(prompt) = fs::read_to_string(&global_file) {
            info!(path = %global_file.display(), "loaded global command prompt");
            return Some(prompt);
        }

        warn!(%command, "no command prompt found");
        None
    }
}
