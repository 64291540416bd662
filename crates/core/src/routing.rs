use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Command names the orchestrator dispatches itself instead of forwarding
/// as ordinary prompt-backed commands.
pub mod builtin {
    pub const UNDO: &str = "undo";
    pub const REPEAT: &str = "repeat";
    pub const RESEARCH: &str = "research";

    pub fn is_builtin(name: &str) -> bool {
        matches!(name, UNDO | REPEAT | RESEARCH)
    }
}

/// A voice command definition. An empty `agents` list means the command is
/// universal. Aliases resolve to the canonical `name`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CommandSpec {
    /// Whether this command may run for the given agent (`None` = default).
    pub fn allows(&self, agent: Option<&str>) -> bool {
        if self.agents.is_empty() {
            return true;
        }
        agent.is_some_and(|name| self.agents.iter().any(|allowed| allowed == name))
    }

    /// Word-exact match against the canonical name or any alias.
    pub fn matches_word(&self, word: &str) -> bool {
        self.name == word || self.aliases.iter().any(|alias| alias == word)
    }
}

/// A named agent: a working directory the LLM runs in, a synthesis voice,
/// and the derived trigger phrases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    pub name: String,
    pub path: PathBuf,
    pub voice: Option<String>,
    pub triggers: Vec<String>,
}

impl AgentSpec {
    /// Whether a scanned word is this agent's full name or one of the
    /// fragments of its hyphen-split name.
    pub fn matches_word(&self, word: &str) -> bool {
        if self.name == word {
            return true;
        }
        self.name.split('-').any(|fragment| fragment == word)
    }

    /// Name variants searched for in the scan window: the canonical name
    /// and, for hyphenated names, the spoken (space-separated) form.
    pub fn name_variants(&self) -> Vec<String> {
        let mut variants = vec![self.name.clone()];
        if self.name.contains('-') {
            variants.push(self.name.replace('-', " "));
        }
        variants
    }
}

/// Trigger phrases derived from an agent name: `"{name} agent"`, plus the
/// hyphens-to-spaces variant for multi-word names.
pub fn trigger_phrases(name: &str) -> Vec<String> {
    let mut triggers = vec![format!("{name} agent")];
    if name.contains('-') {
        triggers.push(format!("{} agent", name.replace('-', " ")));
    }
    triggers
}

/// The routing half of configuration: transcription-bias keywords, command
/// definitions, and agent definitions, in declaration order. Declaration
/// order is the tie-break everywhere a scan could match twice.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RoutingConfig {
    pub keywords: Vec<String>,
    pub commands: Vec<CommandSpec>,
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Error)]
pub enum RoutingConfigError {
    #[error("could not read routing config `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse routing config `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
}

impl RoutingConfig {
    /// Load from a TOML file. A missing file is a valid empty
    /// configuration: the gateway must run with zero agents.
    pub fn load(path: &Path) -> Result<Self, RoutingConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .map_err(|source| RoutingConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let file = toml::from_str::<RoutingFile>(&raw)
            .map_err(|source| RoutingConfigError::ParseFile { path: path.to_path_buf(), source })?;

        Ok(Self::from_file(file))
    }

    fn from_file(file: RoutingFile) -> Self {
        let commands = file.commands;
        let agents = file
            .agents
            .into_iter()
            .map(|agent| AgentSpec {
                triggers: trigger_phrases(&agent.name),
                path: expand_home(&agent.path),
                name: agent.name,
                voice: agent.voice,
            })
            .collect::<Vec<_>>();

        let config = Self { keywords: file.keywords, commands, agents };
        config.warn_on_collisions();
        config
    }

    /// Look up a command by canonical name, first declaration wins.
    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// Look up an agent by name, first declaration wins.
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    /// Resolve a command against an agent: the definition is returned only
    /// when it is universal or the agent is on its allow-list. `None` is a
    /// routing outcome ("not available for this agent"), not an error.
    pub fn command_for_agent(&self, name: &str, agent: Option<&str>) -> Option<&CommandSpec> {
        self.command(name).filter(|command| command.allows(agent))
    }

    /// Duplicate canonical names and aliases are permitted; first match
    /// wins by declaration order. Make the shadowing visible at load time.
    fn warn_on_collisions(&self) {
        for (index, command) in self.commands.iter().enumerate() {
            let earlier = &self.commands[..index];
            if earlier.iter().any(|other| other.name == command.name) {
                warn!(command = %command.name, "duplicate command name; first declaration wins");
            }
            for alias in &command.aliases {
                if earlier.iter().any(|other| other.matches_word(alias)) {
                    warn!(
                        command = %command.name,
                        alias = %alias,
                        "alias shadowed by an earlier command; first declaration wins"
                    );
                }
            }
        }

        for (index, agent) in self.agents.iter().enumerate() {
            if self.agents[..index].iter().any(|other| other.name == agent.name) {
                warn!(agent = %agent.name, "duplicate agent name; first declaration wins");
            }
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(stripped),
        None => path.to_path_buf(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RoutingFile {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default, rename = "command")]
    commands: Vec<CommandSpec>,
    #[serde(default, rename = "agent")]
    agents: Vec<AgentFileSpec>,
}

#[derive(Debug, Deserialize)]
struct AgentFileSpec {
    name: String,
    path: PathBuf,
    #[serde(default)]
    voice: Option<String>,
}
