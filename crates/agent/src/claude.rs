use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parlance_core::config::ClaudeConfig;

use crate::conversation::{ConversationLedger, Usage};

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("could not spawn `{binary}`: {source}")]
    Spawn { binary: String, source: std::io::Error },
    #[error("claude exited with failure: {0}")]
    Failed(String),
    #[error("claude timed out after {0:?}")]
    Timeout(Duration),
    #[error("claude i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete reply parsed out of a stream-json transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub thinking: String,
    pub conversation_id: Option<String>,
    pub usage: Usage,
}

/// Incremental events surfaced while a reply is being produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Thinking(String),
    Text(String),
    Done { conversation_id: String },
    Error(String),
}

/// Driver for the `claude` CLI in print mode. Each call is one subprocess;
/// continuity comes from `--resume` with the ledger's daily conversation
/// ID, not from a long-lived process.
#[derive(Clone, Debug)]
pub struct ClaudeCli {
    binary: String,
    ask_timeout: Duration,
    command_timeout: Duration,
    voice_mode_file: Option<PathBuf>,
}

impl ClaudeCli {
    pub fn new(config: &ClaudeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            ask_timeout: Duration::from_secs(config.ask_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            voice_mode_file: None,
        }
    }

    /// Constraints prepended to every conversational call via
    /// `--append-system-prompt` (spoken-answer style, brevity, etc).
    pub fn with_voice_mode_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.voice_mode_file = Some(path.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn voice_mode_prompt(&self) -> Option<String> {
        let path = self.voice_mode_file.as_ref()?;
        fs::read_to_string(path).ok().filter(|prompt| !prompt.trim().is_empty())
    }

    fn conversation_args(&self, cwd: &Path, resume: Option<&str>) -> Vec<String> {
        let mut args =
            vec!["-p".into(), "--output-format".into(), "stream-json".into(), "--verbose".into()];

        if let Some(prompt) = self.voice_mode_prompt() {
            args.push("--append-system-prompt".into());
            args.push(prompt);
        }

        let context_dir = cwd.join("context");
        if context_dir.exists() {
            args.push("--add-dir".into());
            args.push(context_dir.to_string_lossy().into_owned());
        }

        if let Some(conversation_id) = resume {
            args.push("--resume".into());
            args.push(conversation_id.into());
        }

        args
    }

    async fn run_once(
        &self,
        args: &[String],
        stdin_text: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<std::process::Output, ClaudeError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClaudeError::Spawn { binary: self.binary.clone(), source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_text.as_bytes()).await?;
            // Dropping stdin sends EOF; claude will not answer without it.
        }

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(ClaudeError::Timeout(timeout)),
        }
    }

    /// Ask for one reply, resuming today's conversation when possible.
    /// A failed resume (stale conversation ID) is retried once fresh.
    pub async fn ask(
        &self,
        prompt: &str,
        cwd: &Path,
        ledger: &ConversationLedger,
    ) -> Result<Reply, ClaudeError> {
        let resume = ledger.todays_conversation_id();
        let args = self.conversation_args(cwd, resume.as_deref());

        let mut output = self.run_once(&args, prompt, cwd, self.ask_timeout).await?;

        if !output.status.success() && resume.is_some() {
            warn!("resume failed, retrying with a fresh conversation");
            ledger.clear();
            let fresh_args = self.conversation_args(cwd, None);
            output = self.run_once(&fresh_args, prompt, cwd, self.ask_timeout).await?;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail =
                if stderr.trim().is_empty() { "unknown error" } else { stderr.trim() };
            return Err(ClaudeError::Failed(detail.to_string()));
        }

        let reply = parse_transcript(&String::from_utf8_lossy(&output.stdout));
        if let Some(conversation_id) = &reply.conversation_id {
            ledger.save(conversation_id, reply.usage.clone());
        }

        Ok(reply)
    }

    /// Same invocation as [`ask`], but events are delivered as stdout
    /// lines arrive. The child is killed if the timeout elapses.
    ///
    /// [`ask`]: ClaudeCli::ask
    pub fn stream(
        &self,
        prompt: String,
        cwd: PathBuf,
        ledger: ConversationLedger,
    ) -> mpsc::Receiver<StreamEvent> {
        let (sender, receiver) = mpsc::channel(32);
        let cli = self.clone();

        tokio::spawn(async move {
            if let Err(err) = cli.drive_stream(&prompt, &cwd, &ledger, &sender).await {
                let _ = sender.send(StreamEvent::Error(err.to_string())).await;
            }
        });

        receiver
    }

    async fn drive_stream(
        &self,
        prompt: &str,
        cwd: &Path,
        ledger: &ConversationLedger,
        sender: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), ClaudeError> {
        let resume = ledger.todays_conversation_id();
        let args = self.conversation_args(cwd, resume.as_deref());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClaudeError::Spawn { binary: self.binary.clone(), source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
        }

        let stdout = child.stdout.take().expect("stdout was requested as piped");
        let mut lines = BufReader::new(stdout).lines();

        let mut conversation_id = resume.unwrap_or_default();
        let mut usage = Usage::default();

        let drained = tokio::time::timeout(self.ask_timeout, async {
            while let Some(line) = lines.next_line().await? {
                let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                    continue;
                };

                if let Some(session_id) = value.get("session_id").and_then(|id| id.as_str()) {
                    conversation_id = session_id.to_string();
                }

                match value.get("type").and_then(|kind| kind.as_str()) {
                    Some("assistant") => {
                        for block in assistant_blocks(&value) {
                            match block {
                                ContentBlock::Thinking(thinking) => {
                                    let _ = sender.send(StreamEvent::Thinking(thinking)).await;
                                }
                                ContentBlock::Text(text) => {
                                    let _ = sender.send(StreamEvent::Text(text)).await;
                                }
                            }
                        }
                    }
                    Some("result") => {
                        if let Some(raw) = value.get("usage") {
                            usage = serde_json::from_value(raw.clone()).unwrap_or_default();
                        }
                    }
                    _ => {}
                }
            }
            Ok::<(), std::io::Error>(())
        })
        .await;

        match drained {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(ClaudeError::Timeout(self.ask_timeout));
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ClaudeError::Failed(format!("exit status {status}")));
        }

        if !conversation_id.is_empty() {
            ledger.save(&conversation_id, usage);
        }
        let _ = sender.send(StreamEvent::Done { conversation_id }).await;
        debug!("claude stream complete");
        Ok(())
    }

    /// Run a prompt-backed voice command: the command's instructions ride
    /// in as an appended system prompt and the user's message on stdin,
    /// inside the agent's directory. Success is the exit status; these
    /// commands answer with a chime, not text.
    pub async fn execute_command(
        &self,
        command_prompt: &str,
        message: &str,
        agent_path: &Path,
    ) -> bool {
        let args = vec![
            "-p".to_string(),
            "--append-system-prompt".to_string(),
            command_prompt.to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];

        match self.run_once(&args, message, agent_path, self.command_timeout).await {
            Ok(output) if output.status.success() => {
                info!("command subprocess completed");
                true
            }
            Ok(output) => {
                warn!(stderr = %String::from_utf8_lossy(&output.stderr), "command subprocess failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "command subprocess did not run");
                false
            }
        }
    }
}

enum ContentBlock {
    Thinking(String),
    Text(String),
}

fn assistant_blocks(value: &serde_json::Value) -> Vec<ContentBlock> {
    let Some(content) = value.pointer("/message/content").and_then(|c| c.as_array()) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for block in content {
        match block.get("type").and_then(|kind| kind.as_str()) {
            Some("thinking") => {
                if let Some(thinking) = block.get("thinking").and_then(|t| t.as_str()) {
                    let thinking = thinking.trim();
                    if !thinking.is_empty() {
                        blocks.push(ContentBlock::Thinking(thinking.to_string()));
                    }
                }
            }
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    let text = text.trim();
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text(text.to_string()));
                    }
                }
            }
            _ => {}
        }
    }
    blocks
}

/// Parse a complete stream-json transcript: one JSON object per line, the
/// final `result` line carrying the reply text and usage, assistant lines
/// carrying thinking/text blocks. Unparseable lines are skipped.
pub fn parse_transcript(output: &str) -> Reply {
    let mut reply = Reply::default();
    let mut thinking_parts: Vec<String> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };

        if let Some(session_id) = value.get("session_id").and_then(|id| id.as_str()) {
            reply.conversation_id = Some(session_id.to_string());
        }

        match value.get("type").and_then(|kind| kind.as_str()) {
            Some("result") => {
                if let Some(text) = value.get("result").and_then(|r| r.as_str()) {
                    if !text.trim().is_empty() {
                        reply.text = text.trim().to_string();
                    }
                }
                if let Some(raw) = value.get("usage") {
                    reply.usage = serde_json::from_value(raw.clone()).unwrap_or_default();
                }
            }
            Some("assistant") => {
                for block in assistant_blocks(&value) {
                    match block {
                        ContentBlock::Thinking(thinking) => thinking_parts.push(thinking),
                        ContentBlock::Text(text) => {
                            if reply.text.is_empty() {
                                reply.text = text;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if reply.text.is_empty() {
        // Nothing structured came back; salvage a bounded raw prefix.
        reply.text = output.trim().chars().take(500).collect();
    }

    reply.thinking = thinking_parts.join("\n\n");
    reply
}
