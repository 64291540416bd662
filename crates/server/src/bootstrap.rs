use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::info;

use parlance_agent::{ClaudeCli, CommandPrompts};
use parlance_audio::{
    build_hotwords, FallbackSynthesizer, HttpSynthesizer, HttpTranscriber, SoundBank, Synthesizer,
    Transcriber,
};
use parlance_core::config::{AppConfig, ConfigError, LoadOptions};
use parlance_core::routing::{RoutingConfig, RoutingConfigError};
use parlance_core::session::{FileSessionStore, SessionStore};

/// Conversations for requests with no agent selected land here.
pub const DEFAULT_CONVERSATIONS_NAME: &str = "voice-agent";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Routing(#[from] RoutingConfigError),
    #[error("could not resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

/// Everything a request handler needs, shared behind one `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub session: Arc<dyn SessionStore>,
    pub claude: ClaudeCli,
    pub prompts: CommandPrompts,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub sounds: SoundBank,
    pub project_dir: PathBuf,
    routing: RwLock<Arc<RoutingConfig>>,
}

impl AppState {
    /// The current routing config. Grab once per request; another request
    /// may swap it mid-flight via reload.
    pub fn routing(&self) -> Arc<RoutingConfig> {
        self.routing.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Re-read the routing file, rebuild recognizer hotwords, and swap the
    /// shared config.
    pub fn reload_routing(&self) -> Result<Arc<RoutingConfig>, RoutingConfigError> {
        let reloaded =
            Arc::new(RoutingConfig::load(&self.absolute(&self.config.paths.routing_config))?);
        self.transcriber.set_hotwords(&build_hotwords(&reloaded));
        *self.routing.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = reloaded.clone();
        info!(
            agents = reloaded.agents.len(),
            commands = reloaded.commands.len(),
            "routing config reloaded"
        );
        Ok(reloaded)
    }

    /// Working directory and synthesis voice for the active agent;
    /// unknown or absent agents fall back to the project directory and
    /// the default voice.
    pub fn agent_context(
        &self,
        routing: &RoutingConfig,
        agent: Option<&str>,
    ) -> (PathBuf, Option<String>) {
        match agent.and_then(|name| routing.agent(name)) {
            Some(spec) => (spec.path.clone(), spec.voice.clone()),
            None => (self.project_dir.clone(), None),
        }
    }

    /// Per-agent conversations directory, created on first use.
    pub fn conversations_dir(&self, agent: Option<&str>) -> PathBuf {
        let name = agent.unwrap_or(DEFAULT_CONVERSATIONS_NAME);
        let dir = self.absolute(&self.config.paths.conversations_root).join(name);
        if let Err(err) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %err, "could not create conversations dir");
        }
        dir
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn chat_ui_dir(&self) -> PathBuf {
        self.absolute(&self.config.paths.chat_ui_dir)
    }
}

pub struct Application {
    pub state: Arc<AppState>,
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting gateway bootstrap");

    let project_dir = std::env::current_dir().map_err(BootstrapError::WorkingDir)?;
    let absolute = |path: &Path| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_dir.join(path)
        }
    };

    let routing = RoutingConfig::load(&absolute(&config.paths.routing_config))?;
    info!(
        event_name = "system.bootstrap.routing_loaded",
        agents = routing.agents.len(),
        commands = routing.commands.len(),
        keywords = routing.keywords.len(),
        "routing config loaded"
    );

    let transcriber = Arc::new(HttpTranscriber::new(&config.transcribe));
    transcriber.set_hotwords(&build_hotwords(&routing));

    let primary = Arc::new(HttpSynthesizer::primary(&config.tts));
    let fallback = HttpSynthesizer::fallback(&config.tts)
        .map(|synthesizer| Arc::new(synthesizer) as Arc<dyn Synthesizer>);
    let synthesizer = Arc::new(FallbackSynthesizer::new(primary, fallback));

    let sounds = SoundBank::new(
        &parlance_core::config::SoundsConfig {
            dir: absolute(&config.sounds.dir),
            ..config.sounds.clone()
        },
        config.tts.output_format,
    );

    let session = Arc::new(FileSessionStore::new(absolute(&config.paths.session_file)));

    let claude =
        ClaudeCli::new(&config.claude).with_voice_mode_file(project_dir.join("voice-mode.md"));
    let prompts = CommandPrompts::new(absolute(&config.paths.voice_commands_dir));

    let state = Arc::new(AppState {
        config,
        session,
        claude,
        prompts,
        transcriber: transcriber as Arc<dyn Transcriber>,
        synthesizer: synthesizer as Arc<dyn Synthesizer>,
        sounds,
        project_dir,
        routing: RwLock::new(Arc::new(routing)),
    });

    info!(event_name = "system.bootstrap.ready", "gateway bootstrap complete");
    Ok(Application { state })
}

#[cfg(test)]
mod tests {
    use parlance_core::config::{AppConfig, LoadOptions};
    use parlance_core::session::SessionStore;

    use crate::bootstrap::{bootstrap, bootstrap_with_config};

    #[tokio::test]
    async fn bootstrap_succeeds_with_defaults_and_no_files() {
        let app = bootstrap(LoadOptions::default())
            .await
            .expect("bootstrap should run with zero configuration");

        assert_eq!(app.state.session.current_agent(), None);
        assert_eq!(app.state.config.server.port, 8787);
    }

    #[tokio::test]
    async fn agent_context_falls_back_to_project_dir() {
        let app = bootstrap_with_config(AppConfig::default())
            .await
            .expect("bootstrap should succeed");
        let routing = app.state.routing();

        let (cwd, voice) = app.state.agent_context(&routing, Some("no-such-agent"));
        assert_eq!(cwd, app.state.project_dir);
        assert_eq!(voice, None);
    }
}
