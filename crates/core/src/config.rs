use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub claude: ClaudeConfig,
    pub transcribe: TranscribeConfig,
    pub tts: TtsConfig,
    pub sounds: SoundsConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ClaudeConfig {
    pub binary: String,
    pub ask_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TranscribeConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct TtsConfig {
    pub base_url: String,
    pub fallback_base_url: Option<String>,
    pub model: String,
    pub voice: String,
    pub api_key: Option<SecretString>,
    pub output_format: AudioFormat,
}

#[derive(Clone, Debug)]
pub struct SoundsConfig {
    pub dir: PathBuf,
    pub notification: String,
    pub volume: f32,
    pub silence_secs: f32,
}

#[derive(Clone, Debug)]
pub struct PathsConfig {
    pub conversations_root: PathBuf,
    pub voice_commands_dir: PathBuf,
    pub session_file: PathBuf,
    pub routing_config: PathBuf,
    pub chat_ui_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Audio container the gateway hands back to callers. The synthesis
/// provider may produce something else; conversion happens at the edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Ogg,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8787,
                graceful_shutdown_secs: 15,
            },
            claude: ClaudeConfig {
                binary: "claude".to_string(),
                ask_timeout_secs: 90,
                command_timeout_secs: 60,
            },
            transcribe: TranscribeConfig {
                base_url: "http://127.0.0.1:8001".to_string(),
                model: "whisper-1".to_string(),
                api_key: None,
            },
            tts: TtsConfig {
                base_url: "http://127.0.0.1:8002".to_string(),
                fallback_base_url: None,
                model: "kokoro".to_string(),
                voice: "af_heart".to_string(),
                api_key: None,
                output_format: AudioFormat::Ogg,
            },
            sounds: SoundsConfig {
                dir: PathBuf::from("sound-effects"),
                notification: "coin".to_string(),
                volume: 0.5,
                silence_secs: 0.5,
            },
            paths: PathsConfig {
                conversations_root: PathBuf::from("conversations"),
                voice_commands_dir: PathBuf::from("voice-commands"),
                session_file: PathBuf::from(".agent-session.json"),
                routing_config: PathBuf::from("agents.toml"),
                chat_ui_dir: PathBuf::from("chat-ui/dist"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ogg" => Ok(Self::Ogg),
            "mp3" => Ok(Self::Mp3),
            other => Err(ConfigError::Validation(format!(
                "unsupported audio format `{other}` (expected ogg|mp3)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parlance.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(claude) = patch.claude {
            if let Some(binary) = claude.binary {
                self.claude.binary = binary;
            }
            if let Some(ask_timeout_secs) = claude.ask_timeout_secs {
                self.claude.ask_timeout_secs = ask_timeout_secs;
            }
            if let Some(command_timeout_secs) = claude.command_timeout_secs {
                self.claude.command_timeout_secs = command_timeout_secs;
            }
        }

        if let Some(transcribe) = patch.transcribe {
            if let Some(base_url) = transcribe.base_url {
                self.transcribe.base_url = base_url;
            }
            if let Some(model) = transcribe.model {
                self.transcribe.model = model;
            }
            if let Some(api_key_value) = transcribe.api_key {
                self.transcribe.api_key = Some(secret_value(api_key_value));
            }
        }

        if let Some(tts) = patch.tts {
            if let Some(base_url) = tts.base_url {
                self.tts.base_url = base_url;
            }
            if let Some(fallback_base_url) = tts.fallback_base_url {
                self.tts.fallback_base_url = Some(fallback_base_url);
            }
            if let Some(model) = tts.model {
                self.tts.model = model;
            }
            if let Some(voice) = tts.voice {
                self.tts.voice = voice;
            }
            if let Some(api_key_value) = tts.api_key {
                self.tts.api_key = Some(secret_value(api_key_value));
            }
            if let Some(output_format) = tts.output_format {
                self.tts.output_format = output_format;
            }
        }

        if let Some(sounds) = patch.sounds {
            if let Some(dir) = sounds.dir {
                self.sounds.dir = dir;
            }
            if let Some(notification) = sounds.notification {
                self.sounds.notification = notification;
            }
            if let Some(volume) = sounds.volume {
                self.sounds.volume = volume;
            }
            if let Some(silence_secs) = sounds.silence_secs {
                self.sounds.silence_secs = silence_secs;
            }
        }

        if let Some(paths) = patch.paths {
            if let Some(conversations_root) = paths.conversations_root {
                self.paths.conversations_root = conversations_root;
            }
            if let Some(voice_commands_dir) = paths.voice_commands_dir {
                self.paths.voice_commands_dir = voice_commands_dir;
            }
            if let Some(session_file) = paths.session_file {
                self.paths.session_file = session_file;
            }
            if let Some(routing_config) = paths.routing_config {
                self.paths.routing_config = routing_config;
            }
            if let Some(chat_ui_dir) = paths.chat_ui_dir {
                self.paths.chat_ui_dir = chat_ui_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLANCE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLANCE_SERVER_PORT") {
            self.server.port = parse_u16("PARLANCE_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("PARLANCE_CLAUDE_BINARY") {
            self.claude.binary = value;
        }
        if let Some(value) = read_env("PARLANCE_CLAUDE_ASK_TIMEOUT_SECS") {
            self.claude.ask_timeout_secs = parse_u64("PARLANCE_CLAUDE_ASK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLANCE_TRANSCRIBE_BASE_URL") {
            self.transcribe.base_url = value;
        }
        if let Some(value) = read_env("PARLANCE_TRANSCRIBE_API_KEY") {
            self.transcribe.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("PARLANCE_TTS_BASE_URL") {
            self.tts.base_url = value;
        }
        if let Some(value) = read_env("PARLANCE_TTS_VOICE") {
            self.tts.voice = value;
        }
        if let Some(value) = read_env("PARLANCE_TTS_API_KEY") {
            self.tts.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLANCE_TTS_OUTPUT_FORMAT") {
            self.tts.output_format = value.parse()?;
        }

        if let Some(value) = read_env("PARLANCE_SOUNDS_NOTIFICATION") {
            self.sounds.notification = value;
        }
        if let Some(value) = read_env("PARLANCE_SOUNDS_VOLUME") {
            self.sounds.volume = parse_f32("PARLANCE_SOUNDS_VOLUME", &value)?;
        }

        let log_level =
            read_env("PARLANCE_LOGGING_LEVEL").or_else(|| read_env("PARLANCE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLANCE_LOGGING_FORMAT").or_else(|| read_env("PARLANCE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_claude(&self.claude)?;
        validate_provider_url("transcribe.base_url", &self.transcribe.base_url)?;
        validate_provider_url("tts.base_url", &self.tts.base_url)?;
        if let Some(fallback) = &self.tts.fallback_base_url {
            validate_provider_url("tts.fallback_base_url", fallback)?;
        }
        validate_sounds(&self.sounds)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parlance.toml"), PathBuf::from("config/parlance.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_claude(claude: &ClaudeConfig) -> Result<(), ConfigError> {
    if claude.binary.trim().is_empty() {
        return Err(ConfigError::Validation("claude.binary must not be empty".to_string()));
    }

    if claude.ask_timeout_secs == 0 || claude.ask_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "claude.ask_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if claude.command_timeout_secs == 0 || claude.command_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "claude.command_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_provider_url(key: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_sounds(sounds: &SoundsConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&sounds.volume) {
        return Err(ConfigError::Validation(
            "sounds.volume must be in range 0.0..=1.0".to_string(),
        ));
    }

    if !(0.0..=5.0).contains(&sounds.silence_secs) {
        return Err(ConfigError::Validation(
            "sounds.silence_secs must be in range 0.0..=5.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    claude: Option<ClaudePatch>,
    transcribe: Option<TranscribePatch>,
    tts: Option<TtsPatch>,
    sounds: Option<SoundsPatch>,
    paths: Option<PathsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudePatch {
    binary: Option<String>,
    ask_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TranscribePatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TtsPatch {
    base_url: Option<String>,
    fallback_base_url: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    api_key: Option<String>,
    output_format: Option<AudioFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct SoundsPatch {
    dir: Option<PathBuf>,
    notification: Option<String>,
    volume: Option<f32>,
    silence_secs: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsPatch {
    conversations_root: Option<PathBuf>,
    voice_commands_dir: Option<PathBuf>,
    session_file: Option<PathBuf>,
    routing_config: Option<PathBuf>,
    chat_ui_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, AudioFormat, ConfigError, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tts.output_format, AudioFormat::Ogg);
        assert_eq!(config.tts.output_format.media_type(), "audio/ogg");
    }

    #[test]
    fn file_patch_overrides_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("parlance.toml");
        fs::write(
            &path,
            r#"
[server]
port = 9000

[tts]
voice = "bf_emma"
output_format = "mp3"

[logging]
level = "debug"
format = "json"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        if config.server.port != 9000 {
            return Err("file port should win over default".to_string());
        }
        if config.tts.voice != "bf_emma" {
            return Err("file voice should win over default".to_string());
        }
        if config.tts.output_format != AudioFormat::Mp3 {
            return Err("file output format should win over default".to_string());
        }
        if !matches!(config.logging.format, LogFormat::Json) {
            return Err("file logging format should win over default".to_string());
        }
        Ok(())
    }

    #[test]
    fn env_overrides_win_over_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLANCE_TTS_VOICE", "am_adam");
        env::set_var("PARLANCE_TTS_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("parlance.toml");
            fs::write(&path, "[tts]\nvoice = \"bf_emma\"\n").map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            if config.tts.voice != "am_adam" {
                return Err("env voice should win over file".to_string());
            }
            let key = config.tts.api_key.as_ref().ok_or("api key should be set from env")?;
            if key.expose_secret() != "sk-from-env" {
                return Err("env api key should be loaded".to_string());
            }
            Ok(())
        })();

        clear_vars(&["PARLANCE_TTS_VOICE", "PARLANCE_TTS_API_KEY"]);
        result
    }

    #[test]
    fn missing_file_is_fine_unless_required() {
        let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let missing = std::path::PathBuf::from("/nonexistent/parlance.toml");
        let config = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            ..LoadOptions::default()
        });
        assert!(config.is_ok(), "absent config file should fall back to defaults");

        let required =
            AppConfig::load(LoadOptions { config_path: Some(missing), require_file: true });
        assert!(matches!(required, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn validation_rejects_out_of_range_volume() {
        let mut config = AppConfig::default();
        config.sounds.volume = 1.5;
        let err = config.validate().expect_err("volume above 1.0 should fail validation");
        assert!(
            matches!(err, ConfigError::Validation(message) if message.contains("sounds.volume"))
        );
    }

    #[test]
    fn secrets_are_not_leaked_by_debug() {
        let mut config = AppConfig::default();
        config.tts.api_key = Some("sk-secret-value".to_string().into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-value"), "debug output should not contain api key");
    }
}
