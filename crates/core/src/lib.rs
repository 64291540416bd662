pub mod config;
pub mod extract;
pub mod routing;
pub mod session;
pub mod undo;

pub use config::{
    AppConfig, AudioFormat, ClaudeConfig, ConfigError, LoadOptions, LogFormat, LoggingConfig,
    PathsConfig, ServerConfig, SoundsConfig, TranscribeConfig, TtsConfig,
};
pub use extract::{extract, Extraction, DEFAULT_SCAN_WINDOW};
pub use routing::{builtin, AgentSpec, CommandSpec, RoutingConfig, RoutingConfigError};
pub use session::{
    FileSessionStore, InMemorySessionStore, LastCommand, SessionReadError, SessionRecord,
    SessionStore,
};
pub use undo::undo_last;
