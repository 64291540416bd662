use std::path::PathBuf;

use parlance_core::config::{AppConfig, TranscribeConfig, TtsConfig};

use super::{load_options, CommandResult};

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    match AppConfig::load(load_options(config_path)) {
        Ok(config) => CommandResult::success(render(&config)),
        Err(error) => CommandResult::failure(format!("config error: {error}")),
    }
}

fn redacted(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}

fn render(config: &AppConfig) -> String {
    let AppConfig { server, claude, transcribe, tts, sounds, paths, logging } = config;
    let TranscribeConfig { base_url: stt_url, model: stt_model, api_key: stt_key } = transcribe;
    let TtsConfig { base_url, fallback_base_url, model, voice, api_key, output_format } = tts;

    [
        format!("server.bind_address = {}", server.bind_address),
        format!("server.port = {}", server.port),
        format!("server.graceful_shutdown_secs = {}", server.graceful_shutdown_secs),
        format!("claude.binary = {}", claude.binary),
        format!("claude.ask_timeout_secs = {}", claude.ask_timeout_secs),
        format!("claude.command_timeout_secs = {}", claude.command_timeout_secs),
        format!("transcribe.base_url = {stt_url}"),
        format!("transcribe.model = {stt_model}"),
        format!("transcribe.api_key = {}", redacted(stt_key.is_some())),
        format!("tts.base_url = {base_url}"),
        format!(
            "tts.fallback_base_url = {}",
            fallback_base_url.as_deref().unwrap_or("<unset>")
        ),
        format!("tts.model = {model}"),
        format!("tts.voice = {voice}"),
        format!("tts.api_key = {}", redacted(api_key.is_some())),
        format!("tts.output_format = {}", output_format.extension()),
        format!("sounds.dir = {}", sounds.dir.display()),
        format!("sounds.notification = {}", sounds.notification),
        format!("sounds.volume = {}", sounds.volume),
        format!("sounds.silence_secs = {}", sounds.silence_secs),
        format!("paths.conversations_root = {}", paths.conversations_root.display()),
        format!("paths.voice_commands_dir = {}", paths.voice_commands_dir.display()),
        format!("paths.session_file = {}", paths.session_file.display()),
        format!("paths.routing_config = {}", paths.routing_config.display()),
        format!("paths.chat_ui_dir = {}", paths.chat_ui_dir.display()),
        format!("logging.level = {}", logging.level),
        format!("logging.format = {:?}", logging.format).to_lowercase(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use parlance_core::config::AppConfig;

    use super::render;

    #[test]
    fn secrets_never_appear_in_rendered_output() {
        let mut config = AppConfig::default();
        config.tts.api_key = Some("sk-super-secret".to_string().into());

        let rendered = render(&config);
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("tts.api_key = <redacted>"));
        assert!(rendered.contains("transcribe.api_key = <unset>"));
    }

    #[test]
    fn every_section_is_present() {
        let rendered = render(&AppConfig::default());
        for prefix in ["server.", "claude.", "transcribe.", "tts.", "sounds.", "paths.", "logging."]
        {
            assert!(rendered.contains(prefix), "missing section {prefix}");
        }
    }
}
