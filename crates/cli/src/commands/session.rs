use std::path::PathBuf;

use parlance_core::config::AppConfig;
use parlance_core::session::{FileSessionStore, SessionStore};

use super::{load_options, CommandResult};

pub fn run(config_path: Option<PathBuf>, clear_last_command: bool) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(format!("config error: {error}")),
    };

    let store = FileSessionStore::new(&config.paths.session_file);

    if clear_last_command {
        if let Err(error) = store.clear_last_command() {
            return CommandResult::failure(format!("could not clear last command: {error}"));
        }
    }

    match serde_json::to_string_pretty(&store.record()) {
        Ok(output) => CommandResult::success(output),
        Err(error) => CommandResult::failure(format!("serialization error: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::run;

    fn config_fixture(dir: &TempDir) -> std::path::PathBuf {
        let session_path = dir.path().join(".agent-session.json");
        let config_path = dir.path().join("parlance.toml");
        fs::write(
            &config_path,
            format!("[paths]\nsession_file = \"{}\"\n", session_path.display()),
        )
        .expect("config fixture");
        config_path
    }

    #[test]
    fn shows_the_empty_record_when_nothing_is_stored() {
        let dir = TempDir::new().expect("tempdir");
        let result = run(Some(config_fixture(&dir)), false);
        assert_eq!(result.exit_code, 0);

        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("output should be json");
        assert_eq!(parsed["current_agent"], serde_json::Value::Null);
    }

    #[test]
    fn clear_flag_drops_the_last_command() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = config_fixture(&dir);
        fs::write(
            dir.path().join(".agent-session.json"),
            r#"{"current_agent":"diet","last_command":{"agent":"diet","command":"log","message":"two eggs","agent_path":"/tmp/diet"}}"#,
        )
        .expect("session fixture");

        let result = run(Some(config_path), true);
        assert_eq!(result.exit_code, 0);

        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("output should be json");
        assert_eq!(parsed["current_agent"], "diet");
        assert!(parsed.get("last_command").is_none() || parsed["last_command"].is_null());
    }
}
