use std::path::PathBuf;

use parlance_core::config::AppConfig;
use parlance_core::extract::{extract, DEFAULT_SCAN_WINDOW};
use parlance_core::routing::RoutingConfig;

use super::{load_options, CommandResult};

/// Run the extraction engine against a line of text exactly as the voice
/// endpoint would, and print the result. Useful for tuning agents.toml
/// without speaking into a microphone.
pub fn run(config_path: Option<PathBuf>, text: &str, window: Option<usize>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(format!("config error: {error}")),
    };

    let routing = match RoutingConfig::load(&config.paths.routing_config) {
        Ok(routing) => routing,
        Err(error) => return CommandResult::failure(format!("routing config error: {error}")),
    };

    let extraction = extract(text, &routing, window.unwrap_or(DEFAULT_SCAN_WINDOW));
    match serde_json::to_string_pretty(&extraction) {
        Ok(output) => CommandResult::success(output),
        Err(error) => CommandResult::failure(format!("serialization error: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::run;

    #[test]
    fn routes_against_a_config_file() {
        let dir = TempDir::new().expect("tempdir");
        let routing_path = dir.path().join("agents.toml");
        fs::write(
            &routing_path,
            "[[command]]\nname = \"log\"\naliases = [\"add\"]\n\n\
             [[agent]]\nname = \"diet\"\npath = \"/tmp/diet\"\n",
        )
        .expect("routing fixture");

        let config_path = dir.path().join("parlance.toml");
        fs::write(
            &config_path,
            format!("[paths]\nrouting_config = \"{}\"\n", routing_path.display()),
        )
        .expect("config fixture");

        let result = run(Some(config_path), "diet agent add pizza", None);
        assert_eq!(result.exit_code, 0);

        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("output should be json");
        assert_eq!(parsed["has_agent_keyword"], true);
        assert_eq!(parsed["agent"], "diet");
        assert_eq!(parsed["command"], "log");
        assert_eq!(parsed["message"], "pizza");
    }

    #[test]
    fn plain_text_routes_to_passthrough() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("parlance.toml");
        fs::write(
            &config_path,
            format!(
                "[paths]\nrouting_config = \"{}\"\n",
                dir.path().join("absent.toml").display()
            ),
        )
        .expect("config fixture");

        let result = run(Some(config_path), "what did I eat", None);
        assert_eq!(result.exit_code, 0);
        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("output should be json");
        assert_eq!(parsed["has_agent_keyword"], false);
        assert_eq!(parsed["message"], "what did I eat");
    }
}
