use std::collections::BTreeSet;

use parlance_core::routing::RoutingConfig;

/// Flatten the routing vocabulary into a space-separated hotword string
/// for the recognizer: configured keywords, command names and aliases,
/// and the fragments of every agent name. Lowercased, deduplicated,
/// sorted so the string is stable across reloads.
pub fn build_hotwords(config: &RoutingConfig) -> String {
    let mut words = BTreeSet::new();

    for keyword in &config.keywords {
        for word in keyword.to_lowercase().split_whitespace() {
            words.insert(word.to_string());
        }
    }

    for command in &config.commands {
        words.insert(command.name.to_lowercase());
        for alias in &command.aliases {
            words.insert(alias.to_lowercase());
        }
    }

    for agent in &config.agents {
        for fragment in agent.name.replace('-', " ").split_whitespace() {
            words.insert(fragment.to_lowercase());
        }
    }

    words.into_iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use parlance_core::routing::{trigger_phrases, AgentSpec, CommandSpec, RoutingConfig};

    use super::build_hotwords;

    #[test]
    fn collects_keywords_commands_and_agent_fragments() {
        let config = RoutingConfig {
            keywords: vec!["agent".to_string(), "grocery list".to_string()],
            commands: vec![CommandSpec {
                name: "log".to_string(),
                agents: vec!["diet".to_string()],
                silent: true,
                aliases: vec!["add".to_string()],
            }],
            agents: vec![AgentSpec {
                name: "video-games".to_string(),
                path: "/tmp/agents/video-games".into(),
                voice: None,
                triggers: trigger_phrases("video-games"),
            }],
        };

        assert_eq!(build_hotwords(&config), "add agent games grocery list log video");
    }

    #[test]
    fn duplicates_collapse() {
        let config = RoutingConfig {
            keywords: vec!["Agent".to_string(), "agent".to_string()],
            commands: Vec::new(),
            agents: Vec::new(),
        };
        assert_eq!(build_hotwords(&config), "agent");
    }

    #[test]
    fn empty_config_builds_an_empty_string() {
        assert_eq!(build_hotwords(&RoutingConfig::default()), "");
    }
}
