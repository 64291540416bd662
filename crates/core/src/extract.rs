use serde::Serialize;

use crate::routing::RoutingConfig;

/// Number of leading words inspected for routing keywords. Words past the
/// window can only ever appear in the residual message.
pub const DEFAULT_SCAN_WINDOW: usize = 5;

/// Outcome of scanning one utterance. `agent: None` with
/// `has_agent_keyword: true` means "the default agent was addressed",
/// which is a different state from the trigger word being absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub has_agent_keyword: bool,
    pub agent: Option<String>,
    pub command: Option<String>,
    pub message: String,
}

/// Scan the first `window_size` words of `text` for an agent switch and a
/// command, and strip recognized keywords out of the forwarded message.
///
/// Agent matching is substring-based on the joined window so word order
/// does not matter ("diet agent" == "agent diet"); command matching is
/// word-exact so a command name embedded in a longer word does not fire.
/// All ties resolve to declaration order in the routing config.
pub fn extract(text: &str, config: &RoutingConfig, window_size: usize) -> Extraction {
    let lowered = text.to_lowercase();
    let words = lowered.split_whitespace().collect::<Vec<_>>();
    let window = &words[..words.len().min(window_size)];
    let window_text = window.join(" ");

    if !window.iter().any(|word| *word == "agent") {
        return Extraction {
            has_agent_keyword: false,
            agent: None,
            command: None,
            message: text.to_string(),
        };
    }

    let mut extraction = Extraction { has_agent_keyword: true, ..Extraction::default() };

    'agents: for agent in &config.agents {
        for variant in agent.name_variants() {
            if window_text.contains(&variant) {
                extraction.agent = Some(agent.name.clone());
                break 'agents;
            }
        }
    }

    // A command only counts as a candidate when the resolved agent may run
    // it; an allow-listed command never matches for the wrong agent.
    'commands: for command in &config.commands {
        if !command.allows(extraction.agent.as_deref()) {
            continue;
        }
        for word in window {
            if command.matches_word(word) {
                extraction.command = Some(command.name.clone());
                break 'commands;
            }
        }
    }

    // The message is everything after the last keyword in the window:
    // the trigger word itself, any command name or alias, or any fragment
    // of an agent name.
    let last_keyword = window
        .iter()
        .enumerate()
        .filter(|(_, word)| {
            **word == "agent"
                || config.commands.iter().any(|command| command.matches_word(word))
                || config.agents.iter().any(|agent| agent.matches_word(word))
        })
        .map(|(index, _)| index)
        .last();

    extraction.message = match last_keyword {
        Some(index) => words[index + 1..].join(" "),
        // "agent" was in the window but nothing registered as a keyword;
        // forward the whole utterance untouched.
        None => text.to_string(),
    };

    extraction
}

#[cfg(test)]
mod tests {
    use super::{extract, Extraction, DEFAULT_SCAN_WINDOW};
    use crate::routing::{trigger_phrases, AgentSpec, CommandSpec, RoutingConfig};

    fn agent(name: &str, voice: Option<&str>) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            path: format!("/tmp/agents/{name}").into(),
            voice: voice.map(str::to_string),
            triggers: trigger_phrases(name),
        }
    }

    fn fixture() -> RoutingConfig {
        RoutingConfig {
            keywords: vec!["agent".to_string(), "diet".to_string()],
            commands: vec![
                CommandSpec {
                    name: "log".to_string(),
                    agents: vec!["diet".to_string()],
                    silent: true,
                    aliases: vec!["add".to_string(), "record".to_string()],
                },
                CommandSpec {
                    name: "listen".to_string(),
                    agents: Vec::new(),
                    silent: true,
                    aliases: vec!["note".to_string()],
                },
                CommandSpec {
                    name: "research".to_string(),
                    agents: Vec::new(),
                    silent: false,
                    aliases: Vec::new(),
                },
            ],
            agents: vec![agent("diet", Some("af_heart")), agent("video-games", None)],
        }
    }

    fn run(text: &str) -> Extraction {
        extract(text, &fixture(), DEFAULT_SCAN_WINDOW)
    }

    #[test]
    fn basic_extraction() {
        let result = run("diet agent log two eggs");
        assert!(result.has_agent_keyword);
        assert_eq!(result.agent.as_deref(), Some("diet"));
        assert_eq!(result.command.as_deref(), Some("log"));
        assert_eq!(result.message, "two eggs");
    }

    #[test]
    fn text_without_trigger_word_passes_through_verbatim() {
        let result = run("What did I Eat  today?");
        assert!(!result.has_agent_keyword);
        assert_eq!(result.agent, None);
        assert_eq!(result.command, None);
        // Original text, not lowercased, not re-joined.
        assert_eq!(result.message, "What did I Eat  today?");
    }

    #[test]
    fn agent_order_in_window_does_not_matter() {
        let forward = run("diet agent log pizza");
        let reversed = run("agent diet log pizza");
        assert_eq!(forward.agent, reversed.agent);
        assert_eq!(forward.command, reversed.command);
        assert_eq!(forward.message, reversed.message);
        assert_eq!(forward.message, "pizza");
    }

    #[test]
    fn alias_resolves_to_canonical_name() {
        let result = run("diet agent add pizza");
        assert_eq!(result.command.as_deref(), Some("log"));
        assert_eq!(result.message, "pizza");
    }

    #[test]
    fn universal_command_without_agent_targets_default() {
        let result = run("agent listen remember the milk");
        assert!(result.has_agent_keyword);
        assert_eq!(result.agent, None, "no agent name means default agent");
        assert_eq!(result.command.as_deref(), Some("listen"));
        assert_eq!(result.message, "remember the milk");
    }

    #[test]
    fn allow_listed_command_is_skipped_for_wrong_agent() {
        // "log" only allows diet; with no agent resolved it cannot match,
        // so the word stays in the message.
        let result = run("agent log something");
        assert_eq!(result.command, None);
        assert_eq!(result.message, "something");
    }

    #[test]
    fn hyphenated_agent_matches_spoken_form() {
        let spoken = run("video games agent listen new idea");
        assert_eq!(spoken.agent.as_deref(), Some("video-games"));
        assert_eq!(spoken.command.as_deref(), Some("listen"));
        assert_eq!(spoken.message, "new idea");

        let hyphenated = run("video-games agent listen new idea");
        assert_eq!(hyphenated.agent.as_deref(), Some("video-games"));
    }

    #[test]
    fn words_past_the_window_are_never_keywords() {
        // "log" is the sixth word: outside the five-word window, so it is
        // message payload, not a command.
        let result = run("diet agent please would you log pizza");
        assert_eq!(result.agent.as_deref(), Some("diet"));
        assert_eq!(result.command, None);
        assert_eq!(result.message, "please would you log pizza");
    }

    #[test]
    fn message_strips_through_the_last_keyword() {
        // Keywords at positions 0, 1, 2; message starts after the last.
        let result = run("agent diet log two eggs and toast");
        assert_eq!(result.message, "two eggs and toast");
    }

    #[test]
    fn trigger_word_alone_leaves_empty_message() {
        let result = run("agent");
        assert!(result.has_agent_keyword);
        assert_eq!(result.agent, None);
        assert_eq!(result.command, None);
        assert_eq!(result.message, "");
    }

    #[test]
    fn declaration_order_breaks_command_ties() {
        let mut config = fixture();
        // A later command sharing log's alias never wins.
        config.commands.push(CommandSpec {
            name: "shadow".to_string(),
            agents: Vec::new(),
            silent: false,
            aliases: vec!["note".to_string()],
        });
        let result = extract("agent note call the dentist", &config, DEFAULT_SCAN_WINDOW);
        assert_eq!(result.command.as_deref(), Some("listen"));
    }

    #[test]
    fn empty_config_still_routes_the_trigger_word() {
        let config = RoutingConfig::default();
        let result = extract("agent hello there", &config, DEFAULT_SCAN_WINDOW);
        assert!(result.has_agent_keyword);
        assert_eq!(result.agent, None);
        assert_eq!(result.command, None);
        assert_eq!(result.message, "hello there");
    }

    #[test]
    fn empty_input_is_well_formed() {
        let result = run("");
        assert!(!result.has_agent_keyword);
        assert_eq!(result.message, "");
    }

    #[test]
    fn smaller_window_narrows_the_scan() {
        let result = extract("one two agent log pizza", &fixture(), 2);
        assert!(!result.has_agent_keyword, "trigger word outside a 2-word window");
        assert_eq!(result.message, "one two agent log pizza");
    }
}
