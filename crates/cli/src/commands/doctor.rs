use std::path::PathBuf;

use serde::Serialize;

use parlance_core::config::{AppConfig, LoadOptions};
use parlance_core::routing::RoutingConfig;

use super::{load_options, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<PathBuf>, json_output: bool) -> CommandResult {
    let report = build_report(load_options(config_path));
    let failed = report.overall_status == CheckStatus::Fail;

    let output = if json_output {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("doctor serialization failed: {error}"))
    } else {
        render_human(&report)
    };

    if failed {
        CommandResult { exit_code: 1, output }
    } else {
        CommandResult::success(output)
    }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_binary("claude_binary", &config.claude.binary));
            checks.push(check_binary("ffmpeg_binary", "ffmpeg"));
            checks.push(check_routing(&config));
            checks.push(check_session_file(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("claude_binary"));
            checks.push(skipped("ffmpeg_binary"));
            checks.push(skipped("routing_config"));
            checks.push(skipped("session_store"));
        }
    }

    let failures = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    let overall_status = if failures == 0 { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if failures == 0 {
        "all checks passed".to_string()
    } else {
        format!("{failures} check(s) failed")
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration failed to load".to_string(),
    }
}

fn check_binary(name: &'static str, binary: &str) -> DoctorCheck {
    match which::which(binary) {
        Ok(path) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("found at {}", path.display()),
        },
        Err(_) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("`{binary}` not found on PATH"),
        },
    }
}

fn check_routing(config: &AppConfig) -> DoctorCheck {
    match RoutingConfig::load(&config.paths.routing_config) {
        Ok(routing) => DoctorCheck {
            name: "routing_config",
            status: CheckStatus::Pass,
            details: format!(
                "{} agent(s), {} command(s), {} keyword(s)",
                routing.agents.len(),
                routing.commands.len(),
                routing.keywords.len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "routing_config",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_session_file(config: &AppConfig) -> DoctorCheck {
    let path = &config.paths.session_file;
    if !path.exists() {
        return DoctorCheck {
            name: "session_store",
            status: CheckStatus::Pass,
            details: "no session file yet (fresh state)".to_string(),
        };
    }

    match std::fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).map_err(|err| err.to_string()))
    {
        Ok(_) => DoctorCheck {
            name: "session_store",
            status: CheckStatus::Pass,
            details: format!("readable at {}", path.display()),
        },
        Err(details) => DoctorCheck {
            // The gateway treats this as empty state, so it is worth a
            // warning-level failure here, not a crash.
            name: "session_store",
            status: CheckStatus::Fail,
            details: format!("unreadable ({details}); the gateway will treat it as empty"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.summary)];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker:>4}] {} - {}", check.name, check.details));
    }
    lines.join("\n")
}
