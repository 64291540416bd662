pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "parlance",
    about = "Parlance operator CLI",
    long_about = "Inspect and exercise the voice gateway offline: readiness checks, \
                  effective config, dry-run routing, and session state.",
    after_help = "Examples:\n  parlance doctor --json\n  parlance route \"diet agent log two eggs\"\n  parlance session --clear-last-command"
)]
pub struct Cli {
    /// Path to parlance.toml (defaults to the usual lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config and check external binaries and files are reachable")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the effective configuration with secrets redacted")]
    Config,
    #[command(about = "Dry-run the keyword router against a line of text")]
    Route {
        #[arg(help = "Transcribed text to route, quoted")]
        text: String,
        #[arg(long, help = "Scan window size in words")]
        window: Option<usize>,
    },
    #[command(about = "Show the persisted session record")]
    Session {
        #[arg(long, help = "Drop the stored last-command snapshot")]
        clear_last_command: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(cli.config, json),
        Command::Config => commands::config::run(cli.config),
        Command::Route { text, window } => commands::route::run(cli.config, &text, window),
        Command::Session { clear_last_command } => {
            commands::session::run(cli.config, clear_last_command)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
