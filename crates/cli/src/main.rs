use std::process::ExitCode;

fn main() -> ExitCode {
    parlance_cli::run()
}
