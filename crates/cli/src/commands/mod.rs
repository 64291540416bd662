pub mod config;
pub mod doctor;
pub mod route;
pub mod session;

use std::path::PathBuf;

use parlance_core::config::LoadOptions;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self { exit_code: 1, output: output.into() }
    }
}

pub(crate) fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    LoadOptions { config_path, ..LoadOptions::default() }
}
