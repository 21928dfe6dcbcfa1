//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod check_config;
pub mod replay;
pub mod select;
pub mod wps_pin;

use std::path::PathBuf;

use wpas_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Select(args) => select::handle(&args, global),
        Command::Replay(args) => replay::handle(&args, global),
        Command::CheckConfig => check_config::handle(global),
        Command::WpsPin(args) => wps_pin::handle(&args, global),
        // Handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}

/// Path of the configuration file in effect.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(wpas_config::config_path)
}

/// Load configuration. An explicit `--config` must exist; the default
/// location may be absent.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    match &global.config {
        Some(path) if !path.exists() => Err(CliError::NotFound {
            resource: "config file".into(),
            identifier: path.display().to_string(),
        }),
        Some(path) => Ok(wpas_config::load_config_from(path)?),
        None => Ok(wpas_config::load_config()?),
    }
}
