use std::path::PathBuf;

use rota_core::{ClientId, WatchMode};

use crate::cli::ConfigCommands;
use crate::commands::common::print_json;
use crate::error::CliError;
use crate::settings::{load_settings, resolve_config_path, CliConfig, Overrides};

pub fn run_config(command: ConfigCommands, overrides: Overrides) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            keep_client_id,
            polling,
        } => {
            let path = resolve_config_path(overrides.config.clone())?;
            let existing = CliConfig::load_from_path(&path).map_err(CliError::Config)?;
            let config = init_config(
                existing,
                overrides.shared_dir,
                keep_client_id,
                polling,
            );
            config.save_to_path(&path).map_err(CliError::Config)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => print_json(&load_settings(overrides)?),
    }
}

/// Build the config written by `rota config init` on top of any existing one.
pub fn init_config(
    mut config: CliConfig,
    shared_dir: Option<PathBuf>,
    keep_client_id: bool,
    polling: bool,
) -> CliConfig {
    if !keep_client_id || config.client_id.is_none() {
        config.client_id = Some(ClientId::generate().to_string());
    }
    if let Some(shared_dir) = shared_dir {
        config.sync.shared_dir = shared_dir;
    }
    if polling {
        config.sync.watch_mode = WatchMode::Polling;
    }
    config
}
