//! Rota CLI - Command-line interface for shared-folder rota sync
//!
//! Inspect, save and follow the schedule document that every desk shares.

mod cli;
mod commands;
mod error;
mod last_seen;
mod settings;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::check::run_check;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::init::run_init;
use crate::commands::lock::run_lock;
use crate::commands::save::run_save;
use crate::commands::show::run_show;
use crate::commands::watch::run_watch;
use crate::error::CliError;
use crate::settings::{load_settings, Overrides};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "rota=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        config: cli.config,
        shared_dir: cli.shared_dir,
        client_id: cli.client_id,
    };

    match cli.command {
        Commands::Init => run_init(&load_settings(overrides)?).await?,
        Commands::Show { json, payload } => {
            run_show(&load_settings(overrides)?, json, payload).await?;
        }
        Commands::Save {
            input,
            base,
            prefer,
        } => {
            run_save(&load_settings(overrides)?, &input, base.as_deref(), prefer).await?;
        }
        Commands::Check { base, json } => {
            run_check(&load_settings(overrides)?, base.as_deref(), json).await?;
        }
        Commands::Watch { polling } => run_watch(&load_settings(overrides)?, polling).await?,
        Commands::Lock { command } => run_lock(&load_settings(overrides)?, command).await?,
        Commands::Config { command } => run_config(command, overrides)?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
