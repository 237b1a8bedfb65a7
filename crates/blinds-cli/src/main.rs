//! Command-line client for a fleet of BLE blinds controllers.

mod cli;
mod commands;
mod config;
mod fleet;
mod format;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_config, cmd_list, cmd_set, cmd_watch};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();

    let controller_config =
        || config.controller_config(cli.prefix.as_deref(), cli.interval_ms);

    match cli.command {
        Commands::List { wait, output } => {
            cmd_list(controller_config()?, &config, wait, output.resolved(), cli.quiet).await
        }
        Commands::Set {
            device,
            percent,
            timeout,
        } => cmd_set(controller_config()?, &config, &device, percent, timeout, cli.quiet).await,
        Commands::Watch { output } => {
            cmd_watch(controller_config()?, &config, output.resolved(), cli.quiet).await
        }
        Commands::Config { action } => cmd_config(action, config.clone()),
    }
}
