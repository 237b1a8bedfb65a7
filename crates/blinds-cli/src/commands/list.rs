//! List command implementation.

use std::time::Duration;

use anyhow::{Result, bail};

use blinds_core::ControllerConfig;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::fleet::Fleet;
use crate::format::format_status_table;

pub async fn cmd_list(
    controller_config: ControllerConfig,
    config: &Config,
    wait: u64,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let fleet = Fleet::start(controller_config).await?;
    if fleet.controller.is_disabled() {
        fleet.shutdown().await;
        bail!("Bluetooth discovery is unavailable");
    }

    if !quiet {
        eprintln!("Scanning for blinds controllers ({}s)...", wait);
    }
    fleet.controller.activate();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, showing what was found so far");
        }
        _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
    }

    let statuses = fleet.controller.snapshot();
    fleet.shutdown().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Text => print!("{}", format_status_table(&statuses, config)),
    }
    Ok(())
}
