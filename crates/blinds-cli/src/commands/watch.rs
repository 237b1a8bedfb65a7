//! Watch command implementation.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use blinds_core::ControllerConfig;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::fleet::Fleet;
use crate::format::format_event;

pub async fn cmd_watch(
    controller_config: ControllerConfig,
    config: &Config,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let fleet = Fleet::start(controller_config).await?;
    let mut rx = fleet.events.subscribe();

    if !quiet {
        eprintln!("Watching blinds controllers (Ctrl+C to stop)...");
    }
    fleet.controller.activate();

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break Ok(());
            }
            event = rx.recv() => match event {
                Ok(event) => match format {
                    OutputFormat::Json => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => break Err(e.into()),
                    },
                    OutputFormat::Text => println!("{}", format_event(&event, config)),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} events while printing", skipped);
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    fleet.shutdown().await;
    result
}
