//! Set command implementation.

use std::time::Duration;

use anyhow::{Result, bail};
use tokio::time::Instant;
use tracing::debug;

use blinds_core::ControllerConfig;

use crate::config::{Config, resolve_device};
use crate::fleet::Fleet;
use crate::format::describe_position;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Time given to the device to act on the write before links are dropped.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub async fn cmd_set(
    controller_config: ControllerConfig,
    config: &Config,
    device: &str,
    percent: u32,
    timeout: u64,
    quiet: bool,
) -> Result<()> {
    let target = resolve_device(device, config)?;
    let fleet = Fleet::start(controller_config).await?;

    if !quiet {
        eprintln!("Setting {} to {}...", target, describe_position(percent));
    }
    fleet.controller.activate();
    fleet.controller.request_write(&target, percent);

    let deadline = Instant::now() + Duration::from_secs(timeout);
    let delivered = loop {
        let written = fleet
            .controller
            .device_status(&target)
            .and_then(|status| status.written);
        if written == Some(percent) {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted");
                fleet.shutdown().await;
                return Ok(());
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    };

    if delivered {
        debug!("Write to {} dispatched, settling", target);
        tokio::time::sleep(SETTLE_DELAY).await;
    }
    fleet.shutdown().await;

    if !delivered {
        bail!("Timed out after {}s waiting for {}", timeout, target);
    }
    println!("Set {} to {}", target, describe_position(percent));
    Ok(())
}
