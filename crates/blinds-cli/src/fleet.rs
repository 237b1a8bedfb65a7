//! Wiring of the real Bluetooth stack into a running controller.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use blinds_core::{
    BlindsController, BtleDiscovery, BtleTransport, ControllerConfig, EventDispatcher,
    get_adapter, spawn_reconnect_task,
};

/// A controller on the system adapter with its scheduler running.
pub struct Fleet {
    pub controller: BlindsController,
    pub events: Arc<EventDispatcher>,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
}

impl Fleet {
    /// Open the first adapter, start scanning and start the scheduler.
    ///
    /// The controller is created passive; callers decide when to activate.
    pub async fn start(config: ControllerConfig) -> Result<Self> {
        let adapter = get_adapter()
            .await
            .context("No Bluetooth adapter found")?;
        let discovery = BtleDiscovery::start(adapter.clone(), config.address_prefix.clone())
            .await
            .context("Failed to start scanning. Is Bluetooth enabled?")?;
        let transport = BtleTransport::new(adapter)
            .await
            .context("Failed to listen for adapter events")?;

        let events = Arc::new(EventDispatcher::default());
        let controller = BlindsController::with_config(
            Arc::new(transport),
            Arc::new(discovery),
            events.clone(),
            config,
        )?;

        let cancel = CancellationToken::new();
        let scheduler = spawn_reconnect_task(controller.clone(), cancel.clone());
        debug!("Fleet started: {:?}", controller);

        Ok(Self {
            controller,
            events,
            cancel,
            scheduler,
        })
    }

    /// Passivate the controller and stop the scheduler.
    pub async fn shutdown(self) {
        self.controller.passivate();
        self.cancel.cancel();
        if let Err(e) = self.scheduler.await {
            debug!("Scheduler task ended abnormally: {}", e);
        }
    }
}
