//! Device discovery.
//!
//! [`BtleDiscovery`] keeps the adapter scanning in the background and
//! remembers every peripheral whose address carries the blinds prefix. The
//! controller asks it for [`candidates`](DeviceDiscovery::candidates)
//! whenever it activates or ticks.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blinds_types::DeviceId;

use crate::error::{Error, Result};
use crate::traits::DeviceDiscovery;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::AdapterUnavailable)
}

struct DiscoveryInner {
    prefix: String,
    seen: Mutex<BTreeSet<DeviceId>>,
    disabled: AtomicBool,
}

impl DiscoveryInner {
    fn seen(&self) -> MutexGuard<'_, BTreeSet<DeviceId>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember `address` if it carries the prefix.
    fn observe(&self, address: &str) -> bool {
        let device = DeviceId::new(address);
        if !device.has_prefix(&self.prefix) {
            return false;
        }
        let mut seen = self.seen();
        if seen.insert(device.clone()) {
            info!("Discovered blinds controller: {}", device);
        }
        true
    }

    async fn observe_peripheral(&self, adapter: &Adapter, id: &PeripheralId) {
        match adapter.peripheral(id).await {
            Ok(peripheral) => {
                self.observe(&peripheral.address().to_string());
            }
            Err(e) => debug!("Could not resolve peripheral {:?}: {}", id, e),
        }
    }
}

/// Background scanner implementing [`DeviceDiscovery`].
///
/// Scanning stops when the value is dropped or [`stop`](Self::stop) is
/// called.
pub struct BtleDiscovery {
    inner: Arc<DiscoveryInner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for BtleDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleDiscovery")
            .field("prefix", &self.inner.prefix)
            .field("seen", &self.inner.seen().len())
            .field("disabled", &self.inner.disabled.load(Ordering::Relaxed))
            .finish()
    }
}

impl BtleDiscovery {
    /// Start scanning on `adapter` for addresses beginning with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter's event stream cannot be opened or the
    /// scan cannot be started (for example because Bluetooth is off).
    pub async fn start(adapter: Adapter, prefix: impl Into<String>) -> Result<Self> {
        let inner = Arc::new(DiscoveryInner {
            prefix: prefix.into(),
            seen: Mutex::new(BTreeSet::new()),
            disabled: AtomicBool::new(false),
        });

        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        info!("Scanning for prefix {}", inner.prefix);

        // Peripherals the platform already knows about.
        for peripheral in adapter.peripherals().await? {
            inner.observe(&peripheral.address().to_string());
        }

        let cancel = CancellationToken::new();
        let task_inner = Arc::clone(&inner);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        if let Err(e) = adapter.stop_scan().await {
                            debug!("Failed to stop scan: {}", e);
                        }
                        break;
                    }
                    event = events.next() => {
                        match event {
                            Some(CentralEvent::DeviceDiscovered(id))
                            | Some(CentralEvent::DeviceUpdated(id)) => {
                                task_inner.observe_peripheral(&adapter, &id).await;
                            }
                            Some(_) => {}
                            None => {
                                warn!("Adapter event stream ended; treating Bluetooth as disabled");
                                task_inner.disabled.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { inner, cancel })
    }

    /// Stop scanning.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The prefix filter in use.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }
}

impl Drop for BtleDiscovery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DeviceDiscovery for BtleDiscovery {
    fn candidates(&self) -> Vec<DeviceId> {
        self.inner.seen().iter().cloned().collect()
    }

    fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(prefix: &str) -> DiscoveryInner {
        DiscoveryInner {
            prefix: prefix.to_string(),
            seen: Mutex::new(BTreeSet::new()),
            disabled: AtomicBool::new(false),
        }
    }

    #[test]
    fn test_observe_filters_by_prefix() {
        let inner = inner("03:80:E1:00");
        assert!(inner.observe("03:80:e1:00:12:34"));
        assert!(!inner.observe("AA:BB:CC:DD:EE:FF"));
        assert!(inner.observe("03:80:E1:00:12:34"));

        let seen: Vec<_> = inner.seen().iter().cloned().collect();
        assert_eq!(seen, vec![DeviceId::new("03:80:E1:00:12:34")]);
    }

    #[tokio::test]
    #[ignore = "requires BLE hardware"]
    async fn test_discovery_on_real_adapter() {
        let adapter = get_adapter().await.expect("no adapter");
        let discovery = BtleDiscovery::start(adapter, blinds_types::BLINDS_ADDRESS_PREFIX)
            .await
            .expect("scan failed");
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert!(!discovery.is_disabled());
        for device in discovery.candidates() {
            assert!(device.has_prefix(discovery.prefix()));
        }
    }
}
