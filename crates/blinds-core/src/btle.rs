//! btleplug-backed [`Transport`].
//!
//! Every trait call returns immediately and does its work on a spawned tokio
//! task; outcomes come back through the [`TransportEvents`] registered at
//! `open`. Link loss is picked up from the adapter's
//! `CentralEvent::DeviceDisconnected` stream.
//!
//! Notes on the mapping to btleplug:
//!
//! - A device is looked up among the adapter's known peripherals by address,
//!   so discovery must have seen it first.
//! - `enable_notifications` only toggles local forwarding from
//!   `Peripheral::notifications()`; writing [`ENABLE_NOTIFICATION_VALUE`] to
//!   the CCCD is what subscribes on the peripheral.
//! - A failed connect or service discovery is reported as a disconnect, a
//!   failed read as a read without a value.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Descriptor, Peripheral as _, Service,
    WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blinds_types::DeviceId;
use blinds_types::uuids::{DISABLE_NOTIFICATION_VALUE, ENABLE_NOTIFICATION_VALUE};

use crate::error::{Error, Result};
use crate::gatt::{ConnectionHandle, GattCharacteristic, GattDescriptor, GattService};
use crate::traits::{Transport, TransportEvents};

struct Link {
    handle: ConnectionHandle,
    peripheral: Option<Peripheral>,
    events: Arc<dyn TransportEvents>,
    cancel: CancellationToken,
    enabled: HashSet<Uuid>,
}

struct TransportInner {
    adapter: Adapter,
    runtime: Handle,
    next_id: AtomicU64,
    links: Mutex<HashMap<u64, Link>>,
}

/// [`Transport`] over a btleplug adapter.
#[derive(Clone)]
pub struct BtleTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("links", &self.inner.links().len())
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Create a transport on `adapter`.
    ///
    /// Tasks are spawned on the current tokio runtime.
    pub async fn new(adapter: Adapter) -> Result<Self> {
        let inner = Arc::new(TransportInner {
            adapter: adapter.clone(),
            runtime: Handle::current(),
            next_id: AtomicU64::new(1),
            links: Mutex::new(HashMap::new()),
        });

        let mut central_events = adapter.events().await?;
        let watcher = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    let Some(inner) = watcher.upgrade() else {
                        break;
                    };
                    inner.link_lost(&id);
                }
            }
            debug!("Adapter event stream ended");
        });

        Ok(Self { inner })
    }
}

impl TransportInner {
    fn links(&self) -> MutexGuard<'_, HashMap<u64, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, id: u64) -> bool {
        self.links().contains_key(&id)
    }

    /// Peripheral and listener for a live, resolved link.
    fn resolved(&self, id: u64) -> Option<(Peripheral, Arc<dyn TransportEvents>)> {
        let links = self.links();
        let link = links.get(&id)?;
        Some((link.peripheral.clone()?, link.events.clone()))
    }

    fn link_lost(&self, peripheral_id: &PeripheralId) {
        let lost: Vec<_> = self
            .links()
            .values()
            .filter(|link| {
                link.peripheral
                    .as_ref()
                    .is_some_and(|p| &p.id() == peripheral_id)
            })
            .map(|link| (link.handle.clone(), link.events.clone()))
            .collect();

        for (handle, events) in lost {
            info!("Link lost: {}", handle);
            events.on_disconnected(&handle);
        }
    }

    fn notifications_enabled(&self, id: u64, uuid: &Uuid) -> bool {
        self.links()
            .get(&id)
            .is_some_and(|link| link.enabled.contains(uuid))
    }

    async fn find_peripheral(&self, device: &DeviceId) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await?;
        peripherals
            .into_iter()
            .find(|p| DeviceId::new(p.address().to_string()) == *device)
            .ok_or(Error::NotConnected)
    }

    async fn connect(self: Arc<Self>, handle: ConnectionHandle, cancel: CancellationToken) {
        let Some(events) = self.links().get(&handle.id).map(|l| l.events.clone()) else {
            return;
        };

        let peripheral = match self.find_peripheral(&handle.device).await {
            Ok(peripheral) => peripheral,
            Err(e) => {
                warn!("Cannot open {}: {}", handle, e);
                events.on_disconnected(&handle);
                return;
            }
        };

        if let Err(e) = peripheral.connect().await {
            warn!("Connect to {} failed: {}", handle, e);
            events.on_disconnected(&handle);
            return;
        }

        let registered = match self.links().get_mut(&handle.id) {
            Some(link) => {
                link.peripheral = Some(peripheral.clone());
                true
            }
            None => false,
        };
        if !registered {
            debug!("{} closed while connecting", handle);
            let _ = peripheral.disconnect().await;
            return;
        }

        let notifications = match peripheral.notifications().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("No notification stream for {}: {}", handle, e);
                None
            }
        };

        events.on_connected(&handle);

        let Some(mut notifications) = notifications else {
            return;
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = notifications.next() => {
                    let Some(notification) = next else {
                        break;
                    };
                    if !self.notifications_enabled(handle.id, &notification.uuid) {
                        continue;
                    }
                    let Some(characteristic) = peripheral
                        .characteristics()
                        .iter()
                        .find(|c| c.uuid == notification.uuid)
                        .map(to_gatt_characteristic)
                    else {
                        continue;
                    };
                    events.on_characteristic_changed(
                        &handle,
                        &characteristic,
                        Some(notification.value),
                    );
                }
            }
        }
        debug!("Notification forwarding for {} stopped", handle);
    }
}

fn to_gatt_characteristic(characteristic: &Characteristic) -> GattCharacteristic {
    GattCharacteristic {
        uuid: characteristic.uuid,
        service_uuid: characteristic.service_uuid,
        properties: characteristic.properties,
        descriptors: characteristic
            .descriptors
            .iter()
            .map(|d| GattDescriptor { uuid: d.uuid })
            .collect(),
    }
}

fn to_gatt_service(service: &Service) -> GattService {
    GattService {
        uuid: service.uuid,
        characteristics: service
            .characteristics
            .iter()
            .map(to_gatt_characteristic)
            .collect(),
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    characteristic: &GattCharacteristic,
) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid)
}

fn write_type_for(properties: CharPropFlags) -> WriteType {
    if properties.contains(CharPropFlags::WRITE) {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

impl Transport for BtleTransport {
    fn open(
        &self,
        device: &DeviceId,
        events: Arc<dyn TransportEvents>,
    ) -> Result<ConnectionHandle> {
        let handle = ConnectionHandle::new(
            self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            device.clone(),
        );
        let cancel = CancellationToken::new();
        self.inner.links().insert(
            handle.id,
            Link {
                handle: handle.clone(),
                peripheral: None,
                events,
                cancel: cancel.clone(),
                enabled: HashSet::new(),
            },
        );

        debug!("Opening {}", handle);
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(inner.connect(handle.clone(), cancel));
        Ok(handle)
    }

    fn close(&self, handle: &ConnectionHandle) {
        let Some(link) = self.inner.links().remove(&handle.id) else {
            return;
        };
        link.cancel.cancel();
        if let Some(peripheral) = link.peripheral {
            let handle = handle.clone();
            self.inner.runtime.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Disconnect of {} failed: {}", handle, e);
                }
            });
        }
    }

    fn discover_services(&self, handle: &ConnectionHandle) -> bool {
        let Some((peripheral, events)) = self.inner.resolved(handle.id) else {
            return false;
        };
        let inner: Weak<TransportInner> = Arc::downgrade(&self.inner);
        let handle = handle.clone();
        self.inner.runtime.spawn(async move {
            let result = peripheral.discover_services().await;
            if !inner.upgrade().is_some_and(|i| i.is_live(handle.id)) {
                return;
            }
            match result {
                Ok(()) => {
                    let services = peripheral.services().iter().map(to_gatt_service).collect();
                    events.on_services_discovered(&handle, services);
                }
                Err(e) => {
                    warn!("Service discovery on {} failed: {}", handle, e);
                    events.on_disconnected(&handle);
                }
            }
        });
        true
    }

    fn read(&self, handle: &ConnectionHandle, characteristic: &GattCharacteristic) -> bool {
        let Some((peripheral, events)) = self.inner.resolved(handle.id) else {
            return false;
        };
        let Some(target) = find_characteristic(&peripheral, characteristic) else {
            return false;
        };
        let handle = handle.clone();
        let characteristic = characteristic.clone();
        self.inner.runtime.spawn(async move {
            let value = match peripheral.read(&target).await {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Read of {} on {} failed: {}", target.uuid, handle, e);
                    None
                }
            };
            events.on_characteristic_read(&handle, &characteristic, value);
        });
        true
    }

    fn write(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: &[u8],
    ) -> bool {
        let Some((peripheral, events)) = self.inner.resolved(handle.id) else {
            return false;
        };
        let Some(target) = find_characteristic(&peripheral, characteristic) else {
            return false;
        };
        let handle = handle.clone();
        let characteristic = characteristic.clone();
        let value = value.to_vec();
        self.inner.runtime.spawn(async move {
            let write_type = write_type_for(target.properties);
            let success = match peripheral.write(&target, &value, write_type).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Write to {} on {} failed: {}", target.uuid, handle, e);
                    false
                }
            };
            events.on_characteristic_write(&handle, &characteristic, success);
        });
        true
    }

    fn enable_notifications(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        enable: bool,
    ) -> bool {
        let mut links = self.inner.links();
        let Some(link) = links.get_mut(&handle.id) else {
            return false;
        };
        if enable {
            link.enabled.insert(characteristic.uuid);
        } else {
            link.enabled.remove(&characteristic.uuid);
        }
        true
    }

    fn write_descriptor(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        descriptor: &GattDescriptor,
        value: &[u8],
    ) -> bool {
        let Some((peripheral, _)) = self.inner.resolved(handle.id) else {
            return false;
        };
        let Some(target) = find_characteristic(&peripheral, characteristic) else {
            return false;
        };
        let handle = handle.clone();

        if descriptor.is_cccd() && value == ENABLE_NOTIFICATION_VALUE {
            self.inner.runtime.spawn(async move {
                if let Err(e) = peripheral.subscribe(&target).await {
                    warn!("Subscribe to {} on {} failed: {}", target.uuid, handle, e);
                }
            });
        } else if descriptor.is_cccd() && value == DISABLE_NOTIFICATION_VALUE {
            self.inner.runtime.spawn(async move {
                if let Err(e) = peripheral.unsubscribe(&target).await {
                    warn!("Unsubscribe from {} on {} failed: {}", target.uuid, handle, e);
                }
            });
        } else {
            let descriptor = Descriptor {
                uuid: descriptor.uuid,
                service_uuid: target.service_uuid,
                characteristic_uuid: target.uuid,
            };
            let value = value.to_vec();
            self.inner.runtime.spawn(async move {
                if let Err(e) = peripheral.write_descriptor(&descriptor, &value).await {
                    warn!("Descriptor write {} on {} failed: {}", descriptor.uuid, handle, e);
                }
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use blinds_types::uuids::{BLINDS_SERVICE, CLIENT_CHARACTERISTIC_CONFIG};

    fn characteristic(properties: CharPropFlags) -> Characteristic {
        let uuid = Uuid::from_u128(0xd973f2e1_b19e_11e2_9e96_0800200c9a66);
        Characteristic {
            uuid,
            service_uuid: BLINDS_SERVICE,
            properties,
            descriptors: BTreeSet::from([Descriptor {
                uuid: CLIENT_CHARACTERISTIC_CONFIG,
                service_uuid: BLINDS_SERVICE,
                characteristic_uuid: uuid,
            }]),
        }
    }

    #[test]
    fn test_characteristic_conversion() {
        let gatt = to_gatt_characteristic(&characteristic(CharPropFlags::READ | CharPropFlags::NOTIFY));
        assert_eq!(gatt.service_uuid, BLINDS_SERVICE);
        assert!(gatt.is_readable());
        assert!(!gatt.is_writable());
        assert_eq!(gatt.descriptors.len(), 1);
        assert!(gatt.descriptors[0].is_cccd());
    }

    #[test]
    fn test_service_conversion() {
        let service = Service {
            uuid: BLINDS_SERVICE,
            primary: true,
            characteristics: BTreeSet::from([characteristic(CharPropFlags::WRITE)]),
        };
        let gatt = to_gatt_service(&service);
        assert_eq!(gatt.uuid, BLINDS_SERVICE);
        assert_eq!(gatt.characteristics.len(), 1);
        assert!(gatt.characteristics[0].is_writable());
    }

    #[test]
    fn test_write_type_selection() {
        assert_eq!(write_type_for(CharPropFlags::WRITE), WriteType::WithResponse);
        assert_eq!(
            write_type_for(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            WriteType::WithoutResponse
        );
        assert_eq!(
            write_type_for(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
            WriteType::WithResponse
        );
    }
}
