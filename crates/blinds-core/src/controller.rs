//! Fleet controller.
//!
//! [`BlindsController`] owns the device registry and drives every device
//! through connect, service discovery and notification setup, then keeps a
//! single coalesced target position per device flowing to the hardware.
//!
//! All registry state sits behind one `std::sync::Mutex`. It is never held
//! across an `.await` and never held while the [`NotificationSink`] runs:
//! sink calls are collected while it is held and delivered after the guard is
//! dropped, so a sink may call straight back into the controller.
//!
//! Transport events carry the [`ConnectionHandle`] of the attempt they
//! belong to. An event whose handle is not the device's current connection
//! is stale and ignored; that is also how a disconnect caused by a local
//! close goes unreported.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use blinds_types::codec::{decode_position, encode_position};
use blinds_types::uuids::{BLINDS_SERVICE, ENABLE_NOTIFICATION_VALUE};
use blinds_types::{BLINDS_ADDRESS_PREFIX, DeviceId};

use crate::coalescer::{FlushOutcome, PendingWrite};
use crate::connection::{Connection, LinkState};
use crate::error::{Error, Result};
use crate::gatt::{ConnectionHandle, GattCharacteristic, GattService};
use crate::reconnect::ReconnectOptions;
use crate::traits::{DeviceDiscovery, NotificationSink, Transport, TransportEvents};

/// Configuration for a [`BlindsController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Only candidates whose address starts with this prefix are adopted.
    pub address_prefix: String,
    /// Reconnection scheduler settings.
    pub reconnect: ReconnectOptions,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address_prefix: BLINDS_ADDRESS_PREFIX.to_string(),
            reconnect: ReconnectOptions::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the address prefix.
    pub fn address_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.address_prefix = prefix.into();
        self
    }

    /// Set the reconnect options.
    pub fn reconnect(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }

    /// Validate the configuration and return an error if invalid.
    ///
    /// The prefix may be empty (adopt everything discovery reports) but may
    /// only contain hex digits and `:` separators.
    pub fn validate(&self) -> Result<()> {
        if !self
            .address_prefix
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':')
        {
            return Err(Error::invalid_config(format!(
                "address prefix '{}' must contain only hex digits and ':'",
                self.address_prefix
            )));
        }
        self.reconnect.validate()
    }
}

/// Point-in-time view of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    /// The device.
    pub device: DeviceId,
    /// Connection progress.
    pub link: LinkState,
    /// Whether the next disconnect is one the controller caused.
    pub expect_disconnect: bool,
    /// Most recently requested position.
    pub to_write: Option<u32>,
    /// Last position handed to the transport.
    pub written: Option<u32>,
}

#[derive(Debug, Default)]
struct DeviceState {
    connection: Option<Connection>,
    expect_disconnect: bool,
    pending: PendingWrite,
}

impl DeviceState {
    fn link_state(&self) -> LinkState {
        self.connection
            .as_ref()
            .map_or(LinkState::Disconnected, Connection::state)
    }

    fn status(&self, device: &DeviceId) -> DeviceStatus {
        DeviceStatus {
            device: device.clone(),
            link: self.link_state(),
            expect_disconnect: self.expect_disconnect,
            to_write: self.pending.to_write(),
            written: self.pending.written(),
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    active: bool,
    devices: HashMap<DeviceId, DeviceState>,
}

impl Registry {
    /// The state for `handle`'s device, if `handle` is its current connection.
    fn current(&mut self, handle: &ConnectionHandle) -> Option<&mut DeviceState> {
        self.devices
            .get_mut(&handle.device)
            .filter(|state| matches!(&state.connection, Some(conn) if conn.owns(handle)))
    }
}

/// A sink call deferred until the registry lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Notice {
    Change(DeviceId, u32),
    Missing(DeviceId),
}

struct Shared {
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn DeviceDiscovery>,
    sink: Arc<dyn NotificationSink>,
    config: ControllerConfig,
    registry: Mutex<Registry>,
    relay: Arc<EventRelay>,
}

/// The [`TransportEvents`] handed to the transport on every open.
///
/// Holds the controller weakly so a transport keeping old listeners around
/// does not keep the controller alive.
struct EventRelay {
    shared: Weak<Shared>,
}

/// Controller for a fleet of blinds.
///
/// Cloning is cheap; clones share the same registry.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use blinds_core::{BlindsController, BtleDiscovery, BtleTransport, EventDispatcher};
/// use blinds_types::DeviceId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let adapter = blinds_core::get_adapter().await?;
/// let discovery = BtleDiscovery::start(adapter.clone(), blinds_types::BLINDS_ADDRESS_PREFIX).await?;
/// let transport = BtleTransport::new(adapter).await?;
/// let events = EventDispatcher::default();
///
/// let controller = BlindsController::new(Arc::new(transport), Arc::new(discovery), Arc::new(events));
/// controller.activate();
///
/// let device: DeviceId = "03:80:E1:00:00:01".parse()?;
/// controller.request_write(&device, 50);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlindsController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for BlindsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlindsController")
            .field("config", &self.shared.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl BlindsController {
    /// Create a controller with the default configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn DeviceDiscovery>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::build(transport, discovery, sink, ControllerConfig::default())
    }

    /// Create a controller with a custom configuration.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn DeviceDiscovery>,
        sink: Arc<dyn NotificationSink>,
        config: ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, discovery, sink, config))
    }

    fn build(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn DeviceDiscovery>,
        sink: Arc<dyn NotificationSink>,
        config: ControllerConfig,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak| Shared {
            transport,
            discovery,
            sink,
            config,
            registry: Mutex::new(Registry::default()),
            relay: Arc::new(EventRelay {
                shared: weak.clone(),
            }),
        });
        Self { shared }
    }

    /// Get the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Start managing the fleet.
    ///
    /// Every discovery candidate gets a registry entry and, unless it already
    /// has one, a connection attempt.
    pub fn activate(&self) {
        let candidates = self.shared.discovery.candidates();
        let mut registry = self.shared.lock();
        registry.active = true;
        info!("Activating with {} candidate(s)", candidates.len());
        self.shared.adopt(&mut registry, candidates);
    }

    /// Stop managing the fleet.
    ///
    /// Every connection is closed and the resulting disconnects are not
    /// reported. Pending writes are kept for the next activation.
    pub fn passivate(&self) {
        let mut registry = self.shared.lock();
        registry.active = false;
        info!("Passivating {} device(s)", registry.devices.len());
        for state in registry.devices.values_mut() {
            state.expect_disconnect = true;
            self.shared.close(state);
        }
    }

    /// Whether the controller is between `activate` and `passivate`.
    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Whether the Bluetooth adapter is missing or switched off.
    pub fn is_disabled(&self) -> bool {
        self.shared.discovery.is_disabled()
    }

    /// All devices in the registry.
    pub fn list_devices(&self) -> Vec<DeviceId> {
        self.shared.lock().devices.keys().cloned().collect()
    }

    /// Ask for `device` to move to `value`.
    ///
    /// Only the latest request per device is kept. A ready device is written
    /// immediately; otherwise the write goes out once the device is ready.
    /// A device without a connection is opened right away, whether or not
    /// the controller is active.
    pub fn request_write(&self, device: &DeviceId, value: u32) {
        let mut registry = self.shared.lock();
        let state = registry.devices.entry(device.clone()).or_default();
        state.expect_disconnect = false;
        state.pending.request(value);
        debug!("Requested {} for {}", value, device);

        match state.link_state() {
            LinkState::Disconnected => self.shared.open(device, state),
            LinkState::Ready => self.shared.flush(device, state),
            LinkState::Connecting | LinkState::ServicesDiscovered => {}
        }
    }

    /// Run one reconnection cycle.
    ///
    /// No-op while passive. Otherwise adopts new discovery candidates,
    /// reopens every closed device and flushes every ready one.
    pub fn tick(&self) {
        if !self.is_active() {
            return;
        }
        let candidates = self.shared.discovery.candidates();

        let mut registry = self.shared.lock();
        if !registry.active {
            return;
        }
        let opened = self.shared.adopt(&mut registry, candidates);

        for (device, state) in registry.devices.iter_mut() {
            match state.link_state() {
                // Already tried by `adopt` this tick.
                LinkState::Disconnected if opened.contains(device) => {}
                LinkState::Disconnected => {
                    state.expect_disconnect = false;
                    self.shared.open(device, state);
                }
                LinkState::Ready => self.shared.flush(device, state),
                LinkState::Connecting | LinkState::ServicesDiscovered => {}
            }
        }
    }

    /// Status of one device.
    pub fn device_status(&self, device: &DeviceId) -> Option<DeviceStatus> {
        self.shared
            .lock()
            .devices
            .get(device)
            .map(|state| state.status(device))
    }

    /// Status of every device, sorted by id.
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut statuses: Vec<_> = self
            .shared
            .lock()
            .devices
            .iter()
            .map(|(device, state)| state.status(device))
            .collect();
        statuses.sort_by(|a, b| a.device.cmp(&b.device));
        statuses
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `candidates` and open those without a connection.
    ///
    /// Returns the devices an open was attempted for.
    fn adopt(&self, registry: &mut Registry, candidates: Vec<DeviceId>) -> HashSet<DeviceId> {
        let mut opened = HashSet::new();
        for device in candidates {
            if !device.has_prefix(&self.config.address_prefix) {
                debug!("Ignoring candidate {} outside prefix", device);
                continue;
            }
            let state = registry.devices.entry(device.clone()).or_insert_with(|| {
                info!("Adopted device: {}", device);
                DeviceState::default()
            });
            if state.connection.is_none() {
                state.expect_disconnect = false;
                self.open(&device, state);
                opened.insert(device);
            }
        }
        opened
    }

    fn open(&self, device: &DeviceId, state: &mut DeviceState) {
        match self.transport.open(device, self.relay.clone()) {
            Ok(handle) => {
                debug!("Opening {}", handle);
                state.connection = Some(Connection::new(handle));
            }
            Err(e) => warn!("Failed to open {}: {}", device, e),
        }
    }

    fn close(&self, state: &mut DeviceState) {
        if let Some(conn) = state.connection.take() {
            debug!("Closing {}", conn.handle());
            self.transport.close(conn.handle());
        }
    }

    fn flush(&self, device: &DeviceId, state: &mut DeviceState) {
        let Some(conn) = state.connection.as_ref() else {
            return;
        };
        let Some(characteristic) = conn.write_characteristic() else {
            return;
        };
        let handle = conn.handle();
        let outcome = state.pending.flush(|value| {
            self.transport
                .write(handle, characteristic, &encode_position(value))
        });

        match outcome {
            FlushOutcome::Idle => {}
            FlushOutcome::Sent(value) => debug!("Wrote {} to {}", value, device),
            FlushOutcome::Rejected(value) => {
                warn!("Write of {} to {} was rejected, closing", value, device);
                self.close(state);
            }
        }
    }

    /// Decode a value event; an unusable value closes the device.
    fn take_value(
        &self,
        state: &mut DeviceState,
        handle: &ConnectionHandle,
        value: Option<&[u8]>,
    ) -> Option<u32> {
        match decode_position(value) {
            Ok(position) => Some(position),
            Err(e) => {
                warn!("Unusable value from {}: {}", handle, e);
                self.close(state);
                None
            }
        }
    }

    fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Change(device, value) => self.sink.on_change(&device, value),
                Notice::Missing(device) => self.sink.on_missing(&device),
            }
        }
    }

    fn handle_connected(&self, handle: &ConnectionHandle) {
        let mut registry = self.lock();
        let Some(state) = registry.current(handle) else {
            debug!("Ignoring connect for stale {}", handle);
            return;
        };
        info!("Connected: {}", handle);
        if !self.transport.discover_services(handle) {
            warn!("Service discovery on {} was rejected, closing", handle);
            self.close(state);
        }
    }

    fn handle_disconnected(&self, handle: &ConnectionHandle) -> Vec<Notice> {
        let mut registry = self.lock();
        let Some(state) = registry.current(handle) else {
            debug!("Ignoring disconnect for stale {}", handle);
            return Vec::new();
        };

        let mut notices = Vec::new();
        if state.expect_disconnect {
            debug!("Expected disconnect: {}", handle);
        } else {
            warn!("Lost connection: {}", handle);
            notices.push(Notice::Missing(handle.device.clone()));
        }
        state.expect_disconnect = false;
        self.close(state);
        notices
    }

    fn handle_services(&self, handle: &ConnectionHandle, services: &[GattService]) {
        let mut registry = self.lock();
        let Some(state) = registry.current(handle) else {
            debug!("Ignoring services for stale {}", handle);
            return;
        };
        let Some(conn) = state.connection.as_mut() else {
            return;
        };
        conn.mark_services_discovered();

        let Some(service) = services.iter().find(|s| s.uuid == BLINDS_SERVICE) else {
            warn!("{} does not expose the blinds service", handle);
            return;
        };

        let mut read_rejected = false;
        for characteristic in &service.characteristics {
            if characteristic.is_readable() {
                if !self.transport.enable_notifications(handle, characteristic, true) {
                    warn!(
                        "Enabling notifications for {} on {} was rejected",
                        characteristic.uuid, handle
                    );
                }
                if !self.transport.read(handle, characteristic) {
                    warn!("Read of {} on {} was rejected", characteristic.uuid, handle);
                    read_rejected = true;
                    break;
                }
            }
            if characteristic.is_writable() {
                conn.set_write_characteristic(characteristic.clone());
            }
        }

        if read_rejected {
            self.close(state);
            return;
        }
        if state.link_state() == LinkState::Ready {
            info!("Ready: {}", handle);
            self.flush(&handle.device, state);
        }
    }

    fn handle_changed(&self, handle: &ConnectionHandle, value: Option<&[u8]>) -> Vec<Notice> {
        let mut registry = self.lock();
        let Some(state) = registry.current(handle) else {
            debug!("Ignoring change for stale {}", handle);
            return Vec::new();
        };

        let notice = match self.take_value(state, handle, value) {
            Some(position) => {
                debug!("{} reports {}", handle, position);
                Notice::Change(handle.device.clone(), position)
            }
            None => Notice::Missing(handle.device.clone()),
        };
        vec![notice]
    }

    fn handle_read(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<&[u8]>,
    ) -> Vec<Notice> {
        let mut registry = self.lock();
        let Some(state) = registry.current(handle) else {
            debug!("Ignoring read for stale {}", handle);
            return Vec::new();
        };

        let Some(position) = self.take_value(state, handle, value) else {
            return vec![Notice::Missing(handle.device.clone())];
        };
        debug!("{} read {}", handle, position);

        let armed = state
            .connection
            .as_ref()
            .is_some_and(|conn| conn.is_armed(&characteristic.uuid));
        if !armed {
            let dispatched = characteristic.notification_descriptor().is_some_and(|descriptor| {
                self.transport.write_descriptor(
                    handle,
                    characteristic,
                    descriptor,
                    &ENABLE_NOTIFICATION_VALUE,
                )
            });
            if dispatched {
                if let Some(conn) = state.connection.as_mut() {
                    conn.arm(characteristic.uuid);
                }
            } else {
                warn!(
                    "Could not enable notifications for {} on {}, closing",
                    characteristic.uuid, handle
                );
                self.close(state);
            }
        }

        vec![Notice::Change(handle.device.clone(), position)]
    }
}

impl TransportEvents for EventRelay {
    fn on_connected(&self, handle: &ConnectionHandle) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_connected(handle);
        }
    }

    fn on_disconnected(&self, handle: &ConnectionHandle) {
        if let Some(shared) = self.shared.upgrade() {
            let notices = shared.handle_disconnected(handle);
            shared.deliver(notices);
        }
    }

    fn on_services_discovered(&self, handle: &ConnectionHandle, services: Vec<GattService>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_services(handle, &services);
        }
    }

    fn on_characteristic_changed(
        &self,
        handle: &ConnectionHandle,
        _characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    ) {
        if let Some(shared) = self.shared.upgrade() {
            let notices = shared.handle_changed(handle, value.as_deref());
            shared.deliver(notices);
        }
    }

    fn on_characteristic_read(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    ) {
        if let Some(shared) = self.shared.upgrade() {
            let notices = shared.handle_read(handle, characteristic, value.as_deref());
            shared.deliver(notices);
        }
    }

    fn on_characteristic_write(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        success: bool,
    ) {
        if success {
            debug!("Write to {} on {} completed", characteristic.uuid, handle);
        } else {
            warn!("Write to {} on {} failed", characteristic.uuid, handle);
        }
    }
}
