//! Trait seams between the controller and the outside world.
//!
//! - [`Transport`]: the radio. Non-blocking calls, results delivered later
//!   through [`TransportEvents`].
//! - [`TransportEvents`]: implemented by the controller, registered once per
//!   connection through [`Transport::open`].
//! - [`DeviceDiscovery`]: the set of candidate devices, queried on demand.
//! - [`NotificationSink`]: where position updates and missing-device
//!   signals go.
//!
//! Production code uses [`BtleTransport`](crate::BtleTransport) and
//! [`BtleDiscovery`](crate::BtleDiscovery); tests use the types in
//! [`mock`](crate::mock).

use std::sync::Arc;

use blinds_types::DeviceId;

use crate::error::Result;
use crate::gatt::{ConnectionHandle, GattCharacteristic, GattDescriptor, GattService};

/// Low-level BLE transport.
///
/// Every method returns immediately. Methods returning `bool` report only
/// whether the operation was accepted for dispatch, never whether the
/// peripheral acted on it.
///
/// Implementations must not call back into [`TransportEvents`] from inside
/// one of these methods; the controller holds its registry lock while it
/// issues transport calls.
pub trait Transport: Send + Sync {
    /// Start connecting to a device.
    ///
    /// Link-up and link-loss are reported to `events` with the returned
    /// handle.
    fn open(&self, device: &DeviceId, events: Arc<dyn TransportEvents>)
    -> Result<ConnectionHandle>;

    /// Tear down a connection and release its resources.
    ///
    /// Events for a closed handle may still arrive afterwards.
    fn close(&self, handle: &ConnectionHandle);

    /// Request service and characteristic enumeration.
    fn discover_services(&self, handle: &ConnectionHandle) -> bool;

    /// Request a read of a characteristic.
    fn read(&self, handle: &ConnectionHandle, characteristic: &GattCharacteristic) -> bool;

    /// Request a write of `value` to a characteristic.
    fn write(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: &[u8],
    ) -> bool;

    /// Turn local delivery of change events for a characteristic on or off.
    fn enable_notifications(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        enable: bool,
    ) -> bool;

    /// Request a write of `value` to a descriptor.
    fn write_descriptor(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        descriptor: &GattDescriptor,
        value: &[u8],
    ) -> bool;
}

/// Asynchronous transport callbacks.
///
/// Any of these may fire concurrently with each other and with caller
/// operations on the controller.
pub trait TransportEvents: Send + Sync {
    /// The link to the device is up.
    fn on_connected(&self, handle: &ConnectionHandle);

    /// The link to the device is down (or never came up).
    fn on_disconnected(&self, handle: &ConnectionHandle);

    /// Service enumeration finished.
    fn on_services_discovered(&self, handle: &ConnectionHandle, services: Vec<GattService>);

    /// The peripheral pushed a new characteristic value.
    fn on_characteristic_changed(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    );

    /// A previously requested read completed.
    fn on_characteristic_read(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    );

    /// A previously requested write completed.
    fn on_characteristic_write(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        success: bool,
    );
}

/// Source of candidate devices.
pub trait DeviceDiscovery: Send + Sync {
    /// Devices currently known that match the blinds address prefix.
    fn candidates(&self) -> Vec<DeviceId>;

    /// Whether the Bluetooth adapter is missing or switched off.
    fn is_disabled(&self) -> bool {
        false
    }
}

/// Receiver of position updates and missing-device signals.
///
/// Never called while the controller's registry lock is held, so an
/// implementation may call back into the controller. Calls for different
/// devices can arrive concurrently; implementations should return quickly.
pub trait NotificationSink: Send + Sync {
    /// A device reported its current position.
    fn on_change(&self, device: &DeviceId, value: u32);

    /// A device dropped off unexpectedly or sent an unusable value.
    fn on_missing(&self, device: &DeviceId);
}
