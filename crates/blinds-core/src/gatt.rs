//! Transport-neutral view of the GATT tree.
//!
//! These are the values passed between a [`Transport`](crate::Transport) and
//! the controller. They carry just enough to classify characteristics and to
//! address them again in later transport calls.

use std::fmt;

use btleplug::api::CharPropFlags;
use uuid::Uuid;

use blinds_types::DeviceId;
use blinds_types::uuids::CLIENT_CHARACTERISTIC_CONFIG;

/// Identifies one connection attempt to one device.
///
/// A transport hands out a fresh `id` on every [`open`](crate::Transport::open),
/// so events from an older attempt can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    /// Unique per open, never reused within a transport.
    pub id: u64,
    /// The device this connection targets.
    pub device: DeviceId,
}

impl ConnectionHandle {
    /// Create a handle.
    pub fn new(id: u64, device: DeviceId) -> Self {
        Self { id, device }
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.device, self.id)
    }
}

/// A descriptor attached to a characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattDescriptor {
    /// Descriptor UUID.
    pub uuid: Uuid,
}

impl GattDescriptor {
    /// Whether this is the Client Characteristic Configuration descriptor.
    pub fn is_cccd(&self) -> bool {
        self.uuid == CLIENT_CHARACTERISTIC_CONFIG
    }
}

/// A characteristic inside a discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the owning service.
    pub service_uuid: Uuid,
    /// Declared properties.
    pub properties: CharPropFlags,
    /// Descriptors in discovery order.
    pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
    /// Whether the characteristic can be read.
    pub fn is_readable(&self) -> bool {
        self.properties.contains(CharPropFlags::READ)
    }

    /// Whether the characteristic accepts writes.
    pub fn is_writable(&self) -> bool {
        self.properties
            .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
    }

    /// The descriptor used to switch notifications on.
    ///
    /// Prefers the CCCD and falls back to the first descriptor.
    pub fn notification_descriptor(&self) -> Option<&GattDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.is_cccd())
            .or_else(|| self.descriptors.first())
    }
}

/// A discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in discovery order.
    pub characteristics: Vec<GattCharacteristic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinds_types::uuids::BLINDS_SERVICE;

    fn characteristic(properties: CharPropFlags, descriptors: Vec<Uuid>) -> GattCharacteristic {
        GattCharacteristic {
            uuid: Uuid::from_u128(0x1234),
            service_uuid: BLINDS_SERVICE,
            properties,
            descriptors: descriptors
                .into_iter()
                .map(|uuid| GattDescriptor { uuid })
                .collect(),
        }
    }

    #[test]
    fn test_property_classification() {
        let c = characteristic(CharPropFlags::READ | CharPropFlags::NOTIFY, vec![]);
        assert!(c.is_readable());
        assert!(!c.is_writable());

        let c = characteristic(CharPropFlags::WRITE_WITHOUT_RESPONSE, vec![]);
        assert!(c.is_writable());
        assert!(!c.is_readable());
    }

    #[test]
    fn test_notification_descriptor_prefers_cccd() {
        let other = Uuid::from_u128(0x2901);
        let c = characteristic(
            CharPropFlags::READ,
            vec![other, CLIENT_CHARACTERISTIC_CONFIG],
        );
        assert!(c.notification_descriptor().unwrap().is_cccd());

        let c = characteristic(CharPropFlags::READ, vec![other]);
        assert_eq!(c.notification_descriptor().unwrap().uuid, other);

        let c = characteristic(CharPropFlags::READ, vec![]);
        assert!(c.notification_descriptor().is_none());
    }

    #[test]
    fn test_handle_display() {
        let handle = ConnectionHandle::new(7, DeviceId::new("03:80:E1:00:00:01"));
        assert_eq!(handle.to_string(), "03:80:E1:00:00:01#7");
    }
}
