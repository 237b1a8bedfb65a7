//! Per-device connection state.
//!
//! A [`Connection`] exists from the moment the transport accepts an open until
//! the device is closed. It remembers the handle of that attempt and how far
//! the handshake has come:
//!
//! ```text
//! Disconnected -> Connecting -> ServicesDiscovered -> Ready
//!       ^              |                |               |
//!       +--------------+----------------+---------------+  (link loss / close)
//! ```
//!
//! `Disconnected` is the absence of a `Connection`. The write characteristic
//! lives inside the connection, so closing always drops it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gatt::{ConnectionHandle, GattCharacteristic};

/// Where a device is in the connect/handshake sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No connection attempt in flight.
    Disconnected,
    /// Open requested, link not up yet (or up and enumerating services).
    Connecting,
    /// Services enumerated but no writable characteristic found (yet).
    ServicesDiscovered,
    /// Writable characteristic known; writes can be sent.
    Ready,
}

impl LinkState {
    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::ServicesDiscovered => "services-discovered",
            LinkState::Ready => "ready",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live connection attempt.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    handle: ConnectionHandle,
    services_discovered: bool,
    write_characteristic: Option<GattCharacteristic>,
    /// Characteristics whose notification descriptor has been written.
    armed: HashSet<Uuid>,
}

impl Connection {
    pub(crate) fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            services_discovered: false,
            write_characteristic: None,
            armed: HashSet::new(),
        }
    }

    pub(crate) fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Whether an event for `handle` belongs to this connection.
    pub(crate) fn owns(&self, handle: &ConnectionHandle) -> bool {
        self.handle.id == handle.id
    }

    pub(crate) fn state(&self) -> LinkState {
        if self.write_characteristic.is_some() {
            LinkState::Ready
        } else if self.services_discovered {
            LinkState::ServicesDiscovered
        } else {
            LinkState::Connecting
        }
    }

    pub(crate) fn mark_services_discovered(&mut self) {
        self.services_discovered = true;
    }

    pub(crate) fn write_characteristic(&self) -> Option<&GattCharacteristic> {
        self.write_characteristic.as_ref()
    }

    pub(crate) fn set_write_characteristic(&mut self, characteristic: GattCharacteristic) {
        self.write_characteristic = Some(characteristic);
    }

    pub(crate) fn is_armed(&self, characteristic: &Uuid) -> bool {
        self.armed.contains(characteristic)
    }

    pub(crate) fn arm(&mut self, characteristic: Uuid) {
        self.armed.insert(characteristic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::CharPropFlags;

    use blinds_types::DeviceId;
    use blinds_types::uuids::BLINDS_SERVICE;

    fn handle(id: u64) -> ConnectionHandle {
        ConnectionHandle::new(id, DeviceId::new("03:80:E1:00:00:01"))
    }

    #[test]
    fn test_state_progression() {
        let mut conn = Connection::new(handle(1));
        assert_eq!(conn.state(), LinkState::Connecting);

        conn.mark_services_discovered();
        assert_eq!(conn.state(), LinkState::ServicesDiscovered);

        conn.set_write_characteristic(GattCharacteristic {
            uuid: Uuid::from_u128(1),
            service_uuid: BLINDS_SERVICE,
            properties: CharPropFlags::WRITE,
            descriptors: Vec::new(),
        });
        assert_eq!(conn.state(), LinkState::Ready);
    }

    #[test]
    fn test_armed_per_characteristic() {
        let mut conn = Connection::new(handle(1));
        let first = Uuid::from_u128(1);
        let second = Uuid::from_u128(2);

        conn.arm(first);
        assert!(conn.is_armed(&first));
        assert!(!conn.is_armed(&second));
    }

    #[test]
    fn test_owns_matches_id_only() {
        let conn = Connection::new(handle(3));
        assert!(conn.owns(&handle(3)));
        assert!(!conn.owns(&handle(4)));
    }

    #[test]
    fn test_link_state_labels() {
        assert_eq!(LinkState::ServicesDiscovered.to_string(), "services-discovered");
        assert_eq!(
            serde_json::to_string(&LinkState::Ready).unwrap(),
            "\"ready\""
        );
    }
}
