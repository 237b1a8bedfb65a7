//! Mock transport, discovery and sink for testing.
//!
//! [`MockTransport`] records every call the controller makes and never calls
//! back on its own. Tests drive the other side of the radio explicitly with
//! the `emit_*` helpers, which deliver events to whatever listener was
//! registered for a handle, including handles the controller has since
//! closed.
//!
//! # Features
//!
//! - **Failure injection**: refuse opens, reject discovery, reads, writes,
//!   notification enables or descriptor writes
//! - **Panic injection**: panic inside the next `open` calls, for scheduler
//!   resilience tests
//! - **Call log**: every transport call in order, see [`TransportCall`]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::CharPropFlags;
use uuid::Uuid;

use blinds_types::DeviceId;
use blinds_types::codec::{decode_position, encode_position};
use blinds_types::uuids::{BLINDS_SERVICE, CLIENT_CHARACTERISTIC_CONFIG};

use crate::error::{Error, Result};
use crate::gatt::{ConnectionHandle, GattCharacteristic, GattDescriptor, GattService};
use crate::traits::{DeviceDiscovery, NotificationSink, Transport, TransportEvents};

/// UUID of the mock's readable, notifying position characteristic.
pub const MOCK_POSITION_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xd973f2e1_b19e_11e2_9e96_0800200c9a66);

/// UUID of the mock's writable command characteristic.
pub const MOCK_COMMAND_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xd973f2e2_b19e_11e2_9e96_0800200c9a66);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `open` for a device (recorded even when refused).
    Open(DeviceId),
    /// `close` of a handle.
    Close(ConnectionHandle),
    /// `discover_services` on a handle.
    DiscoverServices(ConnectionHandle),
    /// `read` of a characteristic.
    Read(ConnectionHandle, Uuid),
    /// `write` of raw bytes to a characteristic.
    Write(ConnectionHandle, Uuid, Vec<u8>),
    /// `enable_notifications` on a characteristic.
    EnableNotifications(ConnectionHandle, Uuid, bool),
    /// `write_descriptor` of raw bytes to a descriptor.
    WriteDescriptor(ConnectionHandle, Uuid, Vec<u8>),
}

#[derive(Default)]
struct MockState {
    calls: Vec<TransportCall>,
    handles: Vec<ConnectionHandle>,
    listeners: HashMap<u64, Arc<dyn TransportEvents>>,
    open: HashSet<u64>,
}

/// A scripted [`Transport`] for testing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use blinds_core::BlindsController;
/// use blinds_core::mock::{MockDiscovery, MockSink, MockTransport};
/// use blinds_types::DeviceId;
///
/// let device = DeviceId::new("03:80:E1:00:00:01");
/// let transport = Arc::new(MockTransport::new());
/// let sink = Arc::new(MockSink::new());
/// let controller = BlindsController::new(
///     transport.clone(),
///     Arc::new(MockDiscovery::new(vec![device.clone()])),
///     sink.clone(),
/// );
///
/// controller.activate();
/// controller.request_write(&device, 50);
/// transport.complete_handshake(&device);
/// assert_eq!(transport.writes(&device), vec![50]);
/// ```
#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicU64,
    state: Mutex<MockState>,
    refuse_open: AtomicBool,
    reject_discovery: AtomicBool,
    reject_reads: AtomicBool,
    reject_writes: AtomicBool,
    reject_notifications: AtomicBool,
    reject_descriptor_writes: AtomicBool,
    panics_remaining: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockTransport")
            .field("calls", &state.calls.len())
            .field("open", &state.open.len())
            .field("refuse_open", &self.refuse_open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Create a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// The service tree of a well-behaved blinds controller.
    pub fn blinds_services() -> Vec<GattService> {
        vec![GattService {
            uuid: BLINDS_SERVICE,
            characteristics: vec![Self::position_characteristic(), Self::command_characteristic()],
        }]
    }

    /// Readable, notifying characteristic with a CCCD.
    pub fn position_characteristic() -> GattCharacteristic {
        GattCharacteristic {
            uuid: MOCK_POSITION_CHARACTERISTIC,
            service_uuid: BLINDS_SERVICE,
            properties: CharPropFlags::READ | CharPropFlags::NOTIFY,
            descriptors: vec![GattDescriptor {
                uuid: CLIENT_CHARACTERISTIC_CONFIG,
            }],
        }
    }

    /// Writable characteristic.
    pub fn command_characteristic() -> GattCharacteristic {
        GattCharacteristic {
            uuid: MOCK_COMMAND_CHARACTERISTIC,
            service_uuid: BLINDS_SERVICE,
            properties: CharPropFlags::WRITE,
            descriptors: Vec::new(),
        }
    }

    /// Refuse (or accept again) every `open`.
    pub fn set_refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    /// Reject `discover_services` calls.
    pub fn set_reject_discovery(&self, reject: bool) {
        self.reject_discovery.store(reject, Ordering::SeqCst);
    }

    /// Reject `read` calls.
    pub fn set_reject_reads(&self, reject: bool) {
        self.reject_reads.store(reject, Ordering::SeqCst);
    }

    /// Reject `write` calls.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Reject `enable_notifications` calls.
    pub fn set_reject_notifications(&self, reject: bool) {
        self.reject_notifications.store(reject, Ordering::SeqCst);
    }

    /// Reject `write_descriptor` calls.
    pub fn set_reject_descriptor_writes(&self, reject: bool) {
        self.reject_descriptor_writes.store(reject, Ordering::SeqCst);
    }

    /// Panic inside the next `count` calls to `open`.
    pub fn panic_on_open(&self, count: u32) {
        self.panics_remaining.store(count, Ordering::SeqCst);
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.state).calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Number of `open` calls for a device, refused ones included.
    pub fn open_count(&self, device: &DeviceId) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Open(d) if d == device))
            .count()
    }

    /// Handles handed out for a device, oldest first.
    pub fn handles(&self, device: &DeviceId) -> Vec<ConnectionHandle> {
        lock(&self.state)
            .handles
            .iter()
            .filter(|h| &h.device == device)
            .cloned()
            .collect()
    }

    /// The most recent handle handed out for a device.
    pub fn last_handle(&self, device: &DeviceId) -> Option<ConnectionHandle> {
        self.handles(device).pop()
    }

    /// Whether a handle has been opened and not closed.
    pub fn is_open(&self, handle: &ConnectionHandle) -> bool {
        lock(&self.state).open.contains(&handle.id)
    }

    /// Positions written to a device's characteristics, decoded.
    pub fn writes(&self, device: &DeviceId) -> Vec<u32> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(h, _, bytes) if &h.device == device => {
                    decode_position(Some(bytes.as_slice())).ok()
                }
                _ => None,
            })
            .collect()
    }

    /// Number of descriptor writes for a device.
    pub fn descriptor_write_count(&self, device: &DeviceId) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::WriteDescriptor(h, ..) if &h.device == device))
            .count()
    }

    fn listener(&self, handle: &ConnectionHandle) -> Option<Arc<dyn TransportEvents>> {
        lock(&self.state).listeners.get(&handle.id).cloned()
    }

    fn record(&self, call: TransportCall) {
        lock(&self.state).calls.push(call);
    }

    /// Report link-up for a handle.
    pub fn emit_connected(&self, handle: &ConnectionHandle) {
        if let Some(events) = self.listener(handle) {
            events.on_connected(handle);
        }
    }

    /// Report link loss for a handle.
    pub fn emit_disconnected(&self, handle: &ConnectionHandle) {
        if let Some(events) = self.listener(handle) {
            events.on_disconnected(handle);
        }
    }

    /// Report finished service discovery.
    pub fn emit_services(&self, handle: &ConnectionHandle, services: Vec<GattService>) {
        if let Some(events) = self.listener(handle) {
            events.on_services_discovered(handle, services);
        }
    }

    /// Push a notification from the position characteristic.
    pub fn emit_changed(&self, handle: &ConnectionHandle, value: Option<Vec<u8>>) {
        self.emit_changed_for(handle, &Self::position_characteristic(), value);
    }

    /// Push a notification from `characteristic`.
    pub fn emit_changed_for(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    ) {
        if let Some(events) = self.listener(handle) {
            events.on_characteristic_changed(handle, characteristic, value);
        }
    }

    /// Complete a read of the position characteristic.
    pub fn emit_read(&self, handle: &ConnectionHandle, value: Option<Vec<u8>>) {
        self.emit_read_for(handle, &Self::position_characteristic(), value);
    }

    /// Complete a read of `characteristic`.
    pub fn emit_read_for(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: Option<Vec<u8>>,
    ) {
        if let Some(events) = self.listener(handle) {
            events.on_characteristic_read(handle, characteristic, value);
        }
    }

    /// Complete a write to the command characteristic.
    pub fn emit_write(&self, handle: &ConnectionHandle, success: bool) {
        if let Some(events) = self.listener(handle) {
            events.on_characteristic_write(handle, &Self::command_characteristic(), success);
        }
    }

    /// Bring a device's latest connection up and through service discovery.
    pub fn complete_handshake(&self, device: &DeviceId) -> Option<ConnectionHandle> {
        let handle = self.last_handle(device)?;
        self.emit_connected(&handle);
        self.emit_services(&handle, Self::blinds_services());
        Some(handle)
    }

    /// Deliver an initial read of `position`.
    pub fn emit_position(&self, handle: &ConnectionHandle, position: u32) {
        self.emit_read(handle, Some(encode_position(position).to_vec()));
    }
}

impl Transport for MockTransport {
    fn open(&self, device: &DeviceId, events: Arc<dyn TransportEvents>) -> Result<ConnectionHandle> {
        self.record(TransportCall::Open(device.clone()));

        let panics = self.panics_remaining.load(Ordering::SeqCst);
        if panics > 0 {
            self.panics_remaining.store(panics - 1, Ordering::SeqCst);
            panic!("injected open panic for {}", device);
        }
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(Error::open_refused(device, "mock refusal"));
        }

        let handle = ConnectionHandle::new(
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            device.clone(),
        );
        let mut state = lock(&self.state);
        state.handles.push(handle.clone());
        state.listeners.insert(handle.id, events);
        state.open.insert(handle.id);
        Ok(handle)
    }

    fn close(&self, handle: &ConnectionHandle) {
        let mut state = lock(&self.state);
        state.calls.push(TransportCall::Close(handle.clone()));
        state.open.remove(&handle.id);
    }

    fn discover_services(&self, handle: &ConnectionHandle) -> bool {
        self.record(TransportCall::DiscoverServices(handle.clone()));
        !self.reject_discovery.load(Ordering::SeqCst)
    }

    fn read(&self, handle: &ConnectionHandle, characteristic: &GattCharacteristic) -> bool {
        self.record(TransportCall::Read(handle.clone(), characteristic.uuid));
        !self.reject_reads.load(Ordering::SeqCst)
    }

    fn write(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        value: &[u8],
    ) -> bool {
        if self.reject_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.record(TransportCall::Write(
            handle.clone(),
            characteristic.uuid,
            value.to_vec(),
        ));
        true
    }

    fn enable_notifications(
        &self,
        handle: &ConnectionHandle,
        characteristic: &GattCharacteristic,
        enable: bool,
    ) -> bool {
        self.record(TransportCall::EnableNotifications(
            handle.clone(),
            characteristic.uuid,
            enable,
        ));
        !self.reject_notifications.load(Ordering::SeqCst)
    }

    fn write_descriptor(
        &self,
        handle: &ConnectionHandle,
        _characteristic: &GattCharacteristic,
        descriptor: &GattDescriptor,
        value: &[u8],
    ) -> bool {
        self.record(TransportCall::WriteDescriptor(
            handle.clone(),
            descriptor.uuid,
            value.to_vec(),
        ));
        !self.reject_descriptor_writes.load(Ordering::SeqCst)
    }
}

/// A [`DeviceDiscovery`] over a fixed, editable list.
#[derive(Debug, Default)]
pub struct MockDiscovery {
    devices: Mutex<Vec<DeviceId>>,
    disabled: AtomicBool,
}

impl MockDiscovery {
    /// Create discovery reporting `devices`.
    pub fn new(devices: Vec<DeviceId>) -> Self {
        Self {
            devices: Mutex::new(devices),
            disabled: AtomicBool::new(false),
        }
    }

    /// Start reporting another device.
    pub fn add(&self, device: DeviceId) {
        lock(&self.devices).push(device);
    }

    /// Pretend the adapter is switched off (or back on).
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }
}

impl DeviceDiscovery for MockDiscovery {
    fn candidates(&self) -> Vec<DeviceId> {
        lock(&self.devices).clone()
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

/// A sink call recorded by [`MockSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkNotice {
    /// `on_change(device, value)`.
    Changed(DeviceId, u32),
    /// `on_missing(device)`.
    Missing(DeviceId),
}

/// A [`NotificationSink`] that records every call.
#[derive(Debug, Default)]
pub struct MockSink {
    notices: Mutex<Vec<SinkNotice>>,
}

impl MockSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, oldest first.
    pub fn notices(&self) -> Vec<SinkNotice> {
        lock(&self.notices).clone()
    }

    /// Positions reported for a device.
    pub fn changes(&self, device: &DeviceId) -> Vec<u32> {
        lock(&self.notices)
            .iter()
            .filter_map(|n| match n {
                SinkNotice::Changed(d, v) if d == device => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Number of missing signals for a device.
    pub fn missing_count(&self, device: &DeviceId) -> usize {
        lock(&self.notices)
            .iter()
            .filter(|n| matches!(n, SinkNotice::Missing(d) if d == device))
            .count()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        lock(&self.notices).clear();
    }
}

impl NotificationSink for MockSink {
    fn on_change(&self, device: &DeviceId, value: u32) {
        lock(&self.notices).push(SinkNotice::Changed(device.clone(), value));
    }

    fn on_missing(&self, device: &DeviceId) {
        lock(&self.notices).push(SinkNotice::Missing(device.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEvents;

    impl TransportEvents for NullEvents {
        fn on_connected(&self, _: &ConnectionHandle) {}
        fn on_disconnected(&self, _: &ConnectionHandle) {}
        fn on_services_discovered(&self, _: &ConnectionHandle, _: Vec<GattService>) {}
        fn on_characteristic_changed(
            &self,
            _: &ConnectionHandle,
            _: &GattCharacteristic,
            _: Option<Vec<u8>>,
        ) {
        }
        fn on_characteristic_read(
            &self,
            _: &ConnectionHandle,
            _: &GattCharacteristic,
            _: Option<Vec<u8>>,
        ) {
        }
        fn on_characteristic_write(&self, _: &ConnectionHandle, _: &GattCharacteristic, _: bool) {}
    }

    fn device() -> DeviceId {
        DeviceId::new("03:80:E1:00:00:01")
    }

    #[test]
    fn test_mock_handles_are_unique() {
        let transport = MockTransport::new();
        let a = transport.open(&device(), Arc::new(NullEvents)).unwrap();
        let b = transport.open(&device(), Arc::new(NullEvents)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(transport.handles(&device()), vec![a.clone(), b.clone()]);
        assert!(transport.is_open(&a));

        transport.close(&a);
        assert!(!transport.is_open(&a));
        assert!(transport.is_open(&b));
    }

    #[test]
    fn test_mock_refuse_open() {
        let transport = MockTransport::new();
        transport.set_refuse_open(true);
        let result = transport.open(&device(), Arc::new(NullEvents));
        assert!(matches!(result, Err(Error::OpenRefused { .. })));
        assert_eq!(transport.open_count(&device()), 1);
        assert!(transport.handles(&device()).is_empty());
    }

    #[test]
    fn test_mock_rejected_write_is_not_logged() {
        let transport = MockTransport::new();
        let handle = transport.open(&device(), Arc::new(NullEvents)).unwrap();
        let characteristic = MockTransport::command_characteristic();

        transport.set_reject_writes(true);
        assert!(!transport.write(&handle, &characteristic, &encode_position(5)));
        transport.set_reject_writes(false);
        assert!(transport.write(&handle, &characteristic, &encode_position(6)));
        assert_eq!(transport.writes(&device()), vec![6]);
    }

    #[test]
    #[should_panic(expected = "injected open panic")]
    fn test_mock_panic_injection() {
        let transport = MockTransport::new();
        transport.panic_on_open(1);
        let _ = transport.open(&device(), Arc::new(NullEvents));
    }

    #[test]
    fn test_mock_discovery() {
        let discovery = MockDiscovery::default();
        assert!(discovery.candidates().is_empty());
        discovery.add(device());
        assert_eq!(discovery.candidates(), vec![device()]);
        assert!(!discovery.is_disabled());
        discovery.set_disabled(true);
        assert!(discovery.is_disabled());
    }

    #[test]
    fn test_mock_sink() {
        let sink = MockSink::new();
        sink.on_change(&device(), 25);
        sink.on_missing(&device());
        assert_eq!(sink.changes(&device()), vec![25]);
        assert_eq!(sink.missing_count(&device()), 1);
        sink.clear();
        assert!(sink.notices().is_empty());
    }
}
