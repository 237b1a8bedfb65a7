//! Connection engine for a fleet of BLE blinds controllers.
//!
//! This crate keeps a set of battery-powered blinds controllers connected,
//! pushes the latest requested position to each one, and reports the
//! positions they send back.
//!
//! # Features
//!
//! - **Fleet registry**: every discovered or addressed device, with one
//!   connection attempt at a time
//! - **Handshake**: connect, service discovery, notification setup, ready
//! - **Write coalescing**: only the most recent target per device is sent
//! - **Auto-reconnection**: a fixed-interval scheduler reopens dropped links
//! - **Missing-device signals**: unexpected link loss is reported once
//! - **Pluggable radio**: [`Transport`] and [`DeviceDiscovery`] seams with a
//!   btleplug implementation and a scripted mock
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use blinds_core::{
//!     BlindsController, BtleDiscovery, BtleTransport, EventDispatcher, spawn_reconnect_task,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = blinds_core::get_adapter().await?;
//!     let discovery = BtleDiscovery::start(adapter.clone(), blinds_types::BLINDS_ADDRESS_PREFIX).await?;
//!     let transport = BtleTransport::new(adapter).await?;
//!     let events = EventDispatcher::default();
//!     let mut rx = events.subscribe();
//!
//!     let controller = BlindsController::new(Arc::new(transport), Arc::new(discovery), Arc::new(events));
//!     controller.activate();
//!
//!     let cancel = CancellationToken::new();
//!     let scheduler = spawn_reconnect_task(controller.clone(), cancel.clone());
//!
//!     while let Ok(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     cancel.cancel();
//!     scheduler.await?;
//!     controller.passivate();
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod coalescer;
pub mod connection;
pub mod controller;
pub mod error;
pub mod events;
pub mod gatt;
pub mod mock;
pub mod reconnect;
pub mod scan;
pub mod traits;

pub use blinds_types::{BLINDS_ADDRESS_PREFIX, DeviceId, ParseError, Position};
pub use blinds_types::uuids;

pub use btle::BtleTransport;
pub use coalescer::{FlushOutcome, PendingWrite};
pub use connection::LinkState;
pub use controller::{BlindsController, ControllerConfig, DeviceStatus};
pub use error::{Error, Result};
pub use events::{BlindsEvent, EventDispatcher, EventReceiver, EventSender};
pub use gatt::{ConnectionHandle, GattCharacteristic, GattDescriptor, GattService};
pub use mock::{MockDiscovery, MockSink, MockTransport};
pub use reconnect::{DEFAULT_RECONNECT_INTERVAL, ReconnectOptions, spawn_reconnect_task};
pub use scan::{BtleDiscovery, get_adapter};
pub use traits::{DeviceDiscovery, NotificationSink, Transport, TransportEvents};
