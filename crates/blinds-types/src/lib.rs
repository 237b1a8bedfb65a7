//! Platform-agnostic types for BLE blinds controllers.
//!
//! This crate holds the pieces shared by the core connection engine and any
//! front end: device identities, the position presets offered to users, the
//! GATT UUID constants and the wire codec for position values.
//!
//! # Example
//!
//! ```
//! use blinds_types::{DeviceId, Position, codec};
//!
//! let id: DeviceId = "03:80:e1:00:34:12".parse().unwrap();
//! assert!(id.has_prefix(blinds_types::BLINDS_ADDRESS_PREFIX));
//!
//! let bytes = codec::encode_position(Position::Half.percent());
//! assert_eq!(codec::decode_position(Some(&bytes)).unwrap(), 50);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{BLINDS_ADDRESS_PREFIX, DeviceId, Position};
pub use self::uuid as uuids;
