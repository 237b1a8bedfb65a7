//! Error types for blinds-core.
//!
//! Very little in the engine surfaces as an `Error`: transport operations are
//! fire-and-forget and report acceptance as a `bool`, and every failure on
//! the radio side is absorbed by closing the device and letting the next
//! reconnection tick try again. What remains are setup problems (no adapter,
//! bad configuration) and the transport refusing to open a connection.
//!
//! | Error | Where it shows up | Recovery |
//! |-------|-------------------|----------|
//! | [`Error::Bluetooth`] | adapter setup, btleplug calls | retry setup |
//! | [`Error::AdapterUnavailable`] | adapter setup | enable Bluetooth |
//! | [`Error::OpenRefused`] | [`Transport::open`](crate::Transport::open) | next tick retries |
//! | [`Error::NotConnected`] | btleplug tasks on a closed handle | none needed |
//! | [`Error::InvalidConfig`] | [`ControllerConfig::validate`](crate::ControllerConfig::validate) | fix config |

use thiserror::Error;

use blinds_types::DeviceId;

/// Errors that can occur while managing blinds controllers.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter.
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    /// The transport would not start a connection attempt.
    #[error("Transport refused to open a connection to {device}: {reason}")]
    OpenRefused {
        /// The device that could not be opened.
        device: DeviceId,
        /// Why the transport refused.
        reason: String,
    },

    /// Operation attempted on a handle that is no longer live.
    #[error("Not connected to device")]
    NotConnected,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an open-refused error.
    pub fn open_refused(device: &DeviceId, reason: impl Into<String>) -> Self {
        Self::OpenRefused {
            device: device.clone(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using blinds-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let device = DeviceId::new("03:80:E1:00:00:01");
        let err = Error::open_refused(&device, "adapter busy");
        assert!(err.to_string().contains("03:80:E1:00:00:01"));
        assert!(err.to_string().contains("adapter busy"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::invalid_config("interval must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: interval must be > 0"
        );
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
