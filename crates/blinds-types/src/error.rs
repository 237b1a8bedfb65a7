//! Error types for data parsing in blinds-types.

use thiserror::Error;

/// Errors that can occur when parsing identities or characteristic values.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in blinds-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The characteristic carried no value at all.
    #[error("Characteristic value is absent")]
    MissingValue,

    /// The characteristic value was too short to hold a position.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A device address could not be parsed.
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// A value was outside the accepted range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using blinds-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
