//! Core types for blinds controllers.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Address prefix shared by every blinds controller.
pub const BLINDS_ADDRESS_PREFIX: &str = "03:80:E1:00";

/// Stable identity of a physical peripheral: its link-layer address.
///
/// Addresses are normalised to upper case so that `03:80:e1:00:00:01` and
/// `03:80:E1:00:00:01` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct DeviceId(String);

impl DeviceId {
    /// Create an identity from an address string.
    ///
    /// Surrounding whitespace is trimmed and the address is upper-cased.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_uppercase())
    }

    /// The normalised address.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive prefix match against the address.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim();
        self.0.len() >= prefix.len()
            && self.0.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::InvalidAddress(s.to_string()));
        }
        let valid = trimmed
            .split(':')
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(ParseError::InvalidAddress(s.to_string()));
        }
        Ok(Self::new(trimmed))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Position presets offered to users.
///
/// The wire value is an opaque `u32`; these presets are just the steps a
/// front end offers. Nothing in the core requires a value to be one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Position {
    /// Fully open (100).
    Open,
    /// 75% open.
    ThreeQuarters,
    /// 50% open.
    Half,
    /// 25% open.
    Quarter,
    /// Closed (0).
    Closed,
}

impl Position {
    /// All presets, most open first.
    pub const ALL: [Position; 5] = [
        Position::Open,
        Position::ThreeQuarters,
        Position::Half,
        Position::Quarter,
        Position::Closed,
    ];

    /// The percentage written to the device.
    pub fn percent(self) -> u32 {
        match self {
            Position::Open => 100,
            Position::ThreeQuarters => 75,
            Position::Half => 50,
            Position::Quarter => 25,
            Position::Closed => 0,
        }
    }

    /// Map a percentage back to its preset, if it is one.
    pub fn from_percent(percent: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.percent() == percent)
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Position::Open => "100% Open",
            Position::ThreeQuarters => "75% Open",
            Position::Half => "50% Open",
            Position::Quarter => "25% Open",
            Position::Closed => "Close",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Position> for u32 {
    fn from(position: Position) -> Self {
        position.percent()
    }
}

impl TryFrom<u32> for Position {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Position::from_percent(value)
            .ok_or_else(|| ParseError::InvalidValue(format!("{} is not a position preset", value)))
    }
}
