//! Core types used throughout gemsync.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProtocolError, Result};

/// Release date encoded at the front of a firmware version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FirmwareDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl FirmwareDate {
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Oldest firmware the settings protocol works with.
    pub const MINIMUM: Self = Self::new(2021, 6, 1);
}

impl FromStr for FirmwareDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfig(format!("invalid firmware date: {s:?}"));
        let mut parts = s.trim().split('.');
        let mut next = || parts.next().ok_or_else(invalid);
        let year: u16 = next()?.parse().map_err(|_| invalid())?;
        let month: u8 = next()?.parse().map_err(|_| invalid())?;
        let day: u8 = next()?.parse().map_err(|_| invalid())?;
        if parts.next().is_some() || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(invalid());
        }
        Ok(Self::new(year, month, day))
    }
}

impl TryFrom<String> for FirmwareDate {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FirmwareDate> for String {
    fn from(d: FirmwareDate) -> Self {
        d.to_string()
    }
}

impl fmt::Display for FirmwareDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}.{:02}.{:02}", self.year, self.month, self.day)
    }
}

/// Firmware version as reported by the hello command.
///
/// Format is `YYYY.MM.DD` optionally followed by a space and build details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub raw: String,
    pub date: Option<FirmwareDate>,
}

impl FirmwareVersion {
    /// Parse a version string; an unrecognized format keeps `date` empty.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let date = raw
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok());
        Self { raw, date }
    }

    /// Whether this firmware is at least `minimum`. Unparseable versions
    /// never are.
    pub fn is_at_least(&self, minimum: FirmwareDate) -> bool {
        self.date.is_some_and(|date| date >= minimum)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Device serial number (the MCU unique ID, hex encoded).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(pub String);

impl SerialNumber {
    /// Length of the raw unique ID.
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware revision of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HardwareRevision(pub u8);

impl HardwareRevision {
    /// Reported by boards whose firmware predates revision reporting.
    pub const DEFAULT: Self = Self(4);
}

impl Default for HardwareRevision {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for HardwareRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev{}", self.0)
    }
}

/// Parse the decoded get-serial-number payload.
///
/// The first 16 bytes are the unique ID; an optional 17th byte is the
/// hardware revision.
pub fn parse_serial_payload(decoded: &[u8]) -> Result<(SerialNumber, HardwareRevision)> {
    if decoded.len() < SerialNumber::LEN {
        return Err(ProtocolError::MalformedResponse(format!(
            "serial number has {} bytes, expected at least {}",
            decoded.len(),
            SerialNumber::LEN
        ))
        .into());
    }
    let serial = SerialNumber::from_bytes(&decoded[..SerialNumber::LEN]);
    let revision = decoded
        .get(SerialNumber::LEN)
        .map_or(HardwareRevision::DEFAULT, |r| HardwareRevision(*r));
    Ok((serial, revision))
}

/// Identity of a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub port: String,
    pub firmware: FirmwareVersion,
    pub serial: SerialNumber,
    pub revision: HardwareRevision,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (firmware {}, serial {}, {})",
            self.port, self.firmware, self.serial, self.revision
        )
    }
}

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    /// The channel failed; every further exchange is refused.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
