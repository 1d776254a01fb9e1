//! Command bytes understood by the device.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SysEx command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    /// Hello; the response carries the ASCII firmware version.
    Hello = 0x01,
    /// Read one ADC channel.
    ReadAdc = 0x04,
    /// Erase stored settings back to firmware defaults.
    ResetSettings = 0x07,
    /// Load one chunk of the encoded settings.
    LoadSettingsChunk = 0x08,
    /// Save one chunk of the encoded settings.
    SaveSettingsChunk = 0x09,
    /// Get serial number and hardware revision.
    GetSerialNumber = 0x0F,
    /// Soft reset; no response.
    SoftReset = 0x11,
    /// Read the whole encoded settings in one exchange.
    ReadSettings = 0x18,
    /// Write the whole encoded settings in one exchange.
    WriteSettings = 0x19,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Hello),
            0x04 => Some(Self::ReadAdc),
            0x07 => Some(Self::ResetSettings),
            0x08 => Some(Self::LoadSettingsChunk),
            0x09 => Some(Self::SaveSettingsChunk),
            0x0F => Some(Self::GetSerialNumber),
            0x11 => Some(Self::SoftReset),
            0x18 => Some(Self::ReadSettings),
            0x19 => Some(Self::WriteSettings),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the device answers this command.
    pub fn expects_response(self) -> bool {
        !matches!(self, Self::SoftReset | Self::ResetSettings)
    }

    /// Whether the command carries a one-byte chunk index or channel.
    pub fn has_prefix(self) -> bool {
        matches!(
            self,
            Self::ReadAdc | Self::LoadSettingsChunk | Self::SaveSettingsChunk
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hello => "hello",
            Self::ReadAdc => "read-adc",
            Self::ResetSettings => "reset-settings",
            Self::LoadSettingsChunk => "load-settings-chunk",
            Self::SaveSettingsChunk => "save-settings-chunk",
            Self::GetSerialNumber => "get-serial-number",
            Self::SoftReset => "soft-reset",
            Self::ReadSettings => "read-settings",
            Self::WriteSettings => "write-settings",
        };
        write!(f, "{name} ({:#04x})", *self as u8)
    }
}
