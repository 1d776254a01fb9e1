//! Request and response envelopes.

use super::{
    is_data_byte, Command, MANUFACTURER_TAG, MIN_MESSAGE_SIZE, RESPONSE_PREFIX_LEN, SYSEX_END,
    SYSEX_START,
};
use crate::error::{ProtocolError, Result};
use crate::teeth;

/// An outgoing command message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command byte.
    pub command: Command,
    /// Chunk index or channel, for commands that take one.
    pub prefix: Option<u8>,
    /// Payload bytes, already 7-bit safe.
    pub payload: Vec<u8>,
}

impl Request {
    /// Create a request with no prefix or payload.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            prefix: None,
            payload: Vec::new(),
        }
    }

    pub fn hello() -> Self {
        Self::new(Command::Hello)
    }

    pub fn get_serial_number() -> Self {
        Self::new(Command::GetSerialNumber)
    }

    pub fn soft_reset() -> Self {
        Self::new(Command::SoftReset)
    }

    pub fn reset_settings() -> Self {
        Self::new(Command::ResetSettings)
    }

    pub fn read_adc(channel: u8) -> Self {
        Self {
            command: Command::ReadAdc,
            prefix: Some(channel),
            payload: Vec::new(),
        }
    }

    pub fn load_chunk(index: u8) -> Self {
        Self {
            command: Command::LoadSettingsChunk,
            prefix: Some(index),
            payload: Vec::new(),
        }
    }

    pub fn save_chunk(index: u8, payload: Vec<u8>) -> Self {
        Self {
            command: Command::SaveSettingsChunk,
            prefix: Some(index),
            payload,
        }
    }

    pub fn read_settings() -> Self {
        Self::new(Command::ReadSettings)
    }

    pub fn write_settings(encoded: Vec<u8>) -> Self {
        Self {
            command: Command::WriteSettings,
            prefix: None,
            payload: encoded,
        }
    }

    /// Total encoded size.
    pub fn size(&self) -> usize {
        MIN_MESSAGE_SIZE + usize::from(self.prefix.is_some()) + self.payload.len()
    }

    /// Encode to a complete SysEx message.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size());
        buf.push(SYSEX_START);
        buf.push(MANUFACTURER_TAG);
        buf.push(self.command.as_u8());
        if let Some(prefix) = self.prefix {
            buf.push(prefix);
        }
        buf.extend_from_slice(&self.payload);

        // Everything after the start marker must be a data byte.
        if let Some(offset) = buf.iter().skip(1).position(|b| !is_data_byte(*b)) {
            return Err(ProtocolError::NotSevenBitSafe {
                byte: buf[offset + 1],
                offset: offset + 1,
            }
            .into());
        }

        buf.push(SYSEX_END);
        Ok(buf)
    }

    /// Parse a request as the device would see it.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (command, body) = split_envelope(buf)?;
        let command = Command::from_u8(command).ok_or_else(|| {
            ProtocolError::MalformedResponse(format!("unknown command {command:#04x}"))
        })?;

        let (prefix, payload) = if command.has_prefix() {
            match body.split_first() {
                Some((first, rest)) => (Some(*first), rest.to_vec()),
                None => {
                    return Err(ProtocolError::MessageTooShort { len: buf.len() }.into());
                }
            }
        } else {
            (None, body.to_vec())
        };

        Ok(Self {
            command,
            prefix,
            payload,
        })
    }
}

/// A response received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echoed command byte.
    pub command: u8,
    /// Bytes between the echoed command and the end marker.
    pub payload: Vec<u8>,
}

impl Response {
    /// Build a response for `command` (used by peers and tests).
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self {
            command: command.as_u8(),
            payload,
        }
    }

    /// Parse a raw SysEx message.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (command, payload) = split_envelope(buf)?;
        Ok(Self {
            command,
            payload: payload.to_vec(),
        })
    }

    /// Parse and require the echoed command to match `expected`.
    pub fn decode_for(buf: &[u8], expected: Command) -> Result<Self> {
        let response = Self::decode(buf)?;
        if response.command != expected.as_u8() {
            return Err(ProtocolError::UnexpectedCommand {
                expected: expected.as_u8(),
                got: response.command,
            }
            .into());
        }
        Ok(response)
    }

    /// Encode to a complete SysEx message.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_MESSAGE_SIZE + self.payload.len());
        buf.extend_from_slice(&[SYSEX_START, MANUFACTURER_TAG, self.command]);
        buf.extend_from_slice(&self.payload);
        buf.push(SYSEX_END);
        buf
    }

    /// Teeth-decode the payload.
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        Ok(teeth::decode(&self.payload)?)
    }

    /// Payload as ASCII text.
    pub fn text(&self) -> Result<String> {
        if !self.payload.is_ascii() {
            return Err(ProtocolError::MalformedResponse("payload is not ASCII".into()).into());
        }
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }
}

/// Validate the envelope and return `(command, body)`.
fn split_envelope(buf: &[u8]) -> Result<(u8, &[u8])> {
    if buf.len() < MIN_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooShort { len: buf.len() }.into());
    }
    if buf[0] != SYSEX_START {
        return Err(ProtocolError::MissingStart { got: buf[0] }.into());
    }
    let last = buf[buf.len() - 1];
    if last != SYSEX_END {
        return Err(ProtocolError::MissingEnd { got: last }.into());
    }
    if buf[1] != MANUFACTURER_TAG {
        return Err(ProtocolError::UnexpectedManufacturer { got: buf[1] }.into());
    }
    Ok((buf[2], &buf[RESPONSE_PREFIX_LEN..buf.len() - 1]))
}
