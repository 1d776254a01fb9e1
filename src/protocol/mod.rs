//! SysEx wire protocol.
//!
//! Defines the message envelope, the command set and stream framing.
//!
//! ## Message Format
//!
//! ```text
//! ┌───────────┬─────────────┬─────────────┬──────────────┬─────────────┬─────────┐
//! │ Start (1) │ Manuf. (1)  │ Command (1) │ Prefix (0-1) │ Payload ... │ End (1) │
//! │   0xF0    │    0x77     │             │ chunk/chan.  │   7-bit     │  0xF7   │
//! └───────────┴─────────────┴─────────────┴──────────────┴─────────────┴─────────┘
//! ```
//!
//! Responses echo the start, manufacturer and command bytes; their payload
//! is everything between the echoed command and the end marker.

mod codec;
mod command;
mod message;

pub use codec::SysexCodec;
pub use command::Command;
pub use message::{Request, Response};

/// SysEx start marker.
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end marker.
pub const SYSEX_END: u8 = 0xF7;

/// Manufacturer/protocol tag following the start marker.
pub const MANUFACTURER_TAG: u8 = 0x77;

/// Bytes echoed at the front of every response.
pub const RESPONSE_PREFIX_LEN: usize = 3;

/// Smallest valid message: start, tag, command, end.
pub const MIN_MESSAGE_SIZE: usize = 4;

/// Default upper bound on a single framed message.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Check a byte is usable inside a SysEx body.
pub fn is_data_byte(byte: u8) -> bool {
    byte & 0x80 == 0
}
