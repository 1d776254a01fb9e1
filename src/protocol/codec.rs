//! SysEx framing over a raw MIDI byte stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE, SYSEX_END, SYSEX_START};
use crate::error::ProtocolError;

/// Tokio codec that carves complete SysEx messages out of a MIDI stream.
///
/// Bytes outside `F0 … F7` are discarded, real-time bytes are dropped
/// wherever they appear, and a new `F0` restarts the current message.
/// Items are whole messages including both markers.
pub struct SysexCodec {
    max_message_size: usize,
    message: Vec<u8>,
    in_message: bool,
}

impl SysexCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_message(MAX_MESSAGE_SIZE)
    }

    /// Create a codec with a custom max message size.
    pub fn with_max_message(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message: Vec::new(),
            in_message: false,
        }
    }

    fn abort(&mut self, reason: &'static str) {
        if self.in_message {
            tracing::trace!(len = self.message.len(), reason, "Discarding partial SysEx message");
        }
        self.message.clear();
        self.in_message = false;
    }
}

impl Default for SysexCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SysexCodec {
    type Item = Vec<u8>;
    type Error = crate::Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            match byte {
                SYSEX_START => {
                    self.abort("restarted");
                    self.message.push(byte);
                    self.in_message = true;
                }
                // Real-time messages may interleave with anything.
                0xF8..=0xFF => {}
                SYSEX_END if self.in_message => {
                    self.message.push(byte);
                    self.in_message = false;
                    return Ok(Some(std::mem::take(&mut self.message)));
                }
                // Any other status byte terminates a SysEx message.
                0x80..=0xF7 => self.abort("status byte"),
                _ if self.in_message => {
                    if self.message.len() + 1 >= self.max_message_size {
                        let size = self.message.len() + 1;
                        self.abort("too large");
                        return Err(ProtocolError::MessageTooLarge {
                            size,
                            max: self.max_message_size,
                        }
                        .into());
                    }
                    self.message.push(byte);
                }
                _ => {}
            }
        }

        Ok(None)
    }
}

impl Encoder<Vec<u8>> for SysexCodec {
    type Error = crate::Error;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        if item.len() < MIN_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooShort { len: item.len() }.into());
        }
        if item.len() > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: item.len(),
                max: self.max_message_size,
            }
            .into());
        }
        if item[0] != SYSEX_START {
            return Err(ProtocolError::MissingStart { got: item[0] }.into());
        }
        let last = item[item.len() - 1];
        if last != SYSEX_END {
            return Err(ProtocolError::MissingEnd { got: last }.into());
        }

        dst.reserve(item.len());
        dst.put_slice(&item);

        Ok(())
    }
}
