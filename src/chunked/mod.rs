//! Chunked settings transfer.
//!
//! An encoded settings buffer is split into numbered chunks; each chunk is
//! one full request/response exchange on a [`SysexChannel`].
//!
//! ```text
//!  encoded:  [ c0 ........ | c1 ........ | c2 ........ | c3 ... ]
//!  load N:   F0 77 08 N F7                 → F0 77 08 <chunk N> F7
//!  save N:   F0 77 09 N <chunk N> F7       → F0 77 09 F7
//! ```
//!
//! Later firmware moved to single-shot transfers (`0x18`/`0x19`) that carry
//! the whole encoded buffer in one exchange; [`TransferMode`] selects which.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::Request;
use crate::teeth;
use crate::transport::SysexChannel;

/// Chunk indices are sent as a single 7-bit byte.
pub const MAX_CHUNKS: usize = 128;

/// Chunk size used by current firmware.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// How settings move over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// One exchange per chunk.
    #[default]
    Chunked,
    /// One exchange for the whole buffer.
    SingleShot,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunked => write!(f, "chunked"),
            Self::SingleShot => write!(f, "single-shot"),
        }
    }
}

/// Split of a buffer of known length into fixed-size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_len: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plan `total_len` bytes in chunks of `chunk_size`.
    pub fn new(total_len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be non-zero".into()));
        }
        let plan = Self {
            total_len,
            chunk_size,
        };
        if plan.count() > MAX_CHUNKS {
            return Err(Error::InvalidConfig(format!(
                "{total_len} bytes in chunks of {chunk_size} needs {} chunks (max {MAX_CHUNKS})",
                plan.count()
            )));
        }
        Ok(plan)
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks, `ceil(total_len / chunk_size)`.
    pub fn count(&self) -> usize {
        self.total_len.div_ceil(self.chunk_size)
    }

    /// Byte range covered by chunk `index`.
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = (index * self.chunk_size).min(self.total_len);
        let end = (start + self.chunk_size).min(self.total_len);
        start..end
    }

    /// Expected length of chunk `index`; only the last may be short.
    pub fn chunk_len(&self, index: usize) -> usize {
        self.range(index).len()
    }

    /// Iterate `(index, bytes)` over `data`, which must be `total_len` long.
    pub fn split<'a>(&self, data: &'a [u8]) -> impl Iterator<Item = (u8, &'a [u8])> + 'a {
        let plan = *self;
        (0..plan.count()).map(move |i| (i as u8, &data[plan.range(i)]))
    }

    /// Start reassembling a buffer described by this plan.
    pub fn reassembler(&self) -> Reassembler {
        Reassembler {
            plan: *self,
            buf: Vec::with_capacity(self.total_len),
            next: 0,
        }
    }
}

/// Collects chunk payloads strictly in index order.
#[derive(Debug)]
pub struct Reassembler {
    plan: ChunkPlan,
    buf: Vec<u8>,
    next: usize,
}

impl Reassembler {
    /// Index of the next chunk expected.
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn is_complete(&self) -> bool {
        self.next == self.plan.count()
    }

    /// Append chunk `index`.
    pub fn push(&mut self, index: u8, payload: &[u8]) -> Result<()> {
        let index_usize = usize::from(index);
        if index_usize != self.next || self.is_complete() {
            return Err(ProtocolError::ChunkIndex {
                index: index_usize,
                count: self.plan.count(),
            }
            .into());
        }
        let expected = self.plan.chunk_len(index_usize);
        if payload.len() != expected {
            return Err(ProtocolError::ChunkLength {
                index,
                expected,
                got: payload.len(),
            }
            .into());
        }
        self.buf.extend_from_slice(payload);
        self.next += 1;
        Ok(())
    }

    /// Return the full buffer.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(ProtocolError::LengthMismatch {
                expected: self.plan.total_len,
                got: self.buf.len(),
            }
            .into());
        }
        Ok(self.buf)
    }
}

/// Transfer parameters for one load or save.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub mode: TransferMode,
    pub chunk_size: usize,
    pub timeout: Duration,
}

impl Transfer {
    /// Fetch `encoded_len` encoded bytes from the device.
    pub async fn load(&self, channel: &mut SysexChannel, encoded_len: usize) -> Result<Vec<u8>> {
        match self.mode {
            TransferMode::Chunked => {
                let plan = ChunkPlan::new(encoded_len, self.chunk_size)?;
                load_chunks(channel, &plan, self.timeout).await
            }
            TransferMode::SingleShot => {
                let response = channel
                    .transact(&Request::read_settings(), self.timeout)
                    .await?;
                if response.payload.len() != encoded_len {
                    return Err(ProtocolError::LengthMismatch {
                        expected: encoded_len,
                        got: response.payload.len(),
                    }
                    .into());
                }
                Ok(response.payload)
            }
        }
    }

    /// Send an encoded buffer to the device.
    ///
    /// The buffer is checked before anything is written, so a bad buffer
    /// never leaves a partial save behind.
    pub async fn save(&self, channel: &mut SysexChannel, encoded: &[u8]) -> Result<()> {
        if let Some(offset) = teeth::first_high_bit(encoded) {
            return Err(ProtocolError::NotSevenBitSafe {
                byte: encoded[offset],
                offset,
            }
            .into());
        }
        match self.mode {
            TransferMode::Chunked => {
                let plan = ChunkPlan::new(encoded.len(), self.chunk_size)?;
                save_chunks(channel, &plan, encoded, self.timeout).await
            }
            TransferMode::SingleShot => {
                channel
                    .transact(&Request::write_settings(encoded.to_vec()), self.timeout)
                    .await?;
                Ok(())
            }
        }
    }
}

/// Load every chunk of `plan` in order, one exchange each.
pub async fn load_chunks(
    channel: &mut SysexChannel,
    plan: &ChunkPlan,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut reassembler = plan.reassembler();
    while !reassembler.is_complete() {
        let index = reassembler.next_index() as u8;
        let response = channel.transact(&Request::load_chunk(index), timeout).await?;
        tracing::trace!(index, len = response.payload.len(), "Loaded chunk");
        reassembler.push(index, &response.payload)?;
    }
    reassembler.finish()
}

/// Save every chunk of `data` in order; each must be acknowledged.
pub async fn save_chunks(
    channel: &mut SysexChannel,
    plan: &ChunkPlan,
    data: &[u8],
    timeout: Duration,
) -> Result<()> {
    if data.len() != plan.total_len() {
        return Err(ProtocolError::LengthMismatch {
            expected: plan.total_len(),
            got: data.len(),
        }
        .into());
    }
    for (index, chunk) in plan.split(data) {
        channel
            .transact(&Request::save_chunk(index, chunk.to_vec()), timeout)
            .await?;
        tracing::trace!(index, len = chunk.len(), "Saved chunk");
    }
    Ok(())
}
