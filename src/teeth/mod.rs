//! Teeth: 7-bit-safe byte stuffing.
//!
//! Every 4 source bytes become a 5-byte group. The first byte of a group is a
//! header carrying the group length and the high bits of the data bytes;
//! the data bytes carry the low 7 bits of each source byte.
//!
//! ```text
//! ┌──────────────────────────────┬────────┬────────┬────────┬────────┐
//! │ 0 │ count (3) │ b0 b1 b2 b3  │ 0 d0   │ 0 d1   │ 0 d2   │ 0 d3   │
//! └──────────────────────────────┴────────┴────────┴────────┴────────┘
//! ```
//!
//! A trailing remainder of `k` (1..=3) source bytes produces a short group
//! of `k + 1` bytes. No padding is ever emitted.

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;

/// Source bytes carried by one full group.
pub const GROUP_DATA: usize = 4;

/// Encoded size of one full group.
pub const GROUP_SIZE: usize = GROUP_DATA + 1;

/// Exact encoded length for `src_len` source bytes.
pub const fn encoded_length(src_len: usize) -> usize {
    let full = src_len / GROUP_DATA;
    let rem = src_len % GROUP_DATA;
    full * GROUP_SIZE + if rem == 0 { 0 } else { rem + 1 }
}

/// Upper bound of the decoded length for `encoded_len` encoded bytes.
pub const fn max_decoded_length(encoded_len: usize) -> usize {
    let full = encoded_len / GROUP_SIZE;
    let rem = encoded_len % GROUP_SIZE;
    full * GROUP_DATA + if rem == 0 { 0 } else { rem - 1 }
}

/// Encode `src` into a fresh buffer.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(encoded_length(src.len()));
    encode_into(src, &mut dst);
    dst.to_vec()
}

/// Encode `src`, appending to `dst`.
pub fn encode_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_length(src.len()));

    for group in src.chunks(GROUP_DATA) {
        let mut header = (group.len() as u8) << 4;
        for (slot, byte) in group.iter().enumerate() {
            header |= (byte & 0x80) >> (4 + slot);
        }
        dst.put_u8(header);
        for byte in group {
            dst.put_u8(byte & 0x7f);
        }
    }
}

/// Decode `src`, rejecting malformed input.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut dst = Vec::with_capacity(max_decoded_length(src.len()));
    decode_into(src, &mut dst)?;
    Ok(dst)
}

/// Decode `src`, appending to `dst`.
///
/// On error `dst` holds the bytes of every well-formed group that preceded
/// the malformed one.
pub fn decode_into(src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut offset = 0;

    while offset < src.len() {
        let group_len = GROUP_SIZE.min(src.len() - offset);
        let group = &src[offset..offset + group_len];

        if let Some(pos) = first_high_bit(group) {
            return Err(CodecError::HighBitSet {
                offset: offset + pos,
                byte: group[pos],
            });
        }

        if group_len < 2 {
            return Err(CodecError::DanglingHeader { offset });
        }

        let header = group[0];
        let count = header >> 4;
        if count == 0 || count as usize > GROUP_DATA {
            return Err(CodecError::InvalidCount { offset, count });
        }

        let available = group_len - 1;
        if count as usize > available {
            return Err(CodecError::TruncatedGroup {
                offset,
                count,
                available,
            });
        }

        // Slots past `count` are ignored even when present.
        for slot in 0..count as usize {
            let high = (header << (4 + slot)) & 0x80;
            dst.push(high | group[1 + slot]);
        }

        offset += group_len;
    }

    Ok(())
}

/// Decode as much of `src` as possible.
///
/// Stops at the first malformed group and returns everything decoded before
/// it; never fails.
pub fn decode_lenient(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(max_decoded_length(src.len()));
    if let Err(e) = decode_into(src, &mut dst) {
        tracing::debug!(error = %e, decoded = dst.len(), "Teeth decode truncated");
    }
    dst
}

/// Offset of the first byte with the high bit set, if any.
pub fn first_high_bit(data: &[u8]) -> Option<usize> {
    data.iter().position(|b| b & 0x80 != 0)
}
