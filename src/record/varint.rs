//! Signed variable-length integers
//!
//! Record length prefixes are zig-zag encoded LEB128 values:
//! - 0 → 0, -1 → 1, 1 → 2, -2 → 3, ...
//! - 7 data bits per byte, high bit set on every byte but the last
//! - at most `MAX_VARINT_LEN` bytes for a 64-bit value

use bytes::BufMut;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Why a varint could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended before the final byte
    Truncated,
    /// Encoding is longer than a 64-bit value allows
    Overflow,
}

impl std::fmt::Display for VarintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarintError::Truncated => f.write_str("truncated varint"),
            VarintError::Overflow => f.write_str("varint overflows 64 bits"),
        }
    }
}

/// Encode a signed integer, returning the number of bytes written
pub fn encode_varint(buf: &mut impl BufMut, value: i64) -> usize {
    let mut unsigned = ((value << 1) ^ (value >> 63)) as u64;
    let mut written = 0;

    while unsigned >= 0x80 {
        buf.put_u8((unsigned as u8) | 0x80);
        unsigned >>= 7;
        written += 1;
    }
    buf.put_u8(unsigned as u8);

    written + 1
}

/// Number of bytes `encode_varint` produces for `value`
pub fn varint_len(value: i64) -> usize {
    let mut unsigned = ((value << 1) ^ (value >> 63)) as u64;
    let mut len = 1;
    while unsigned >= 0x80 {
        unsigned >>= 7;
        len += 1;
    }
    len
}

/// Decode a signed integer from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Result<(i64, usize), VarintError> {
    let mut unsigned: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(VarintError::Overflow);
        }
        if byte < 0x80 {
            // The tenth byte may only carry the single remaining bit
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(VarintError::Overflow);
            }
            unsigned |= (byte as u64) << shift;

            let value = (unsigned >> 1) as i64;
            let value = if unsigned & 1 != 0 { !value } else { value };
            return Ok((value, i + 1));
        }
        unsigned |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
    }

    if bytes.len() >= MAX_VARINT_LEN {
        Err(VarintError::Overflow)
    } else {
        Err(VarintError::Truncated)
    }
}
