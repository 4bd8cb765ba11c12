//! Record Module
//!
//! On-disk record encoding and the replay decoder shared by chunks and the
//! active buffer.
//!
//! ## Record Format
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ Len (varint, 1..=10) │ Payload (Len bytes)      │
//! └──────────────────────┴──────────────────────────┘
//! ```
//! A segment is the plain concatenation of records. Positions are byte
//! offsets in the global log, so a record spans `[start_pos, next_pos)`.

mod replay;
mod varint;

pub use replay::{replay, RecordInfo};
pub use varint::{decode_varint, encode_varint, varint_len, VarintError, MAX_VARINT_LEN};

/// Bytes a record with a payload of `payload_len` bytes occupies in a segment
pub fn encoded_len(payload_len: usize) -> usize {
    varint_len(payload_len as i64) + payload_len
}
