//! Composite index keys
//!
//! All metadata shares one redb table; the first key byte selects the
//! logical table.

/// Sealed chunks, keyed by start position
pub const CHUNK_TABLE: u8 = 1;
/// External (stream, sequence) → position mappings
pub const POSITION_TABLE: u8 = 2;
/// The single active buffer record
pub const BUFFER_TABLE: u8 = 3;
/// Aggregate statistics
pub const STATS_TABLE: u8 = 4;
/// Named user checkpoints
pub const USER_CHECKPOINT_TABLE: u8 = 5;

/// Order-preserving encoding of a signed position
fn sortable(pos: i64) -> [u8; 8] {
    ((pos as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn chunk_key(start_pos: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(CHUNK_TABLE);
    key.extend_from_slice(&sortable(start_pos));
    key
}

pub fn chunk_prefix() -> [u8; 1] {
    [CHUNK_TABLE]
}

pub fn buffer_key() -> [u8; 1] {
    [BUFFER_TABLE]
}

pub fn stats_key() -> [u8; 1] {
    [STATS_TABLE]
}

pub fn position_key(stream: &str, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + stream.len() + 8);
    key.push(POSITION_TABLE);
    // Length prefix keeps ("ab", n) and ("a", ..) from colliding
    key.extend_from_slice(&(stream.len() as u32).to_be_bytes());
    key.extend_from_slice(stream.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

pub fn user_checkpoint_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(USER_CHECKPOINT_TABLE);
    key.extend_from_slice(name.as_bytes());
    key
}
