//! Metadata records stored in the index

use serde::{Deserialize, Serialize};

/// Persisted state of the active buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMeta {
    /// File name inside the log folder
    pub file_name: String,
    /// Global position of the buffer's first byte
    pub start_pos: i64,
    /// Bytes written so far
    pub pos: i64,
    /// Capacity in bytes
    pub max_bytes: i64,
    /// Complete records written so far
    pub records: i64,
}

impl BufferMeta {
    /// A new, empty buffer starting at `start_pos`, named after that position
    pub fn fresh(start_pos: i64, max_bytes: i64) -> Self {
        Self {
            file_name: buffer_file_name(start_pos),
            start_pos,
            pos: 0,
            max_bytes,
            records: 0,
        }
    }

    /// Global position right after the last written byte
    pub fn end_pos(&self) -> i64 {
        self.start_pos + self.pos
    }
}

/// A sealed, immutable chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// File name inside the log folder
    pub file_name: String,
    /// Global position of the chunk's first plaintext byte
    pub start_pos: i64,
    /// Length of the plaintext run
    pub uncompressed_byte_size: i64,
    /// Length of the chunk file (IV included)
    pub compressed_disk_size: i64,
    /// Records in the chunk
    pub records: i64,
    /// CRC32 of the plaintext run
    pub checksum: u32,
}

impl ChunkMeta {
    /// Global position right after the chunk's last plaintext byte
    pub fn end_pos(&self) -> i64 {
        self.start_pos + self.uncompressed_byte_size
    }
}

/// Aggregate statistics; advisory only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    pub max_key_size: i64,
    pub max_val_size: i64,
}

/// Suffix appended to a buffer file name when it is sealed into a chunk
pub const CHUNK_SUFFIX: &str = ".lz4";

/// Buffer files are named by their zero-padded start position
pub fn buffer_file_name(start_pos: i64) -> String {
    format!("{:012}", start_pos)
}

/// Chunk file sealed from the buffer file `buffer_name`
pub fn chunk_file_name(buffer_name: &str) -> String {
    format!("{}{}", buffer_name, CHUNK_SUFFIX)
}
