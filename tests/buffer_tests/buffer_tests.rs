//! Tests for the Active Buffer
//!
//! These tests verify:
//! - Raw writes and fill level tracking
//! - Reopening at a persisted position
//! - Sealing into a chunk that decodes back to the buffer contents
//! - The buffer stays usable after a seal

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use bytes::BytesMut;
use cellar::buffer::ActiveBuffer;
use cellar::chain;
use cellar::index::{BufferMeta, CHUNK_SUFFIX};
use cellar::record::encode_varint;
use cellar::CellarError;
use tempfile::TempDir;

const KEY: &[u8] = b"buffer test key!";

// =============================================================================
// Helper Functions
// =============================================================================

fn meta(name: &str, max_bytes: i64) -> BufferMeta {
    BufferMeta {
        file_name: name.to_string(),
        start_pos: 0,
        pos: 0,
        max_bytes,
        records: 0,
    }
}

fn append_record(buffer: &mut ActiveBuffer, payload: &[u8]) {
    let mut header = BytesMut::new();
    encode_varint(&mut header, payload.len() as i64);
    buffer.append_record(&header, payload).unwrap();
}

fn decode_chunk(path: &Path) -> Vec<u8> {
    let file = File::open(path).unwrap();
    let mut plain = Vec::new();
    chain::decode(KEY, file)
        .unwrap()
        .read_to_end(&mut plain)
        .unwrap();
    plain
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_writes_track_position() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("temp", 100_000), temp.path()).unwrap();

    assert!(temp.path().join("temp").exists());

    buffer.write_bytes(&[1]).unwrap();
    assert_eq!(buffer.pos(), 1);

    buffer.write_bytes(&[0u8; 10]).unwrap();
    assert_eq!(buffer.pos(), 11);

    buffer.flush().unwrap();
    assert_eq!(buffer.pos(), 11);

    buffer.write_bytes(&[0u8; 10]).unwrap();
    assert_eq!(buffer.pos(), 21);
    assert_eq!(buffer.records(), 0);
}

#[test]
fn test_file_preallocated_to_capacity() {
    let temp = TempDir::new().unwrap();
    let _buffer = ActiveBuffer::open(&meta("prealloc", 4096), temp.path()).unwrap();

    let len = fs::metadata(temp.path().join("prealloc")).unwrap().len();
    assert_eq!(len, 4096);
}

#[test]
fn test_fits_respects_capacity() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("fits", 20), temp.path()).unwrap();

    assert!(buffer.fits(20));
    assert!(!buffer.fits(21));

    buffer.write_bytes(&[0u8; 15]).unwrap();
    assert!(buffer.fits(5));
    assert!(!buffer.fits(6));
}

#[test]
fn test_meta_reflects_state() {
    let temp = TempDir::new().unwrap();
    let mut start = meta("000000000500", 1000);
    start.start_pos = 500;

    let mut buffer = ActiveBuffer::open(&start, temp.path()).unwrap();
    append_record(&mut buffer, b"abc");

    let m = buffer.meta();
    assert_eq!(m.file_name, "000000000500");
    assert_eq!(m.start_pos, 500);
    assert_eq!(m.pos, 4);
    assert_eq!(m.records, 1);
    assert_eq!(m.end_pos(), 504);
    assert_eq!(buffer.end_pos(), 504);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_continues_at_pos() {
    let temp = TempDir::new().unwrap();

    let mut buffer = ActiveBuffer::open(&meta("reopen", 1000), temp.path()).unwrap();
    append_record(&mut buffer, b"first");
    buffer.flush().unwrap();
    let persisted = buffer.meta();
    buffer.close().unwrap();

    let mut buffer = ActiveBuffer::open(&persisted, temp.path()).unwrap();
    append_record(&mut buffer, b"second");
    buffer.flush().unwrap();

    let raw = fs::read(temp.path().join("reopen")).unwrap();
    assert_eq!(&raw[1..6], b"first");
    assert_eq!(&raw[7..13], b"second");
    assert_eq!(buffer.records(), 2);
}

#[test]
fn test_reopen_keeps_oversized_contents() {
    let temp = TempDir::new().unwrap();

    let mut buffer = ActiveBuffer::open(&meta("big", 10), temp.path()).unwrap();
    append_record(&mut buffer, &[7u8; 40]);
    buffer.flush().unwrap();
    let persisted = buffer.meta();
    buffer.close().unwrap();

    let _buffer = ActiveBuffer::open(&persisted, temp.path()).unwrap();
    let raw = fs::read(temp.path().join("big")).unwrap();
    assert_eq!(raw.len(), 41);
    assert_eq!(&raw[1..], &[7u8; 40][..]);
}

#[test]
fn test_empty_file_name_rejected() {
    let temp = TempDir::new().unwrap();
    let err = ActiveBuffer::open(&meta("", 100), temp.path()).err().unwrap();
    assert!(matches!(err, CellarError::Config(_)));
}

#[test]
fn test_close_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("close", 100), temp.path()).unwrap();

    buffer.close().unwrap();
    buffer.close().unwrap();
    assert!(buffer.is_closed());
    assert!(buffer.write_bytes(b"late").is_err());
}

// =============================================================================
// Seal Tests
// =============================================================================

#[test]
fn test_seal_single_record() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("seal", 1000), temp.path()).unwrap();

    append_record(&mut buffer, &[0u8; 10]);
    let chunk = buffer.seal(KEY, 9).unwrap();

    assert_eq!(chunk.file_name, format!("seal{}", CHUNK_SUFFIX));
    assert_eq!(chunk.start_pos, 0);
    assert_eq!(chunk.uncompressed_byte_size, 11);
    assert_eq!(chunk.records, 1);
    assert_eq!(chunk.end_pos(), 11);

    let chunk_path = temp.path().join(&chunk.file_name);
    assert!(chunk_path.exists());
    assert_eq!(
        fs::metadata(&chunk_path).unwrap().len() as i64,
        chunk.compressed_disk_size
    );
}

#[test]
fn test_sealed_chunk_decodes_to_buffer_prefix() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("prefix", 10_000), temp.path()).unwrap();

    for i in 0..50u8 {
        append_record(&mut buffer, &[i; 33]);
    }
    let chunk = buffer.seal(KEY, 4).unwrap();

    let plain = decode_chunk(&temp.path().join(&chunk.file_name));
    assert_eq!(plain.len() as i64, chunk.uncompressed_byte_size);
    assert_eq!(plain.len(), 50 * 34);
    assert_eq!(crc32fast::hash(&plain), chunk.checksum);

    // Only the written prefix is sealed, not the preallocated tail
    let raw = fs::read(temp.path().join("prefix")).unwrap();
    assert_eq!(plain, &raw[..plain.len()]);
}

#[test]
fn test_buffer_appendable_after_seal() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("again", 1000), temp.path()).unwrap();

    append_record(&mut buffer, b"one");
    buffer.seal(KEY, 9).unwrap();
    assert_eq!(buffer.pos(), 4);

    append_record(&mut buffer, b"two");
    buffer.flush().unwrap();

    let raw = fs::read(temp.path().join("again")).unwrap();
    assert_eq!(&raw[..8], &[6, b'o', b'n', b'e', 6, b't', b'w', b'o']);
}

#[test]
fn test_seal_with_bad_key_keeps_buffer() {
    let temp = TempDir::new().unwrap();
    let mut buffer = ActiveBuffer::open(&meta("badkey", 1000), temp.path()).unwrap();

    append_record(&mut buffer, b"keep me");
    assert!(buffer.seal(b"short", 9).is_err());

    assert_eq!(buffer.pos(), 8);
    assert!(!buffer.is_closed());
    append_record(&mut buffer, b"more");
    assert_eq!(buffer.pos(), 13);
}
