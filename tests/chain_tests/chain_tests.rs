//! Tests for the cipher-compression chain
//!
//! These tests verify:
//! - Chunk files never expose plaintext
//! - Round trip through a file for every key size
//! - Compression of repetitive input
//! - Truncated chunks fail to decode

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use cellar::chain;
use cellar::config::DEFAULT_COMPRESSION_LEVEL;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_chunk(path: &Path, key: &[u8], plain: &[u8]) {
    let file = File::create(path).unwrap();
    let mut chain = chain::encode(key, DEFAULT_COMPRESSION_LEVEL, BufWriter::new(file)).unwrap();
    chain.write_all(plain).unwrap();
    let sink = chain::finish(chain).unwrap();
    sink.into_inner().unwrap().sync_all().unwrap();
}

fn read_chunk(path: &Path, key: &[u8]) -> std::io::Result<Vec<u8>> {
    let file = File::open(path).unwrap();
    let mut decoder = chain::decode(key, BufReader::new(file)).unwrap();
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain)?;
    Ok(plain)
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_ciphertext_hides_plaintext() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("c.lz4");
    let plain = b"a perfectly readable sentence that should not show up".repeat(4);

    write_chunk(&path, &[9u8; 16], &plain);

    let raw = fs::read(&path).unwrap();
    let needle = b"readable";
    assert!(!raw.windows(needle.len()).any(|w| w == needle));
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_file_round_trip_all_key_sizes() {
    let temp = TempDir::new().unwrap();
    let plain = sample(200_000);

    for len in [16usize, 24, 32] {
        let key = vec![len as u8; len];
        let path = temp.path().join(format!("{}.lz4", len));

        write_chunk(&path, &key, &plain);
        assert_eq!(read_chunk(&path, &key).unwrap(), plain, "key of {} bytes", len);
    }
}

#[test]
fn test_empty_input_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("empty.lz4");
    let key = [1u8; 32];

    write_chunk(&path, &key, b"");
    assert!(read_chunk(&path, &key).unwrap().is_empty());
}

#[test]
fn test_repetitive_input_compresses() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zeros.lz4");
    let plain = vec![0u8; 1 << 20];

    write_chunk(&path, &[5u8; 16], &plain);

    let size = fs::metadata(&path).unwrap().len() as usize;
    assert!(size < plain.len() / 10, "chunk is {} bytes", size);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_truncated_chunk_fails_to_decode() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("t.lz4");
    let key = [7u8; 16];

    write_chunk(&path, &key, &sample(100_000));
    let raw = fs::read(&path).unwrap();
    fs::write(&path, &raw[..raw.len() / 2]).unwrap();

    let decoded = read_chunk(&path, &key);
    assert!(decoded.map(|p| p.len() != 100_000).unwrap_or(true));
}
