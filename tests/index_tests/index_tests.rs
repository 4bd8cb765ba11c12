//! Tests for the metadata Index
//!
//! These tests verify:
//! - Buffer, chunk and statistics records round trip
//! - Chunks list in ascending start position
//! - User checkpoints and the position index
//! - Failed updates leave no trace
//! - Handles to one folder share a database

use cellar::index::{BufferMeta, ChunkMeta, Index, LogStats, INDEX_FILE};
use cellar::CellarError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_index() -> (TempDir, Index) {
    let temp_dir = TempDir::new().unwrap();
    let index = Index::open(temp_dir.path()).unwrap();
    (temp_dir, index)
}

fn chunk(start_pos: i64, size: i64) -> ChunkMeta {
    ChunkMeta {
        file_name: format!("{:012}.lz4", start_pos),
        start_pos,
        uncompressed_byte_size: size,
        compressed_disk_size: size / 2,
        records: size / 10,
        checksum: start_pos as u32,
    }
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_open_creates_index_file() {
    let (temp, index) = setup_temp_index();

    assert!(temp.path().join(INDEX_FILE).exists());
    assert!(index.path().ends_with(INDEX_FILE));
}

#[test]
fn test_empty_index() {
    let (_temp, index) = setup_temp_index();

    index
        .read(|tx| {
            assert_eq!(tx.get_buffer()?, None);
            assert_eq!(tx.get_stats()?, None);
            assert!(tx.list_chunks()?.is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_buffer_round_trip() {
    let (_temp, index) = setup_temp_index();
    let mut buffer = BufferMeta::fresh(1200, 4096);
    buffer.pos = 77;
    buffer.records = 3;

    index.update(|tx| tx.put_buffer(&buffer)).unwrap();

    let stored = index.read(|tx| tx.get_buffer()).unwrap();
    assert_eq!(stored, Some(buffer));
}

#[test]
fn test_stats_round_trip() {
    let (_temp, index) = setup_temp_index();
    let stats = LogStats {
        max_key_size: 0,
        max_val_size: 512,
    };

    index.update(|tx| tx.put_stats(&stats)).unwrap();
    assert_eq!(index.read(|tx| tx.get_stats()).unwrap(), Some(stats));
}

#[test]
fn test_chunks_listed_in_position_order() {
    let (_temp, index) = setup_temp_index();

    index
        .update(|tx| {
            tx.add_chunk(&chunk(70_000, 500))?;
            tx.add_chunk(&chunk(0, 300))?;
            tx.add_chunk(&chunk(300, 69_700))?;
            tx.put_buffer(&BufferMeta::fresh(70_500, 1000))
        })
        .unwrap();

    let chunks = index.read(|tx| tx.list_chunks()).unwrap();
    let starts: Vec<i64> = chunks.iter().map(|c| c.start_pos).collect();
    assert_eq!(starts, vec![0, 300, 70_000]);
    assert_eq!(chunks[1], chunk(300, 69_700));
}

// =============================================================================
// Checkpoint and Position Tests
// =============================================================================

#[test]
fn test_user_checkpoint_defaults_to_zero() {
    let (_temp, index) = setup_temp_index();
    assert_eq!(index.read(|tx| tx.get_user_checkpoint("nobody")).unwrap(), 0);
}

#[test]
fn test_user_checkpoints_are_independent() {
    let (_temp, index) = setup_temp_index();

    index
        .update(|tx| {
            tx.put_user_checkpoint("a", 42)?;
            tx.put_user_checkpoint("b", 1 << 40)
        })
        .unwrap();
    index.update(|tx| tx.put_user_checkpoint("a", 43)).unwrap();

    index
        .read(|tx| {
            assert_eq!(tx.get_user_checkpoint("a")?, 43);
            assert_eq!(tx.get_user_checkpoint("b")?, 1 << 40);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_position_index() {
    let (_temp, index) = setup_temp_index();

    index
        .update(|tx| {
            tx.index_position("orders", 1, 100)?;
            tx.index_position("orders", 2, 250)?;
            tx.index_position("order", 1, 999)
        })
        .unwrap();

    index
        .read(|tx| {
            assert_eq!(tx.lookup_position("orders", 1)?, Some(100));
            assert_eq!(tx.lookup_position("orders", 2)?, Some(250));
            assert_eq!(tx.lookup_position("order", 1)?, Some(999));
            assert_eq!(tx.lookup_position("orders", 3)?, None);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_positions_do_not_leak_into_chunk_list() {
    let (_temp, index) = setup_temp_index();

    index
        .update(|tx| {
            tx.add_chunk(&chunk(0, 10))?;
            tx.index_position("s", 0, 0)?;
            tx.put_user_checkpoint("c", 5)
        })
        .unwrap();

    assert_eq!(index.read(|tx| tx.list_chunks()).unwrap().len(), 1);
}

// =============================================================================
// Transaction Tests
// =============================================================================

#[test]
fn test_failed_update_is_rolled_back() {
    let (_temp, index) = setup_temp_index();

    let result: Result<(), CellarError> = index.update(|tx| {
        tx.put_user_checkpoint("ghost", 7)?;
        tx.add_chunk(&chunk(0, 10))?;
        Err(CellarError::Cancelled)
    });
    assert!(matches!(result, Err(CellarError::Cancelled)));

    index
        .read(|tx| {
            assert_eq!(tx.get_user_checkpoint("ghost")?, 0);
            assert!(tx.list_chunks()?.is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_handles_share_one_database() {
    let (temp, first) = setup_temp_index();
    let second = Index::open(temp.path()).unwrap();

    first.update(|tx| tx.put_user_checkpoint("shared", 9)).unwrap();
    assert_eq!(second.read(|tx| tx.get_user_checkpoint("shared")).unwrap(), 9);
}

#[test]
fn test_reopen_after_last_handle_dropped() {
    let temp = TempDir::new().unwrap();

    {
        let index = Index::open(temp.path()).unwrap();
        index.update(|tx| tx.put_user_checkpoint("durable", 11)).unwrap();
    }

    let index = Index::open(temp.path()).unwrap();
    assert_eq!(index.read(|tx| tx.get_user_checkpoint("durable")).unwrap(), 11);
}

#[test]
fn test_open_missing_folder_fails() {
    let temp = TempDir::new().unwrap();
    assert!(Index::open(&temp.path().join("missing")).is_err());
}
