//! Writer Module
//!
//! The single writer of a log folder.
//!
//! ## Responsibilities
//! - Own the active buffer and append length-prefixed records to it
//! - Seal the buffer into a chunk when the next record would not fit
//! - Persist buffer state and statistics on checkpoint
//! - Maintain user checkpoints and the position index
//!
//! ## Concurrency
//! One `Writer` per folder. Methods take `&mut self`; callers that append from
//! several threads serialize access themselves. Readers never need the writer.

use std::fs;
use std::path::Path;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::buffer::ActiveBuffer;
use crate::config::Config;
use crate::error::{CellarError, Result};
use crate::index::{BufferMeta, ChunkMeta, Index, LogStats};
use crate::record::{encode_varint, MAX_VARINT_LEN};

/// Appends records to a log folder
pub struct Writer {
    /// Writer configuration (folder, capacity, key, compression)
    config: Config,

    /// Metadata index shared with readers of the same folder
    index: Index,

    /// The mutable tail segment
    buffer: ActiveBuffer,

    /// Statistics persisted on checkpoint
    stats: LogStats,

    /// Reusable scratch for length prefixes
    encoding_buf: BytesMut,
}

impl Writer {
    /// Open or create a log.
    ///
    /// On startup:
    /// 1. Validate config and ensure the folder exists
    /// 2. Open the index
    /// 3. Reopen the persisted active buffer, or create one at position 0
    /// 4. Load statistics
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        ensure_folder(&config.folder)?;

        let index = Index::open(&config.folder)?;
        let folder = config.folder.clone();
        let max_buffer_size = config.max_buffer_size;

        let (buffer, stats) = index.update(|tx| {
            let buffer = match tx.get_buffer()? {
                Some(meta) => ActiveBuffer::open(&meta, &folder)?,
                None => {
                    let meta = BufferMeta::fresh(0, max_buffer_size);
                    let buffer = ActiveBuffer::open(&meta, &folder)?;
                    tx.put_buffer(&meta)?;
                    buffer
                }
            };
            let stats = tx.get_stats()?.unwrap_or_default();
            Ok((buffer, stats))
        })?;

        info!(
            folder = %config.folder.display(),
            pos = buffer.end_pos(),
            "Opened log writer"
        );

        Ok(Self {
            config,
            index,
            buffer,
            stats,
            encoding_buf: BytesMut::with_capacity(MAX_VARINT_LEN),
        })
    }

    /// Open with a folder, buffer capacity and key (convenience method)
    ///
    /// Uses the default compression level
    pub fn open_path(folder: &Path, max_buffer_size: i64, key: &[u8]) -> Result<Self> {
        Self::open(
            Config::builder()
                .folder(folder)
                .max_buffer_size(max_buffer_size)
                .key(key)
                .build(),
        )
    }

    /// Position right after the last appended byte, checkpointed or not
    pub fn volatile_pos(&self) -> i64 {
        self.buffer.end_pos()
    }

    /// Append one record and return the position right after it.
    ///
    /// Steps:
    /// 1. Encode the length prefix
    /// 2. Seal the buffer if the record does not fit
    /// 3. Write prefix and payload as one record
    /// 4. Update statistics
    pub fn append(&mut self, data: &[u8]) -> Result<i64> {
        let data_len = data.len() as i64;

        self.encoding_buf.clear();
        let header_len = encode_varint(&mut self.encoding_buf, data_len);
        let total = header_len as i64 + data_len;

        // A record larger than any buffer still gets one to itself
        if !self.buffer.fits(total) && self.buffer.pos() > 0 {
            self.seal()?;
        }

        // Either the whole record lands or the buffer stays at the previous one
        self.buffer.append_record(&self.encoding_buf, data)?;

        if data_len > self.stats.max_val_size {
            self.stats.max_val_size = data_len;
        }

        Ok(self.buffer.end_pos())
    }

    /// Seal the active buffer into a chunk and install a fresh buffer.
    ///
    /// The chunk and the new buffer are committed in one index transaction;
    /// the old buffer file is deleted only after that. Sealing an empty
    /// buffer is a no-op.
    pub fn seal(&mut self) -> Result<()> {
        if self.buffer.pos() == 0 {
            return Ok(());
        }

        let chunk = self
            .buffer
            .seal(&self.config.key, self.config.compression_level)?;

        let next = BufferMeta::fresh(chunk.end_pos(), self.config.max_buffer_size);
        let folder = &self.config.folder;

        let new_buffer = self.index.update(|tx| {
            tx.add_chunk(&chunk)?;
            let buffer = ActiveBuffer::open(&next, folder)?;
            tx.put_buffer(&next)?;
            Ok(buffer)
        })?;

        let mut old_buffer = std::mem::replace(&mut self.buffer, new_buffer);

        info!(
            chunk = %chunk.file_name,
            records = chunk.records,
            bytes = chunk.uncompressed_byte_size,
            compressed = chunk.compressed_disk_size,
            "Committed chunk"
        );

        // The chunk is durable; the old buffer is garbage from here on
        if let Err(e) = old_buffer.close() {
            warn!(buffer = %old_buffer.path().display(), error = %e, "Can't close old buffer");
        }
        if let Err(e) = fs::remove_file(old_buffer.path()) {
            warn!(buffer = %old_buffer.path().display(), error = %e, "Can't remove old buffer");
        }

        Ok(())
    }

    /// Make the buffered tail durable without sealing.
    ///
    /// Flushes the buffer, then persists its state and the statistics in one
    /// index transaction. Returns the checkpointed position.
    pub fn checkpoint(&mut self) -> Result<i64> {
        self.buffer.flush()?;

        let meta = self.buffer.meta();
        let stats = self.stats;

        self.index.update(|tx| {
            tx.put_buffer(&meta)?;
            tx.put_stats(&stats)
        })?;

        debug!(pos = meta.end_pos(), records = meta.records, "Checkpoint");
        Ok(meta.end_pos())
    }

    /// Persist a named position, independent of the buffer
    pub fn put_user_checkpoint(&self, name: &str, pos: i64) -> Result<()> {
        self.index.update(|tx| tx.put_user_checkpoint(name, pos))
    }

    /// Read a named position; unset names read as 0
    pub fn get_user_checkpoint(&self, name: &str) -> Result<i64> {
        self.index.read(|tx| tx.get_user_checkpoint(name))
    }

    /// Map `(stream, sequence)` to a log position
    pub fn index_position(&self, stream: &str, sequence: u64, pos: i64) -> Result<()> {
        self.index
            .update(|tx| tx.index_position(stream, sequence, pos))
    }

    /// Position recorded for `(stream, sequence)`, if any
    pub fn lookup_position(&self, stream: &str, sequence: u64) -> Result<Option<i64>> {
        self.index.read(|tx| tx.lookup_position(stream, sequence))
    }

    /// Release the buffer and the index.
    ///
    /// Does not checkpoint: data appended since the last checkpoint is only as
    /// durable as the buffer file.
    pub fn close(mut self) -> Result<()> {
        self.buffer.close()?;
        debug!(folder = %self.config.folder.display(), "Closed log writer");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// In-memory state of the active buffer
    pub fn buffer_meta(&self) -> BufferMeta {
        self.buffer.meta()
    }

    /// Committed chunks
    pub fn chunks(&self) -> Result<Vec<ChunkMeta>> {
        self.index.read(|tx| tx.list_chunks())
    }

    /// Statistics as of the last append
    pub fn stats(&self) -> LogStats {
        self.stats
    }

    /// Get the log folder
    pub fn folder(&self) -> &Path {
        &self.config.folder
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Create `folder` if missing; fail if the path is a file
fn ensure_folder(folder: &Path) -> Result<()> {
    match fs::metadata(folder) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CellarError::Config(format!(
            "path is a file: {}",
            folder.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(folder).map_err(CellarError::io_at("create log folder", folder))
        }
        Err(e) => Err(CellarError::io_at("stat log folder", folder)(e)),
    }
}
