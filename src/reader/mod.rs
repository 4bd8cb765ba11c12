//! Reader Module
//!
//! Replays records from sealed chunks and the active buffer.
//!
//! ## Scan Flow
//! ```text
//! ┌──────────────┐  one read txn   ┌──────────────────────────────┐
//! │ Index        │ ──────────────► │ Snapshot { buffer, chunks }  │
//! └──────────────┘                 └──────────────┬───────────────┘
//!                                                 │ index released
//!            ┌────────────────────────────────────┴───────────┐
//!            ▼                                                ▼
//!   chunk file ──► decode chain ──► run ──┐        buffer file (plaintext) ──┐
//!                                         ▼                                  ▼
//!                                  record replay ──► callback(info, payload)
//! ```
//!
//! A reader never mutates the log. It can run next to a live writer: chunks
//! are immutable once committed, and the buffer is read only up to the
//! checkpointed `pos`.

mod async_scan;

use std::error::Error as StdError;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::chain;
use crate::config::validate_key;
use crate::error::{CellarError, Result};
use crate::index::{BufferMeta, ChunkMeta, Index, LogStats, INDEX_FILE};
use crate::record::{replay, RecordInfo};

pub use async_scan::{Record, ScanStream};

/// How many times a scan re-reads the index after the buffer it was about to
/// read got sealed away
pub const MAX_SNAPSHOT_RETRIES: usize = 3;

/// Range and flags of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// First position to deliver; must be a record boundary. 0 reads from the start.
    pub start_pos: i64,
    /// Skip segments starting after this position; 0 means unbounded
    pub end_pos: i64,
    /// Consider only the first N chunks; 0 means all. Buffer records sealed
    /// while the scan runs are still delivered.
    pub limit_chunks: usize,
    /// Replay the active buffer after the chunks
    pub include_buffer: bool,
    /// Log every chunk load at info level
    pub verbose_chunk_log: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            start_pos: 0,
            end_pos: 0,
            limit_chunks: 0,
            include_buffer: true,
            verbose_chunk_log: false,
        }
    }
}

impl ScanOptions {
    /// Whether a segment spanning `[start, end)` may hold records in range
    fn wants_segment(&self, start: i64, end: i64) -> bool {
        if self.start_pos != 0 && end < self.start_pos {
            return false;
        }
        if self.end_pos != 0 && start > self.end_pos {
            return false;
        }
        true
    }

    /// Offset inside a segment starting at `segment_start` where replay begins
    fn offset_in(&self, segment_start: i64) -> usize {
        self.start_pos.saturating_sub(segment_start).max(0) as usize
    }

    fn validate(&self) -> Result<()> {
        if self.start_pos < 0 {
            return Err(CellarError::Config(format!(
                "start_pos must not be negative, got {}",
                self.start_pos
            )));
        }
        if self.end_pos < 0 {
            return Err(CellarError::Config(format!(
                "end_pos must not be negative, got {}",
                self.end_pos
            )));
        }
        Ok(())
    }
}

/// Committed metadata, read in one transaction
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Active buffer; `None` for a folder no writer ever opened
    pub buffer: Option<BufferMeta>,
    /// Sealed chunks in ascending start position
    pub chunks: Vec<ChunkMeta>,
    /// Statistics as of the last checkpoint
    pub stats: Option<LogStats>,
}

/// Read-only view of a log folder
#[derive(Clone)]
pub struct Reader {
    folder: PathBuf,
    key: Vec<u8>,
    options: ScanOptions,
}

impl Reader {
    /// Create a reader with default options (whole log, buffer included)
    pub fn new(folder: impl Into<PathBuf>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            folder: folder.into(),
            key: key.into(),
            options: ScanOptions::default(),
        }
    }

    pub fn start_pos(mut self, pos: i64) -> Self {
        self.options.start_pos = pos;
        self
    }

    pub fn end_pos(mut self, pos: i64) -> Self {
        self.options.end_pos = pos;
        self
    }

    pub fn limit_chunks(mut self, limit: usize) -> Self {
        self.options.limit_chunks = limit;
        self
    }

    pub fn include_buffer(mut self, include: bool) -> Self {
        self.options.include_buffer = include;
        self
    }

    pub fn verbose_chunk_log(mut self, verbose: bool) -> Self {
        self.options.verbose_chunk_log = verbose;
        self
    }

    /// Replace all options at once
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Read buffer, chunk list and statistics in a single transaction.
    ///
    /// The index handle is released before this returns.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let Some(index) = self.open_index()? else {
            return Ok(Snapshot::default());
        };

        index.read(|tx| {
            Ok(Snapshot {
                buffer: tx.get_buffer()?,
                chunks: tx.list_chunks()?,
                stats: tx.get_stats()?,
            })
        })
    }

    /// Position stored under a user checkpoint name; unset names read as 0
    pub fn user_checkpoint(&self, name: &str) -> Result<i64> {
        match self.open_index()? {
            Some(index) => index.read(|tx| tx.get_user_checkpoint(name)),
            None => Ok(0),
        }
    }

    /// Open the folder's index; `None` if no writer ever created one
    fn open_index(&self) -> Result<Option<Index>> {
        if !self.folder.is_dir() {
            return Err(CellarError::Config(format!(
                "log folder not found: {}",
                self.folder.display()
            )));
        }

        // Never create an index on behalf of a reader
        if !self.folder.join(INDEX_FILE).exists() {
            return Ok(None);
        }

        Index::open(&self.folder).map(Some)
    }

    pub fn stats(&self) -> Result<LogStats> {
        Ok(self.snapshot()?.stats.unwrap_or_default())
    }

    pub fn chunks(&self) -> Result<Vec<ChunkMeta>> {
        Ok(self.snapshot()?.chunks)
    }

    pub fn buffer(&self) -> Result<Option<BufferMeta>> {
        Ok(self.snapshot()?.buffer)
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Replay every record in range, in position order.
    ///
    /// The first error returned by `op` stops the scan and comes back as
    /// `CellarError::Callback` carrying the record's start position.
    pub fn scan<F, E>(&self, mut op: F) -> Result<()>
    where
        F: FnMut(&RecordInfo, &[u8]) -> std::result::Result<(), E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.scan_records(|info, data| {
            op(info, &data).map_err(|e| CellarError::Callback {
                pos: info.start_pos,
                source: e.into(),
            })
        })
    }

    /// Scan handing out payloads as zero-copy slices of the decoded segment
    pub(crate) fn scan_records<F>(&self, mut op: F) -> Result<()>
    where
        F: FnMut(&RecordInfo, Bytes) -> Result<()>,
    {
        validate_key(&self.key)?;
        self.options.validate()?;

        let snapshot = self.snapshot()?;
        let options = &self.options;

        let mut chunks = snapshot.chunks;
        debug!(chunks = chunks.len(), limit = options.limit_chunks, "Found chunks");

        if options.limit_chunks > 0 && chunks.len() > options.limit_chunks {
            debug!(from = chunks.len(), to = options.limit_chunks, "Truncating chunk list");
            chunks.truncate(options.limit_chunks);
        }

        for (i, chunk) in chunks.iter().enumerate() {
            self.replay_chunk(i, chunk, &mut op)?;
        }

        if !options.include_buffer {
            return Ok(());
        }

        let mut buffer = snapshot.buffer;
        let mut retries = 0;

        while let Some(meta) = buffer.take() {
            if meta.pos == 0 || (options.end_pos != 0 && meta.start_pos > options.end_pos) {
                break;
            }

            let path = self.folder.join(&meta.file_name);
            if let Some(run) = load_buffer(&path, meta.pos)? {
                return replay(&run, meta.start_pos, options.offset_in(meta.start_pos), &path, &mut op);
            }

            // Sealed between our snapshot and the open: its records now live
            // in chunks starting at or after the old buffer start. These stand
            // in for the buffer, so `limit_chunks` does not apply to them.
            if retries == MAX_SNAPSHOT_RETRIES {
                return Err(CellarError::io_at("open buffer", path)(io::ErrorKind::NotFound.into()));
            }
            retries += 1;
            debug!(buffer = %meta.file_name, retry = retries, "Buffer sealed during scan");

            let fresh = self.snapshot()?;
            for (i, chunk) in fresh.chunks.iter().enumerate() {
                if chunk.start_pos >= meta.start_pos {
                    self.replay_chunk(i, chunk, &mut op)?;
                }
            }
            buffer = fresh.buffer;
        }

        Ok(())
    }

    fn replay_chunk<F>(&self, i: usize, chunk: &ChunkMeta, op: &mut F) -> Result<()>
    where
        F: FnMut(&RecordInfo, Bytes) -> Result<()>,
    {
        let options = &self.options;
        if !options.wants_segment(chunk.start_pos, chunk.end_pos()) {
            return Ok(());
        }

        if options.verbose_chunk_log {
            info!(chunk = i, file = %chunk.file_name, size = chunk.uncompressed_byte_size, "Loading chunk");
        } else {
            debug!(chunk = i, file = %chunk.file_name, size = chunk.uncompressed_byte_size, "Loading chunk");
        }

        let path = self.folder.join(&chunk.file_name);
        let run = load_chunk(&path, &self.key, chunk)?;
        replay(&run, chunk.start_pos, options.offset_in(chunk.start_pos), &path, op)
    }
}

/// Decode a chunk file into its plaintext run and verify it against `chunk`
fn load_chunk(path: &Path, key: &[u8], chunk: &ChunkMeta) -> Result<Bytes> {
    let size = usize::try_from(chunk.uncompressed_byte_size).map_err(|_| {
        CellarError::corruption(path, format!("bad chunk size {}", chunk.uncompressed_byte_size))
    })?;

    let file = File::open(path).map_err(CellarError::io_at("open chunk", path))?;
    let mut decoder = chain::decode(key, BufReader::new(file)).map_err(|e| match e {
        CellarError::Io(e) => decode_failure(path, e),
        other => other,
    })?;

    let mut run = vec![0u8; size];
    decoder
        .read_exact(&mut run)
        .map_err(|e| decode_failure(path, e))?;

    let mut trailing = [0u8; 1];
    if decoder.read(&mut trailing).map_err(|e| decode_failure(path, e))? != 0 {
        return Err(CellarError::corruption(
            path,
            format!("chunk decodes to more than {} bytes", size),
        ));
    }

    let checksum = crc32fast::hash(&run);
    if checksum != chunk.checksum {
        return Err(CellarError::corruption(
            path,
            format!("checksum {:08x}, expected {:08x}", checksum, chunk.checksum),
        ));
    }

    Ok(Bytes::from(run))
}

/// Read the first `pos` bytes of a buffer file; `None` if the file is gone
fn load_buffer(path: &Path, pos: i64) -> Result<Option<Bytes>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CellarError::io_at("open buffer", path)(e)),
    };

    let mut run = vec![0u8; pos as usize];
    file.read_exact(&mut run).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CellarError::corruption(path, format!("buffer file holds fewer than {} bytes", pos))
        } else {
            CellarError::io_at("read buffer", path)(e)
        }
    })?;

    Ok(Some(Bytes::from(run)))
}

/// Short reads and frame errors mean a damaged chunk; anything else is the environment
fn decode_failure(path: &Path, e: io::Error) -> CellarError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::Other => {
            CellarError::corruption(path, format!("can't decode chunk: {}", e))
        }
        _ => CellarError::io_at("read chunk", path)(e),
    }
}
