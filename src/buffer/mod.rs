//! Active Buffer Module
//!
//! The single mutable tail segment of the log.
//!
//! ## Responsibilities
//! - Plaintext, uncompressed appends through a write-through buffer
//! - Track fill level, capacity and record count
//! - Seal into an immutable chunk (see `seal`)
//!
//! ## Lifecycle
//! ```text
//! Fresh(pos=0) ──append──► Filling ──overflow──► Sealing ──commit──► Fresh(start_pos')
//!                            ▲   │
//!                            └───┘ append
//! ```

mod seal;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CellarError, Result};
use crate::index::BufferMeta;

/// The mutable tail segment currently accepting appends
pub struct ActiveBuffer {
    /// File name inside the log folder
    file_name: String,
    /// Full path of the buffer file
    path: PathBuf,
    /// Capacity in bytes
    max_bytes: i64,
    /// Global position of the first byte
    start_pos: i64,

    /// Complete records written
    records: i64,
    /// Bytes written (fill level)
    pos: i64,

    /// Write-through buffer over the file; `None` once closed
    writer: Option<BufWriter<File>>,
}

impl ActiveBuffer {
    /// Open or create the buffer file described by `meta` and position it at `meta.pos`
    pub fn open(meta: &BufferMeta, folder: &Path) -> Result<Self> {
        if meta.file_name.is_empty() {
            return Err(CellarError::Config("empty buffer file name".to_string()));
        }

        let path = folder.join(&meta.file_name);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(CellarError::io_at("open buffer", &path))?;

        // An oversized record may have pushed the file past its capacity
        let len = meta.max_bytes.max(meta.pos) as u64;
        file.set_len(len)
            .map_err(CellarError::io_at("size buffer", &path))?;
        file.seek(SeekFrom::Start(meta.pos as u64))
            .map_err(CellarError::io_at("seek buffer", &path))?;

        debug!(file = %meta.file_name, pos = meta.pos, start_pos = meta.start_pos, "Opened buffer");

        Ok(Self {
            file_name: meta.file_name.clone(),
            path,
            max_bytes: meta.max_bytes,
            start_pos: meta.start_pos,
            records: meta.records,
            pos: meta.pos,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Snapshot of the state to persist in the index
    pub fn meta(&self) -> BufferMeta {
        BufferMeta {
            file_name: self.file_name.clone(),
            start_pos: self.start_pos,
            pos: self.pos,
            max_bytes: self.max_bytes,
            records: self.records,
        }
    }

    /// Whether `bytes` more bytes fit the capacity
    pub fn fits(&self, bytes: i64) -> bool {
        self.pos + bytes <= self.max_bytes
    }

    /// Append raw bytes. Capacity is not checked here; call `fits` first.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| closed(&self.path))?;
        writer
            .write_all(bytes)
            .map_err(|e| CellarError::io_at("write buffer", &self.path)(e))?;
        self.pos += bytes.len() as i64;
        Ok(())
    }

    /// Count one complete record (length prefix and payload written)
    pub fn end_record(&mut self) {
        self.records += 1;
    }

    /// Append a length prefix and its payload as one record.
    ///
    /// A failed write leaves `pos` and the record count at the last complete
    /// record: pending bytes are discarded and the file is rewound. If the
    /// rewind itself fails the buffer is closed.
    pub fn append_record(&mut self, header: &[u8], data: &[u8]) -> Result<()> {
        let mark = self.pos;

        let written = match self.write_bytes(header) {
            Ok(()) => self.write_bytes(data),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.rewind(mark);
            return Err(e);
        }

        self.end_record();
        Ok(())
    }

    fn rewind(&mut self, mark: i64) {
        self.pos = mark;

        if let Some(writer) = self.writer.take() {
            let (mut file, _pending) = writer.into_parts();
            match file.seek(SeekFrom::Start(mark as u64)) {
                Ok(_) => {
                    debug!(file = %self.file_name, pos = mark, "Rewound buffer after failed write");
                    self.writer = Some(BufWriter::new(file));
                }
                Err(e) => {
                    warn!(file = %self.file_name, error = %e, "Can't rewind buffer, closing it");
                }
            }
        }
    }

    /// Push buffered writes to the file (no fsync)
    pub fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| closed(&self.path))?;
        writer
            .flush()
            .map_err(|e| CellarError::io_at("flush buffer", &self.path)(e))
    }

    /// Release the file handle; calling it again is a no-op
    pub fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .into_inner()
                .map_err(|e| CellarError::io_at("close buffer", &self.path)(e.into_error()))?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_pos(&self) -> i64 {
        self.start_pos
    }

    pub fn pos(&self) -> i64 {
        self.pos
    }

    pub fn max_bytes(&self) -> i64 {
        self.max_bytes
    }

    pub fn records(&self) -> i64 {
        self.records
    }

    /// Global position right after the last written byte
    pub fn end_pos(&self) -> i64 {
        self.start_pos + self.pos
    }
}

fn closed(path: &Path) -> CellarError {
    CellarError::Config(format!("buffer {} is closed", path.display()))
}

#[cfg(test)]
impl ActiveBuffer {
    /// Swap the underlying file handle, positioned at the append position.
    /// Returns the previous handle with pending writes flushed.
    pub(crate) fn replace_file(&mut self, mut file: File) -> File {
        file.seek(SeekFrom::Start(self.pos as u64)).unwrap();
        let old = self.writer.replace(BufWriter::new(file)).unwrap();
        old.into_inner().unwrap()
    }
}
