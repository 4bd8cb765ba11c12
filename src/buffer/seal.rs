//! Buffer → chunk sealing
//!
//! Copies the plaintext buffer through the cipher-compression chain into a new
//! chunk file. Committing the chunk to the index and deleting the buffer file
//! are the writer's job; until then the buffer stays open and appendable, so a
//! failed seal or a failed commit leaves the pre-seal state intact.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::chain;
use crate::error::{CellarError, Result};
use crate::index::{chunk_file_name, ChunkMeta};

use super::{closed, ActiveBuffer};

/// Read size when streaming the buffer into the chain
const COPY_BLOCK_SIZE: usize = 64 * 1024;

impl ActiveBuffer {
    /// Encode the buffer contents into a chunk file next to it.
    ///
    /// 1. flush and fsync the buffer file
    /// 2. rewind it and create the chunk file
    /// 3. build the encode chain (the IV is written first)
    /// 4. copy exactly `pos` bytes through the chain, close it, fsync the chunk
    /// 5. describe the result
    pub fn seal(&mut self, key: &[u8], compression_level: u32) -> Result<ChunkMeta> {
        let writer = self.writer.as_mut().ok_or_else(|| closed(&self.path))?;
        writer
            .flush()
            .map_err(CellarError::io_at("flush buffer", &self.path))?;

        let file = writer.get_mut();
        file.sync_all()
            .map_err(CellarError::io_at("sync buffer", &self.path))?;

        let file_name = chunk_file_name(&self.file_name);
        let chunk_path = self.path.with_file_name(&file_name);

        let copied = copy_to_chunk(file, self.pos, &self.path, &chunk_path, key, compression_level);

        // Back to the append position, whether or not the copy went through
        file.seek(SeekFrom::Start(self.pos as u64))
            .map_err(CellarError::io_at("seek buffer", &self.path))?;

        let (checksum, compressed_disk_size) = copied?;

        debug!(
            chunk = %file_name,
            bytes = self.pos,
            compressed = compressed_disk_size,
            "Sealed buffer"
        );

        Ok(ChunkMeta {
            file_name,
            start_pos: self.start_pos,
            uncompressed_byte_size: self.pos,
            compressed_disk_size,
            records: self.records,
            checksum,
        })
    }
}

/// Stream `len` bytes from the start of `buffer` into a fresh chunk file.
///
/// Returns the CRC32 of the plaintext and the chunk file length.
fn copy_to_chunk(
    buffer: &mut File,
    len: i64,
    buffer_path: &Path,
    chunk_path: &Path,
    key: &[u8],
    compression_level: u32,
) -> Result<(u32, i64)> {
    buffer
        .seek(SeekFrom::Start(0))
        .map_err(CellarError::io_at("rewind buffer", buffer_path))?;

    let chunk = File::create(chunk_path).map_err(CellarError::io_at("create chunk", chunk_path))?;
    let mut chain = chain::encode(key, compression_level, BufWriter::new(chunk))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut block = vec![0u8; COPY_BLOCK_SIZE];
    let mut source = buffer.take(len as u64);
    let mut copied: i64 = 0;

    loop {
        let n = source
            .read(&mut block)
            .map_err(|e| CellarError::io_at("read buffer", buffer_path)(e))?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
        chain
            .write_all(&block[..n])
            .map_err(|e| CellarError::io_at("write chunk", chunk_path)(e))?;
        copied += n as i64;
    }

    if copied != len {
        return Err(CellarError::corruption(
            buffer_path,
            format!("buffer file holds {} of {} recorded bytes", copied, len),
        ));
    }

    let sink = chain::finish(chain)?;
    let chunk = sink
        .into_inner()
        .map_err(|e| CellarError::io_at("flush chunk", chunk_path)(e.into_error()))?;
    chunk
        .sync_all()
        .map_err(CellarError::io_at("sync chunk", chunk_path))?;
    let size = chunk
        .metadata()
        .map_err(CellarError::io_at("stat chunk", chunk_path))?
        .len();

    Ok((hasher.finalize(), size as i64))
}
