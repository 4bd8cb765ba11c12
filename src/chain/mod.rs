//! Cipher-Compression Chain
//!
//! Streaming encode/decode pair used to seal and load chunks.
//!
//! ## Layering
//! ```text
//! encode:  plaintext ──► LZ4 frame encoder ──► AES-CFB ──► sink
//! decode:  source ──► AES-CFB ──► LZ4 frame decoder ──► plaintext
//! ```
//!
//! ## Chunk File Format
//! ```text
//! ┌──────────────┬───────────────────────────────────────┐
//! │ IV (16)      │ AES-CFB( LZ4 frame( plaintext run ) ) │
//! └──────────────┴───────────────────────────────────────┘
//! ```
//! The LZ4 frame is self-describing (header, block sizes, content checksum),
//! so decoding needs no external size hints.

mod cipher;

use std::io::{Read, Write};

use lz4::{ContentChecksum, Decoder, Encoder, EncoderBuilder};

use crate::error::Result;

pub use cipher::{DecryptReader, EncryptWriter, IV_LEN};

/// Writer side of the chain: compresses, then encrypts into `W`
pub type ChainWriter<W> = Encoder<EncryptWriter<W>>;

/// Reader side of the chain: decrypts `R`, then decompresses
pub type ChainReader<R> = Decoder<DecryptReader<R>>;

/// Build an encode chain over `sink`.
///
/// The IV is written to `sink` before this returns.
pub fn encode<W: Write>(key: &[u8], compression_level: u32, sink: W) -> Result<ChainWriter<W>> {
    let encryptor = EncryptWriter::new(key, sink)?;
    let encoder = EncoderBuilder::new()
        .level(compression_level)
        .checksum(ContentChecksum::ChecksumEnabled)
        .build(encryptor)?;
    Ok(encoder)
}

/// Close an encode chain, flushing the final compressed and encrypted tail,
/// and hand back the sink
pub fn finish<W: Write>(chain: ChainWriter<W>) -> Result<W> {
    let (encryptor, result) = chain.finish();
    result?;
    let mut sink = encryptor.into_inner();
    sink.flush()?;
    Ok(sink)
}

/// Build a decode chain over `source`, consuming the IV.
///
/// A damaged LZ4 frame surfaces as an I/O error from the first read.
pub fn decode<R: Read>(key: &[u8], source: R) -> Result<ChainReader<R>> {
    let decryptor = DecryptReader::new(key, source)?;
    let decoder = Decoder::new(decryptor)?;
    Ok(decoder)
}
