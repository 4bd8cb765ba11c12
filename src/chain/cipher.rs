//! AES-CFB stream adapters
//!
//! `EncryptWriter` and `DecryptReader` wrap a byte sink/source with AES in
//! CFB mode. The writer emits a fresh random IV in the clear before any
//! ciphertext; the reader consumes it before decrypting.

use std::io::{self, Read, Write};

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use rand::RngCore;

use crate::error::{CellarError, Result};

/// IV length: the AES block size
pub const IV_LEN: usize = 16;

enum Encryptor {
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

impl Encryptor {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let cipher = match key.len() {
            16 => BufEncryptor::<Aes128>::new_from_slices(key, iv).map(Encryptor::Aes128),
            24 => BufEncryptor::<Aes192>::new_from_slices(key, iv).map(Encryptor::Aes192),
            32 => BufEncryptor::<Aes256>::new_from_slices(key, iv).map(Encryptor::Aes256),
            n => return Err(CellarError::Crypto(format!("unsupported key length {}", n))),
        };
        cipher.map_err(|e| CellarError::Crypto(e.to_string()))
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Encryptor::Aes128(c) => c.encrypt(data),
            Encryptor::Aes192(c) => c.encrypt(data),
            Encryptor::Aes256(c) => c.encrypt(data),
        }
    }
}

enum Decryptor {
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

impl Decryptor {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let cipher = match key.len() {
            16 => BufDecryptor::<Aes128>::new_from_slices(key, iv).map(Decryptor::Aes128),
            24 => BufDecryptor::<Aes192>::new_from_slices(key, iv).map(Decryptor::Aes192),
            32 => BufDecryptor::<Aes256>::new_from_slices(key, iv).map(Decryptor::Aes256),
            n => return Err(CellarError::Crypto(format!("unsupported key length {}", n))),
        };
        cipher.map_err(|e| CellarError::Crypto(e.to_string()))
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Decryptor::Aes128(c) => c.decrypt(data),
            Decryptor::Aes192(c) => c.decrypt(data),
            Decryptor::Aes256(c) => c.decrypt(data),
        }
    }
}

/// Encrypts everything written through it
pub struct EncryptWriter<W: Write> {
    inner: W,
    cipher: Encryptor,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptWriter<W> {
    /// Generate an IV, write it to `inner`, and start the keystream
    pub fn new(key: &[u8], mut inner: W) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher = Encryptor::new(key, &iv)?;
        inner.write_all(&iv)?;

        Ok(Self {
            inner,
            cipher,
            scratch: Vec::new(),
        })
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The keystream has already advanced once encrypted, so all of it must land
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts everything read through it
pub struct DecryptReader<R: Read> {
    inner: R,
    cipher: Decryptor,
}

impl<R: Read> DecryptReader<R> {
    /// Consume the IV prefix of `inner` and start the keystream.
    ///
    /// A source shorter than the IV yields an `UnexpectedEof` I/O error.
    pub fn new(key: &[u8], mut inner: R) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        inner.read_exact(&mut iv)?;

        let cipher = Decryptor::new(key, &iv)?;
        Ok(Self { inner, cipher })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply(&mut buf[..n]);
        Ok(n)
    }
}
