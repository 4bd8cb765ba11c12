//! Configuration for Cellar
//!
//! Centralized writer configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CellarError, Result};

/// Default LZ4 compression level used when sealing chunks.
///
/// Levels of 3 and above switch the encoder to high-compression mode.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// Default capacity of the active buffer (64 MB)
pub const DEFAULT_MAX_BUFFER_SIZE: i64 = 64 * 1024 * 1024;

/// Key lengths accepted by the chunk cipher (AES-128/192/256)
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Main configuration for a log writer
#[derive(Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all log files
    /// Internal structure:
    ///   {folder}/
    ///     ├── cellar.redb            (metadata index)
    ///     ├── 000000001000           (active buffer, plaintext)
    ///     └── 000000000000.lz4       (sealed chunks)
    pub folder: PathBuf,

    /// Capacity of the active buffer in bytes; a full buffer is sealed into a chunk
    pub max_buffer_size: i64,

    // -------------------------------------------------------------------------
    // Chunk Encoding Configuration
    // -------------------------------------------------------------------------
    /// Secret key for chunk encryption
    pub key: Vec<u8>,

    /// LZ4 compression level applied at seal time
    pub compression_level: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("folder", &self.folder)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("compression_level", &self.compression_level)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./cellar_data"),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            key: Vec::new(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the settings that must hold before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.folder.as_os_str().is_empty() {
            return Err(CellarError::Config("empty folder path".to_string()));
        }
        if self.max_buffer_size <= 0 {
            return Err(CellarError::Config(format!(
                "max buffer size must be positive, got {}",
                self.max_buffer_size
            )));
        }
        validate_key(&self.key)
    }
}

/// Reject keys the chunk cipher cannot be keyed with
pub fn validate_key(key: &[u8]) -> Result<()> {
    if VALID_KEY_LENGTHS.contains(&key.len()) {
        Ok(())
    } else {
        Err(CellarError::Config(format!(
            "key must be 16, 24 or 32 bytes, got {}",
            key.len()
        )))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log folder
    pub fn folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.folder = path.into();
        self
    }

    /// Set the active buffer capacity (in bytes)
    pub fn max_buffer_size(mut self, size: i64) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    /// Set the encryption key
    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.config.key = key.into();
        self
    }

    /// Set the LZ4 compression level used for sealing
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
