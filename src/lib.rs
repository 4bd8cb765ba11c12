//! # Cellar
//!
//! An embedded, append-only record log with:
//! - Cheap plaintext appends into a single active buffer
//! - Sealed chunks, compressed with LZ4 and encrypted with AES-CFB
//! - Crash-consistent sealing committed through a transactional index
//! - Byte-position addressing for exact resumption of scans
//! - Named user checkpoints and an external position index
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Writer                               │
//! │              append / checkpoint / seal                      │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐   seal   ┌─────────────────┐   commit   ┌─────────────┐
//!   │  Active Buffer  │ ───────► │ Cipher-Compress │ ─────────► │    Index    │
//!   │   (plaintext)   │          │      Chain      │            │   (redb)    │
//!   └────────┬────────┘          └────────┬────────┘            └──────┬──────┘
//!            │                            ▼                            │
//!            │                   ┌─────────────────┐                   │
//!            │                   │  Chunk files    │                   │
//!            │                   │  (immutable)    │                   │
//!            │                   └────────┬────────┘                   │
//!            └────────────┐               │              ┌─────────────┘
//!                         ▼               ▼              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Reader                               │
//! │              scan / scan_async (record replay)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod chain;
pub mod index;
pub mod buffer;
pub mod writer;
pub mod reader;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CellarError, Result};
pub use config::Config;
pub use index::{BufferMeta, ChunkMeta, LogStats};
pub use reader::{Reader, Record, ScanOptions, ScanStream, Snapshot};
pub use record::RecordInfo;
pub use writer::Writer;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Cellar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
