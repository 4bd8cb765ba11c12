//! Error types for Cellar
//!
//! Provides a unified error type for all log operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CellarError
pub type Result<T> = std::result::Result<T, CellarError>;

/// Unified error type for Cellar operations
#[derive(Debug, Error)]
pub enum CellarError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context} ({}): {source}", path.display())]
    IoAt {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cipher setup failed: {0}")]
    Crypto(String),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corruption in {}: {reason}", file.display())]
    Corruption { file: PathBuf, reason: String },

    #[error("Position {pos} is not a record boundary of the segment starting at {chunk_pos}")]
    UnalignedPosition { pos: i64, chunk_pos: i64 },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index error: {0}")]
    Index(#[from] redb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Scan Errors
    // -------------------------------------------------------------------------
    #[error("Scan callback failed at position {pos}: {source}")]
    Callback {
        pos: i64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Scan cancelled by consumer")]
    Cancelled,
}

impl CellarError {
    /// Attach the failing operation and path to an I/O error
    pub(crate) fn io_at(context: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CellarError::IoAt {
            context,
            path,
            source,
        }
    }

    pub(crate) fn corruption(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CellarError::Corruption {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports damaged on-disk data rather than an environment failure
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CellarError::Corruption { .. } | CellarError::UnalignedPosition { .. }
        )
    }
}

impl From<bincode::Error> for CellarError {
    fn from(e: bincode::Error) -> Self {
        CellarError::Serialization(e.to_string())
    }
}

// redb reports a distinct error type per call site; all of them fold into `redb::Error`
macro_rules! index_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CellarError {
                fn from(e: $ty) -> Self {
                    CellarError::Index(e.into())
                }
            }
        )*
    };
}

index_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
