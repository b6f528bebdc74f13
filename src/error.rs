//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O failure from the underlying file. Fatal for the session.
    #[error("I/O error during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The key is already present in the tree. Recoverable; the tree is
    /// left untouched.
    #[error("duplicate key {0}")]
    DuplicateKey(u32),

    /// Bad open mode, or opening a database file that does not exist
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// A page's content cannot be interpreted as a node
    #[error("page {page_id} is corrupt: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    /// The pager's addressable page ceiling was reached
    #[error("page limit {limit} exceeded")]
    CapacityExceeded { limit: u64 },

    /// Requested page id is outside the allocated range
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// Rejected engine configuration (row size, load caps)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A row buffer does not match the configured row size
    #[error("row is {got} bytes, expected {expected}")]
    RowSizeMismatch { expected: u32, got: usize },

    /// A row field exceeds its fixed column width
    #[error("{field} is {got} bytes (max: {max})")]
    FieldTooLong {
        field: &'static str,
        got: usize,
        max: usize,
    },
}

impl StorageError {
    /// Wrap an I/O error with the operation that caused it
    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }

    /// Create a corrupt-page error with a message
    pub fn corrupt(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Create an invalid-mode error
    pub fn invalid_mode(msg: impl Into<String>) -> Self {
        Self::InvalidMode(msg.into())
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
