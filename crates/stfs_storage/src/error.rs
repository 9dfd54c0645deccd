//! Error types for medium operations.

use crate::medium::MediumKind;
use std::io;
use thiserror::Error;

/// Result type for medium operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during medium operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The medium does not support the requested control operation.
    #[error("{operation} is not supported on a {kind} medium")]
    Unsupported {
        /// The control operation that was requested.
        operation: &'static str,
        /// The kind of medium it was requested on.
        kind: MediumKind,
    },

    /// The record size is not usable.
    #[error("invalid geometry: record size must be at least one block, got {record_size}")]
    InvalidGeometry {
        /// The rejected record size in blocks.
        record_size: u64,
    },

    /// A position does not exist on the medium.
    #[error("position record {record}, block {block} is beyond the end of the medium")]
    InvalidPosition {
        /// Record index of the position.
        record: u64,
        /// Block index of the position.
        block: u64,
    },

    /// The medium has been ejected or closed.
    #[error("medium is closed")]
    Closed,
}

impl StorageError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: &'static str, kind: MediumKind) -> Self {
        Self::Unsupported { operation, kind }
    }
}
