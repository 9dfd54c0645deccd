//! Error types for STFS core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in STFS core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Medium error.
    #[error("storage error: {0}")]
    Storage(#[from] stfs_storage::StorageError),

    /// Log entry format error.
    #[error("codec error: {0}")]
    Codec(#[from] stfs_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index snapshot could not be read or written.
    #[error("snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the write lock of the medium.
    #[error("medium locked: another process is writing to it")]
    MediumLocked,

    /// No live entry with this name.
    #[error("not found: {name}")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A signature did not match the signed bytes.
    #[error("integrity check failed: {message}")]
    IntegrityCheckFailed {
        /// What failed verification.
        message: String,
    },

    /// Content changed between measuring and writing it.
    #[error("source changed while archiving {name}: expected {expected} bytes, got {actual}")]
    SourceChanged {
        /// Name of the entry.
        name: String,
        /// Bytes measured before the header was written.
        expected: u64,
        /// Bytes produced while writing the payload.
        actual: u64,
    },

    /// The filesystem was closed while the operation was running.
    #[error("operation cancelled: the medium was closed")]
    Cancelled,

    /// Compression or decompression failed.
    #[error("compression error: {message}")]
    Compression {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Creates an integrity check failed error.
    pub fn integrity_check_failed(message: impl Into<String>) -> Self {
        Self::IntegrityCheckFailed {
            message: message.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl ToString) -> Self {
        Self::Compression {
            message: message.to_string(),
        }
    }

    /// Returns `true` if a well-formed entry could not be interpreted.
    ///
    /// Such errors abort replay at an expected position. Structural
    /// errors, medium errors and lookups are not format errors.
    #[must_use]
    pub fn is_format(&self) -> bool {
        match self {
            Self::Codec(err) => err.is_format(),
            Self::DecryptionFailed { .. } | Self::IntegrityCheckFailed { .. } => true,
            _ => false,
        }
    }

    /// Recovers a core error that travelled through an `io::Error`.
    ///
    /// Pipeline stages run behind `Read`/`Write` and can only report
    /// failures as I/O errors; they wrap the real cause, which this unwraps.
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<CoreError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(core) = inner.downcast::<CoreError>() {
                    return *core;
                }
            }
            return Self::invalid_operation("lost pipeline error");
        }
        Self::Io(err)
    }

    /// Wraps this error for transport through `Read`/`Write`.
    #[must_use]
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
