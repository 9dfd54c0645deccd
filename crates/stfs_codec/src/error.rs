//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding log entries.
///
/// Errors fall into two classes. Structural errors mean the bytes at a
/// position are not a tar header at all; readers may scan forward for the
/// next one. Format errors mean a well-formed header carries STFS records
/// this version does not understand; they are never skipped silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not a valid tar header block.
    #[error("malformed tar block: {message}")]
    Structure {
        /// Description of the structural error.
        message: String,
    },

    /// The entry was written by an unknown format version.
    #[error("unsupported format version: {version:?}")]
    UnsupportedVersion {
        /// The version found on the medium.
        version: String,
    },

    /// The entry carries an unknown action.
    #[error("unsupported action: {action:?}")]
    UnsupportedAction {
        /// The action found on the medium.
        action: String,
    },

    /// A required extended record is absent.
    #[error("missing extended record {key}")]
    MissingRecord {
        /// Key of the missing record.
        key: &'static str,
    },

    /// An extended record has a value that cannot be parsed.
    #[error("invalid value {value:?} for extended record {key}")]
    InvalidRecord {
        /// Key of the record.
        key: String,
        /// The value that failed to parse.
        value: String,
    },

    /// A header could not be serialized into tar blocks.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },
}

impl CodecError {
    /// Create a structural error.
    pub fn structure(message: impl ToString) -> Self {
        Self::Structure {
            message: message.to_string(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl ToString) -> Self {
        Self::EncodingFailed {
            message: message.to_string(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if the error means no tar header was found.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structure { .. })
    }

    /// Returns `true` if a valid header carried records that cannot be used.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVersion { .. }
                | Self::UnsupportedAction { .. }
                | Self::MissingRecord { .. }
                | Self::InvalidRecord { .. }
        )
    }
}
