//! STFS extended record keys and values.

use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;
use std::fmt;

/// Extended records of one entry, keyed by record name.
pub type Records = BTreeMap<String, String>;

/// Prefix shared by every STFS record.
pub const PREFIX: &str = "STFS.";

/// Format version of the entry.
pub const VERSION: &str = "STFS.Version";
/// Action the entry performs.
pub const ACTION: &str = "STFS.Action";
/// Name the entry replaces.
pub const REPLACES_NAME: &str = "STFS.ReplacesName";
/// Whether an update carries new content.
pub const REPLACES_CONTENT: &str = "STFS.ReplacesContent";
/// Content size before compression and encryption.
pub const UNCOMPRESSED_SIZE: &str = "STFS.UncompressedSize";
/// Base64 signature of the content or of an embedded header.
pub const SIGNATURE: &str = "STFS.Signature";
/// Base64 sealed copy of the full header.
pub const EMBEDDED_HEADER: &str = "STFS.EmbeddedHeader";

/// The only format version this crate reads and writes.
pub const FORMAT_VERSION: &str = "1";

/// What an entry does to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// A new entry.
    Create,
    /// New metadata and possibly new content for an existing entry.
    Update,
    /// Removal of an entry.
    Delete,
}

impl Action {
    /// Returns the record value for this action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Parses a record value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedAction`] for unknown values.
    pub fn parse(value: &str) -> CodecResult<Self> {
        match value {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(CodecError::UnsupportedAction {
                action: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks the version record of an entry.
///
/// # Errors
///
/// Returns [`CodecError::MissingRecord`] or
/// [`CodecError::UnsupportedVersion`].
pub fn check_version(records: &Records) -> CodecResult<()> {
    match records.get(VERSION).map(String::as_str) {
        Some(FORMAT_VERSION) => Ok(()),
        Some(other) => Err(CodecError::UnsupportedVersion {
            version: other.to_string(),
        }),
        None => Err(CodecError::MissingRecord { key: VERSION }),
    }
}
