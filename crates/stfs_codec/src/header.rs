//! Header metadata carried by every entry.

use serde::{Deserialize, Serialize};

/// Kind of filesystem object an entry describes.
///
/// Maps one-to-one to the tar typeflag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    Regular,
    /// Hard link to another entry.
    HardLink,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Directory.
    Directory,
    /// Named pipe.
    Fifo,
    /// Any other typeflag, kept verbatim.
    Other(u8),
}

impl EntryKind {
    /// Converts a tar typeflag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' | b'7' => Self::Regular,
            b'1' => Self::HardLink,
            b'2' => Self::Symlink,
            b'3' => Self::CharDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            other => Self::Other(other),
        }
    }

    /// Returns the tar typeflag byte.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::HardLink => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Other(byte) => *byte,
        }
    }

    /// Returns `true` for regular files, the only kind with content.
    #[must_use]
    pub const fn is_regular(&self) -> bool {
        matches!(self, Self::Regular)
    }

    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// Metadata of a filesystem object as stored in an entry header.
///
/// `size` is the physical payload size on the medium. When the content was
/// transformed, `uncompressed_size` holds its original size and
/// `signature` its base64 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Path of the object; directories end with `/`.
    pub name: String,
    /// Target of a link.
    pub link_name: String,
    /// Kind of object.
    pub kind: EntryKind,
    /// Payload size on the medium.
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Owner user id.
    pub uid: u64,
    /// Owner group id.
    pub gid: u64,
    /// Owner user name.
    pub user_name: String,
    /// Owner group name.
    pub group_name: String,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Access time, seconds since the epoch.
    pub atime: i64,
    /// Status change time, seconds since the epoch.
    pub ctime: i64,
    /// Device major number.
    pub dev_major: u32,
    /// Device minor number.
    pub dev_minor: u32,
    /// Content size before transformation.
    pub uncompressed_size: Option<u64>,
    /// Base64 signature of the content.
    pub signature: Option<String>,
}

impl EntryHeader {
    /// Creates a header with default metadata.
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            link_name: String::new(),
            kind,
            size: 0,
            mode: if kind.is_dir() { 0o755 } else { 0o644 },
            uid: 0,
            gid: 0,
            user_name: String::new(),
            group_name: String::new(),
            mtime: 0,
            atime: 0,
            ctime: 0,
            dev_major: 0,
            dev_minor: 0,
            uncompressed_size: None,
            signature: None,
        }
    }

    /// Size of the content as the user sees it.
    #[must_use]
    pub fn logical_size(&self) -> u64 {
        self.uncompressed_size.unwrap_or(self.size)
    }

    /// Returns a copy of this header under another name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}
