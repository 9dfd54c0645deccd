//! Indexed metadata of one filesystem entry.

use serde::{Deserialize, Serialize};
use stfs_codec::records::{self, Records};
use stfs_codec::{EntryHeader, EntryKind};
use stfs_storage::LogPosition;

/// The indexed state of one name.
///
/// `size` is the logical size of the content. `position` points at the
/// entry whose payload holds the current content; it survives metadata-only
/// updates and renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Path of the entry; directories end with `/`.
    pub name: String,
    /// Target of a link.
    pub link_name: String,
    /// Kind of object.
    pub kind: EntryKind,
    /// Logical content size.
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
    /// Modification time.
    pub mtime: i64,
    /// Access time.
    pub atime: i64,
    /// Status change time.
    pub ctime: i64,
    /// Device major number.
    pub dev_major: u32,
    /// Device minor number.
    pub dev_minor: u32,
    /// Extended records of the entry that last touched this name.
    pub extended: Records,
    /// Position of the entry holding the current content.
    pub position: Option<LogPosition>,
    /// Position of the entry that deleted this name.
    pub last_known_position: Option<LogPosition>,
    /// Tombstone flag.
    pub deleted: bool,
    /// Format version of the entry.
    pub format_version: String,
}

impl MetadataRecord {
    /// Creates a live record from an entry written at `position`.
    #[must_use]
    pub fn live(header: &EntryHeader, extended: &Records, position: LogPosition) -> Self {
        Self {
            name: header.name.clone(),
            link_name: header.link_name.clone(),
            kind: header.kind,
            size: header.logical_size(),
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            user_name: header.user_name.clone(),
            group_name: header.group_name.clone(),
            mtime: header.mtime,
            atime: header.atime,
            ctime: header.ctime,
            dev_major: header.dev_major,
            dev_minor: header.dev_minor,
            extended: extended.clone(),
            position: Some(position),
            last_known_position: None,
            deleted: false,
            format_version: version_of(extended),
        }
    }

    /// Creates a tombstone for a name that was never indexed.
    #[must_use]
    pub fn tombstone(name: &str, position: LogPosition) -> Self {
        let kind = if name.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::Regular
        };
        let mut record = Self::live(&EntryHeader::new(name, kind), &Records::new(), position);
        record.position = None;
        record.last_known_position = Some(position);
        record.deleted = true;
        record
    }

    /// Returns a copy carrying the metadata of `header`.
    ///
    /// The name, position, size and content records are kept: a
    /// metadata-only update never moves content.
    #[must_use]
    pub fn with_metadata(&self, header: &EntryHeader, extended: &Records) -> Self {
        let mut merged = extended.clone();
        for key in [records::UNCOMPRESSED_SIZE, records::SIGNATURE] {
            merged.remove(key);
            if let Some(value) = self.extended.get(key) {
                merged.insert(key.to_string(), value.clone());
            }
        }
        Self {
            link_name: header.link_name.clone(),
            kind: header.kind,
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            user_name: header.user_name.clone(),
            group_name: header.group_name.clone(),
            mtime: header.mtime,
            atime: header.atime,
            ctime: header.ctime,
            dev_major: header.dev_major,
            dev_minor: header.dev_minor,
            format_version: version_of(&merged),
            extended: merged,
            ..self.clone()
        }
    }

    /// Returns `true` for directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Rebuilds an entry header from this record, for metadata-only updates.
    #[must_use]
    pub fn to_header(&self) -> EntryHeader {
        EntryHeader {
            name: self.name.clone(),
            link_name: self.link_name.clone(),
            kind: self.kind,
            size: 0,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            user_name: self.user_name.clone(),
            group_name: self.group_name.clone(),
            mtime: self.mtime,
            atime: self.atime,
            ctime: self.ctime,
            dev_major: self.dev_major,
            dev_minor: self.dev_minor,
            uncompressed_size: None,
            signature: None,
        }
    }

    /// The highest position this record accounts for.
    #[must_use]
    pub fn furthest_position(&self) -> Option<LogPosition> {
        self.position.max(self.last_known_position)
    }
}

fn version_of(extended: &Records) -> String {
    extended
        .get(records::VERSION)
        .cloned()
        .unwrap_or_else(|| records::FORMAT_VERSION.to_string())
}
