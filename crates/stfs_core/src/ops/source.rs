//! Host-side sources of entries to archive.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stfs_codec::{EntryHeader, EntryKind};

/// Content that can be read more than once.
///
/// Archiving reads content twice: once to measure its transformed size for
/// the header, once to write it.
pub trait ContentSource: Send + Sync {
    /// Opens a fresh reader over the content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be opened.
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

impl ContentSource for Vec<u8> {
    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(&self[..]))
    }
}

impl ContentSource for &'static [u8] {
    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(*self))
    }
}

/// A file on the host, opened on every read.
#[derive(Debug, Clone)]
pub struct HostFile {
    path: PathBuf,
}

impl HostFile {
    /// Creates a source for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for HostFile {
    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// One object to archive: its metadata and, for regular files, its content.
#[derive(Clone)]
pub struct SourceEntry {
    /// Metadata of the object. Sizes are filled in while archiving.
    pub header: EntryHeader,
    /// Content of a regular file.
    pub content: Option<Arc<dyn ContentSource>>,
}

impl SourceEntry {
    /// A regular file with the given content.
    pub fn file(name: impl Into<String>, content: impl ContentSource + 'static) -> Self {
        Self {
            header: EntryHeader::new(name, EntryKind::Regular),
            content: Some(Arc::new(content)),
        }
    }

    /// A directory. A trailing `/` is added to the name if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            header: EntryHeader::new(name, EntryKind::Directory),
            content: None,
        }
    }

    /// A symbolic link pointing at `target`.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut header = EntryHeader::new(name, EntryKind::Symlink);
        header.link_name = target.into();
        header.mode = 0o777;
        Self {
            header,
            content: None,
        }
    }

    /// Sets the permission bits.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.header.mode = mode;
        self
    }

    /// Sets the modification time.
    #[must_use]
    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.header.mtime = mtime;
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, uid: u64, gid: u64) -> Self {
        self.header.uid = uid;
        self.header.gid = gid;
        self
    }

    /// Describes the object at `path` under `name`.
    ///
    /// Symbolic links are not followed. On Unix, permissions, ownership,
    /// timestamps and device numbers are captured.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be inspected.
    pub fn from_path(name: impl Into<String>, path: &Path) -> CoreResult<Self> {
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();
        let name = name.into();

        let mut entry = if file_type.is_dir() {
            Self::directory(name)
        } else if file_type.is_symlink() {
            let target = fs::read_link(path)?;
            Self::symlink(name, target.to_string_lossy().into_owned())
        } else if file_type.is_file() {
            Self::file(name, HostFile::new(path))
        } else {
            Self {
                header: EntryHeader::new(name, special_kind(&file_type)),
                content: None,
            }
        };
        capture_metadata(&mut entry.header, &metadata);
        Ok(entry)
    }

    /// Describes the tree rooted at `root`, parents before children.
    ///
    /// The root itself is named `prefix`; everything below it is named by
    /// its path relative to `root`, joined to `prefix` with `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if any object cannot be inspected.
    pub fn collect_tree(root: &Path, prefix: &str) -> CoreResult<Vec<Self>> {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(CoreError::invalid_operation("tree prefix must not be empty"));
        }
        let mut entries = Vec::new();
        collect_into(root, prefix, &mut entries)?;
        Ok(entries)
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("header", &self.header)
            .field("content", &self.content.as_ref().map(|_| "..."))
            .finish()
    }
}

fn collect_into(path: &Path, name: &str, entries: &mut Vec<SourceEntry>) -> CoreResult<()> {
    let entry = SourceEntry::from_path(name, path)?;
    let is_dir = entry.header.kind.is_dir();
    entries.push(entry);
    if !is_dir {
        return Ok(());
    }

    let mut children = fs::read_dir(path)?
        .map(|child| child.map(|c| c.file_name()))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort();
    for child in children {
        let child_name = format!("{name}/{}", child.to_string_lossy());
        collect_into(&path.join(&child), &child_name, entries)?;
    }
    Ok(())
}

#[cfg(unix)]
fn special_kind(file_type: &fs::FileType) -> EntryKind {
    use std::os::unix::fs::FileTypeExt;
    if file_type.is_char_device() {
        EntryKind::CharDevice
    } else if file_type.is_block_device() {
        EntryKind::BlockDevice
    } else if file_type.is_fifo() {
        EntryKind::Fifo
    } else {
        EntryKind::Other(b'0')
    }
}

#[cfg(not(unix))]
fn special_kind(_file_type: &fs::FileType) -> EntryKind {
    EntryKind::Other(b'0')
}

#[cfg(unix)]
#[allow(clippy::cast_possible_truncation)]
fn capture_metadata(header: &mut EntryHeader, metadata: &fs::Metadata) {
    use std::os::unix::fs::MetadataExt;
    header.mode = metadata.mode() & 0o7777;
    header.uid = u64::from(metadata.uid());
    header.gid = u64::from(metadata.gid());
    header.mtime = metadata.mtime();
    header.atime = metadata.atime();
    header.ctime = metadata.ctime();
    if matches!(header.kind, EntryKind::CharDevice | EntryKind::BlockDevice) {
        // glibc encoding of dev_t
        let rdev = metadata.rdev();
        header.dev_major = (((rdev >> 32) & 0xffff_f000) | ((rdev >> 8) & 0x0000_0fff)) as u32;
        header.dev_minor = (((rdev >> 12) & 0xffff_ff00) | (rdev & 0x0000_00ff)) as u32;
    }
}

#[cfg(not(unix))]
fn capture_metadata(header: &mut EntryHeader, metadata: &fs::Metadata) {
    if let Ok(modified) = metadata.modified() {
        if let Ok(since) = modified.duration_since(std::time::UNIX_EPOCH) {
            header.mtime = i64::try_from(since.as_secs()).unwrap_or(i64::MAX);
        }
    }
    if metadata.permissions().readonly() {
        header.mode &= !0o222;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directory_names_end_with_slash() {
        assert_eq!(SourceEntry::directory("docs").header.name, "docs/");
        assert_eq!(SourceEntry::directory("docs/").header.name, "docs/");
    }

    #[test]
    fn content_can_be_read_twice() {
        let entry = SourceEntry::file("a", b"hello".to_vec());
        let content = entry.content.unwrap();
        for _ in 0..2 {
            let mut read = String::new();
            content.open().unwrap().read_to_string(&mut read).unwrap();
            assert_eq!(read, "hello");
        }
    }

    #[test]
    fn tree_lists_parents_first() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let entries = SourceEntry::collect_tree(dir.path(), "backup").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.header.name.as_str()).collect();
        assert_eq!(names, ["backup/", "backup/a.txt", "backup/sub/", "backup/sub/b.txt"]);
        assert!(entries[1].content.is_some());
        assert!(entries[2].content.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("target"), b"x").unwrap();
        std::os::unix::fs::symlink("target", dir.path().join("link")).unwrap();

        let entry = SourceEntry::from_path("link", &dir.path().join("link")).unwrap();
        assert_eq!(entry.header.kind, EntryKind::Symlink);
        assert_eq!(entry.header.link_name, "target");
        assert!(entry.content.is_none());
    }

    #[test]
    fn empty_prefix_rejected() {
        let dir = tempdir().unwrap();
        assert!(SourceEntry::collect_tree(dir.path(), "/").is_err());
    }
}
