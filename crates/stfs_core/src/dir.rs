//! State directory management.
//!
//! A filesystem can keep host-side state next to its medium:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK              # Advisory lock held by the active writer
//! └─ INDEX.json        # Snapshot of the metadata index
//! ```
//!
//! The LOCK file keeps two processes from appending to the same medium.
//! Unlike the medium handle, the lock is only held for one write session.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const INDEX_FILE: &str = "INDEX.json";

/// Host directory for the write lock and the index snapshot.
#[derive(Debug, Clone)]
pub struct StateDir {
    path: PathBuf,
}

/// Exclusive write lock; released when dropped.
#[derive(Debug)]
pub struct SessionLock {
    _file: File,
}

impl StateDir {
    /// Opens a state directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is not a directory, or if
    /// it cannot be created.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "state path is not a directory: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the index snapshot.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE)
    }

    /// Takes the exclusive write lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MediumLocked`] if another handle holds it.
    pub fn lock(&self) -> CoreResult<SessionLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path.join(LOCK_FILE))?;

        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::MediumLocked);
        }
        Ok(SessionLock { _file: file })
    }
}

/// Replaces `path` with `data` so readers never see a partial file.
///
/// Writes a sibling temporary file, syncs it, renames it over `path` and
/// syncs the parent directory.
pub(crate) fn write_atomically(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        sync_directory(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> CoreResult<()> {
    // NTFS journals metadata; directories cannot be opened for sync.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state");

        let dir = StateDir::open(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.index_path(), path.join("INDEX.json"));
    }

    #[test]
    fn file_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("plain");
        fs::write(&path, b"x").unwrap();
        assert!(StateDir::open(&path).is_err());
    }

    #[test]
    fn lock_prevents_second_writer() {
        let temp = tempdir().unwrap();
        let dir = StateDir::open(temp.path()).unwrap();

        let _held = dir.lock().unwrap();
        let other = StateDir::open(temp.path()).unwrap();
        assert!(matches!(other.lock(), Err(CoreError::MediumLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let dir = StateDir::open(temp.path()).unwrap();
        drop(dir.lock().unwrap());
        let _again = dir.lock().unwrap();
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("INDEX.json");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp.path().join("INDEX.json.tmp").exists());
    }
}
