//! File-backed seekable container and path-based medium source.

use crate::error::{StorageError, StorageResult};
use crate::medium::{Medium, MediumKind, MediumSource};
use crate::position::{Geometry, LogPosition, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A seekable container backed by a regular file.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use std::path::Path;
/// use stfs_storage::{FileContainer, Geometry, Medium};
///
/// let mut container = FileContainer::open(Path::new("archive.tar"), Geometry::default()).unwrap();
/// container.seek_to_end().unwrap();
/// container.write_all(&[0u8; 1024]).unwrap();
/// container.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileContainer {
    path: PathBuf,
    file: File,
    cursor: u64,
    geometry: Geometry,
}

impl FileContainer {
    /// Opens or creates a container file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path, geometry: Geometry) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            cursor: 0,
            geometry,
        })
    }

    /// Opens or creates a container file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path, geometry: Geometry) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, geometry)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl Read for FileContainer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.cursor += n as u64;
        Ok(n)
    }
}

impl Write for FileContainer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.cursor += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Medium for FileContainer {
    fn kind(&self) -> MediumKind {
        MediumKind::Seekable
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn offset(&self) -> u64 {
        self.cursor
    }

    fn seek_to(&mut self, position: LogPosition) -> StorageResult<()> {
        let offset = self.geometry.offset_of(position);
        self.cursor = self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.file.set_len(0)?;
        self.cursor = self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn seek_to_end(&mut self) -> StorageResult<u64> {
        self.cursor = self.file.seek(SeekFrom::End(0))?;
        Ok(self.cursor)
    }

    fn current_position(&mut self) -> StorageResult<LogPosition> {
        Ok(self.geometry.position_at(self.cursor))
    }

    fn resync_candidate(&mut self, failed: LogPosition) -> StorageResult<Option<LogPosition>> {
        let next = self.geometry.offset_of(failed) + BLOCK_SIZE;
        if next >= self.len()? {
            return Ok(None);
        }
        Ok(Some(self.geometry.position_at(next)))
    }

    fn finish_session(&mut self, _dirty: bool) -> StorageResult<()> {
        self.file.flush()?;
        Ok(())
    }

    fn eject(&mut self) -> StorageResult<()> {
        Err(StorageError::unsupported("eject", MediumKind::Seekable))
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Opens a medium from a filesystem path.
///
/// Character devices are driven as tapes; anything else is treated as a
/// seekable container file, created on first open.
#[derive(Debug, Clone)]
pub struct DrivePath {
    path: PathBuf,
    geometry: Geometry,
}

impl DrivePath {
    /// Creates a source for the medium at `path`.
    pub fn new(path: impl Into<PathBuf>, geometry: Geometry) -> Self {
        Self {
            path: path.into(),
            geometry,
        }
    }

    /// Returns the path of the medium.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(target_os = "linux")]
    fn open_tape(&self) -> StorageResult<Option<Box<dyn Medium>>> {
        use std::os::unix::fs::FileTypeExt;
        let is_tape = std::fs::metadata(&self.path)
            .map(|meta| meta.file_type().is_char_device())
            .unwrap_or(false);
        if !is_tape {
            return Ok(None);
        }
        let drive = crate::tape::MtioDrive::open(&self.path)?;
        Ok(Some(Box::new(crate::tape::SequentialMedium::new(
            drive,
            self.geometry,
        ))))
    }

    #[cfg(not(target_os = "linux"))]
    fn open_tape(&self) -> StorageResult<Option<Box<dyn Medium>>> {
        Ok(None)
    }
}

impl MediumSource for DrivePath {
    fn open(&self) -> StorageResult<Box<dyn Medium>> {
        if let Some(tape) = self.open_tape()? {
            return Ok(tape);
        }
        Ok(Box::new(FileContainer::open(&self.path, self.geometry)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
