//! In-memory seekable container for testing.

use crate::error::{StorageError, StorageResult};
use crate::medium::{Medium, MediumKind, MediumSource};
use crate::position::{Geometry, LogPosition, BLOCK_SIZE};
use parking_lot::RwLock;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// An in-memory seekable container.
///
/// This container stores all bytes in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral filesystems that don't need persistence
///
/// Clones share the same bytes but keep their own cursor, the way two
/// handles to one file would.
///
/// # Example
///
/// ```rust
/// use std::io::{Read, Write};
/// use stfs_storage::{Geometry, InMemoryContainer, LogPosition, Medium};
///
/// let mut container = InMemoryContainer::new(Geometry::default());
/// container.write_all(&[7u8; 1024]).unwrap();
/// container.seek_to(LogPosition::new(0, 1)).unwrap();
/// let mut block = [0u8; 512];
/// container.read_exact(&mut block).unwrap();
/// assert_eq!(block, [7u8; 512]);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryContainer {
    data: Arc<RwLock<Vec<u8>>>,
    cursor: u64,
    geometry: Geometry,
}

impl InMemoryContainer {
    /// Creates a new empty container.
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self::with_data(geometry, Vec::new())
    }

    /// Creates a container with pre-existing bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(geometry: Geometry, data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            cursor: 0,
            geometry,
        }
    }

    /// Returns a copy of all bytes in the container.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns the number of bytes in the container.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    /// Returns `true` if the container holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Overwrites bytes starting at `offset`, growing the container if needed.
    ///
    /// Used by tests to simulate damage to an already written medium.
    pub fn patch(&self, offset: u64, bytes: &[u8]) {
        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
    }

    /// Truncates the container to `len` bytes.
    pub fn truncate(&self, len: u64) {
        self.data.write().truncate(len as usize);
    }
}

impl Read for InMemoryContainer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.read();
        let start = (self.cursor as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }
}

impl Write for InMemoryContainer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.write();
        let start = self.cursor as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.cursor = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Medium for InMemoryContainer {
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
        self.cursor = self.geometry.offset_of(position);
        Ok(())
    }

    fn rewind(&mut self) -> StorageResult<()> {
        // Overwriting starts a new medium; stale bytes past the new tail
        // must not be replayed.
        self.data.write().clear();
        self.cursor = 0;
        Ok(())
    }

    fn seek_to_end(&mut self) -> StorageResult<u64> {
        self.cursor = self.len();
        Ok(self.cursor)
    }

    fn current_position(&mut self) -> StorageResult<LogPosition> {
        Ok(self.geometry.position_at(self.cursor))
    }

    fn resync_candidate(&mut self, failed: LogPosition) -> StorageResult<Option<LogPosition>> {
        let next = self.geometry.offset_of(failed) + BLOCK_SIZE;
        if next >= self.len() {
            return Ok(None);
        }
        Ok(Some(self.geometry.position_at(next)))
    }

    fn finish_session(&mut self, _dirty: bool) -> StorageResult<()> {
        Ok(())
    }

    fn eject(&mut self) -> StorageResult<()> {
        Err(StorageError::unsupported("eject", MediumKind::Seekable))
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

impl MediumSource for InMemoryContainer {
    fn open(&self) -> StorageResult<Box<dyn Medium>> {
        Ok(Box::new(Self {
            data: Arc::clone(&self.data),
            cursor: 0,
            geometry: self.geometry,
        }))
    }

    fn describe(&self) -> String {
        format!("in-memory container ({} bytes)", self.len())
    }
}
