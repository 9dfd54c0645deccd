//! Cancellation of operations that hold the medium.
//!
//! A running operation keeps the medium handle for its whole duration.
//! Closing the filesystem raises a shared flag instead of waiting; the
//! handle checks it on every read, write and control operation and fails
//! once it is set.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stfs_storage::{Geometry, LogPosition, Medium, MediumKind, StorageError, StorageResult};

/// Shared flag raised by [`Filesystem::close`](crate::Filesystem::close).
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A medium handle that stops working once its flag is raised.
pub(crate) struct Cancellable {
    medium: Box<dyn Medium>,
    flag: CancelFlag,
}

impl Cancellable {
    pub(crate) fn new(medium: Box<dyn Medium>, flag: CancelFlag) -> Self {
        Self { medium, flag }
    }

    fn check(&self) -> StorageResult<()> {
        if self.flag.is_cancelled() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn check_io(&self) -> io::Result<()> {
        // Not `Interrupted`: `read_exact` and `write_all` retry on that.
        self.check()
            .map_err(|err| io::Error::new(io::ErrorKind::ConnectionAborted, err))
    }
}

impl Read for Cancellable {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_io()?;
        self.medium.read(buf)
    }
}

impl Write for Cancellable {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_io()?;
        self.medium.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_io()?;
        self.medium.flush()
    }
}

impl Medium for Cancellable {
    fn kind(&self) -> MediumKind {
        self.medium.kind()
    }

    fn geometry(&self) -> Geometry {
        self.medium.geometry()
    }

    fn offset(&self) -> u64 {
        self.medium.offset()
    }

    fn seek_to(&mut self, position: LogPosition) -> StorageResult<()> {
        self.check()?;
        self.medium.seek_to(position)
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.check()?;
        self.medium.rewind()
    }

    fn seek_to_end(&mut self) -> StorageResult<u64> {
        self.check()?;
        self.medium.seek_to_end()
    }

    fn current_position(&mut self) -> StorageResult<LogPosition> {
        self.check()?;
        self.medium.current_position()
    }

    fn resync_candidate(&mut self, failed: LogPosition) -> StorageResult<Option<LogPosition>> {
        self.check()?;
        self.medium.resync_candidate(failed)
    }

    fn finish_session(&mut self, dirty: bool) -> StorageResult<()> {
        self.check()?;
        self.medium.finish_session(dirty)
    }

    fn eject(&mut self) -> StorageResult<()> {
        self.check()?;
        self.medium.eject()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check()?;
        self.medium.sync()
    }
}
