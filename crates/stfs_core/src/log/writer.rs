//! Session writer.

use crate::error::{CoreError, CoreResult};
use std::io::{self, Write};
use stfs_codec::{encode_header, padding_for, WireHeader, BLOCK_SIZE, END_OF_ARCHIVE};
use stfs_storage::{align_to_block, LogPosition, Medium, MediumKind};
use tracing::{debug, warn};

/// Where a write session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// After the existing content.
    Append,
    /// At the start of the medium, discarding everything on it.
    Overwrite,
}

/// Appends entries to a medium during one write session.
///
/// A session writes entry headers and payloads back to back and ends with
/// the end-of-archive trailer, if anything was written, and a session
/// boundary on the medium (a file mark on tape). Dropping an unfinished
/// writer performs the same cleanup on a best-effort basis, so an aborted
/// session never leaves the earlier tail unreadable.
pub struct LogWriter<'m> {
    medium: &'m mut dyn Medium,
    dirty: bool,
    finished: bool,
}

impl<'m> LogWriter<'m> {
    /// Starts a write session.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be positioned.
    pub fn begin(medium: &'m mut dyn Medium, mode: WriteMode) -> CoreResult<Self> {
        match mode {
            WriteMode::Overwrite => medium.rewind()?,
            WriteMode::Append => {
                let end = medium.seek_to_end()?;
                let aligned = align_to_block(end);
                if medium.kind() == MediumKind::Seekable && aligned > end {
                    // Foreign content may end mid-block.
                    let gap = usize::try_from(aligned - end)
                        .map_err(|_| CoreError::invalid_operation("alignment gap too large"))?;
                    medium.write_all(&vec![0u8; gap])?;
                }
            }
        }
        debug!(?mode, offset = medium.offset(), "write session started");
        Ok(Self {
            medium,
            dirty: false,
            finished: false,
        })
    }

    /// Returns the position the next entry will be written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report its position.
    pub fn position(&mut self) -> CoreResult<LogPosition> {
        Ok(self.medium.current_position()?)
    }

    /// Returns `true` once an entry was written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the header blocks of an entry.
    ///
    /// Returns the position of the entry. If the header announces a
    /// payload, write it through [`payload`](Self::payload) before the next
    /// header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be encoded or written.
    pub fn append_header(&mut self, wire: &WireHeader) -> CoreResult<LogPosition> {
        let bytes = encode_header(wire)?;
        let position = self.position()?;
        self.dirty = true;
        self.medium.write_all(&bytes)?;
        debug!(
            record = position.record,
            block = position.block,
            name = %wire.header.name,
            size = wire.header.size,
            "entry header written"
        );
        Ok(position)
    }

    /// Returns a writer for a payload of exactly `expected` bytes.
    pub fn payload(&mut self, expected: u64) -> PayloadWriter<'_> {
        PayloadWriter {
            medium: &mut *self.medium,
            expected,
            written: 0,
            excess: 0,
        }
    }

    /// Ends the session.
    ///
    /// Returns `true` if anything was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer or the session boundary cannot be
    /// written.
    pub fn finish(mut self) -> CoreResult<bool> {
        self.finished = true;
        self.close()
    }

    fn close(&mut self) -> CoreResult<bool> {
        if self.dirty {
            self.medium.write_all(&END_OF_ARCHIVE)?;
        }
        self.medium.finish_session(self.dirty)?;
        self.medium.sync()?;
        debug!(dirty = self.dirty, "write session finished");
        Ok(self.dirty)
    }
}

impl Drop for LogWriter<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close aborted write session");
        }
    }
}

/// Writes one payload and keeps the entry the size its header announced.
///
/// Bytes beyond the announced size are counted but dropped; a short payload
/// is filled with zeros. Both cases are reported by
/// [`finish`](Self::finish).
pub struct PayloadWriter<'w> {
    medium: &'w mut dyn Medium,
    expected: u64,
    written: u64,
    excess: u64,
}

impl PayloadWriter<'_> {
    /// Returns the number of payload bytes written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Fills and pads the payload to its block boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SourceChanged`] if the payload was not exactly
    /// the announced size; the entry on the medium is still well-formed.
    /// Returns medium errors as they are.
    pub fn finish(self, name: &str) -> CoreResult<()> {
        let actual = self.written + self.excess;
        let fill = self.expected - self.written + padding_for(self.expected);
        write_zeros(self.medium, fill)?;
        if actual != self.expected {
            return Err(CoreError::SourceChanged {
                name: name.to_string(),
                expected: self.expected,
                actual,
            });
        }
        Ok(())
    }
}

impl Write for PayloadWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = usize::try_from(self.expected - self.written).unwrap_or(usize::MAX);
        let take = room.min(buf.len());
        if take > 0 {
            self.medium.write_all(&buf[..take])?;
            self.written += take as u64;
        }
        self.excess += (buf.len() - take) as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.medium.flush()
    }
}

fn write_zeros(medium: &mut dyn Medium, mut count: u64) -> io::Result<()> {
    let zeros = [0u8; BLOCK_SIZE];
    while count > 0 {
        let n = count.min(BLOCK_SIZE as u64) as usize;
        medium.write_all(&zeros[..n])?;
        count -= n as u64;
    }
    Ok(())
}
