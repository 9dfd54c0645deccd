//! Sequential media driven through record-level control operations.
//!
//! A tape can only be positioned at record granularity. Reads and writes
//! move whole records, and write sessions are separated by file marks.
//! [`SequentialMedium`] buffers one record at a time so that the rest of
//! STFS can treat the tape as a byte stream addressed by [`LogPosition`].

#[cfg(target_os = "linux")]
mod mtio;
mod virtual_tape;

#[cfg(target_os = "linux")]
pub use mtio::MtioDrive;
pub use virtual_tape::VirtualTape;

use crate::error::{StorageError, StorageResult};
use crate::medium::{Medium, MediumKind, MediumSource};
use crate::position::{Geometry, LogPosition, BLOCK_SIZE};
use std::io::{self, Read, Write};
use tracing::debug;

/// Outcome of reading one record from a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRead {
    /// A record of the given length was read.
    Data(usize),
    /// A file mark was crossed; the head is now past it.
    FileMark,
    /// There is no more recorded data.
    EndOfData,
}

/// Control operations of a tape drive.
///
/// Record numbers count file marks, matching what drives report.
pub trait TapeDrive: Send {
    /// Reads the record under the head into `buf` and advances past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive fails.
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<RecordRead>;

    /// Writes one record at the head, discarding anything after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive fails.
    fn write_record(&mut self, record: &[u8]) -> io::Result<()>;

    /// Writes a file mark at the head.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive fails.
    fn write_file_mark(&mut self) -> io::Result<()>;

    /// Moves the head to the start of `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist.
    fn seek_to_record(&mut self, record: u64) -> io::Result<()>;

    /// Moves the head to the end of recorded data.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive fails.
    fn go_to_end(&mut self) -> io::Result<()>;

    /// Moves the head past the next file mark.
    ///
    /// # Errors
    ///
    /// Returns an error if no file mark follows the head.
    fn skip_to_next_file_mark(&mut self) -> io::Result<()>;

    /// Returns the record number under the head.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive cannot report its position.
    fn tell_record(&mut self) -> io::Result<u64>;

    /// Rewinds and unloads the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive fails.
    fn eject(&mut self) -> io::Result<()>;
}

/// A tape exposed as a [`Medium`].
///
/// One record is buffered for reading; writes are collected into whole
/// records before they reach the drive.
#[derive(Debug)]
pub struct SequentialMedium<D> {
    drive: D,
    geometry: Geometry,
    /// Record currently buffered for reading and its number.
    record: Vec<u8>,
    buffered: Option<u64>,
    read_pos: usize,
    /// Record number of the next read or write.
    head: u64,
    crossed_file_mark: bool,
    end_of_data: bool,
    pending: Vec<u8>,
    offset: u64,
}

impl<D: TapeDrive> SequentialMedium<D> {
    /// Wraps a drive whose head is at record 0.
    pub fn new(drive: D, geometry: Geometry) -> Self {
        Self {
            drive,
            geometry,
            record: Vec::new(),
            buffered: None,
            read_pos: 0,
            head: 0,
            crossed_file_mark: false,
            end_of_data: false,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Returns the underlying drive.
    pub fn drive(&self) -> &D {
        &self.drive
    }

    fn record_bytes(&self) -> usize {
        self.geometry.record_bytes() as usize
    }

    /// Forgets buffered state after the head moved to `record`.
    fn reset_at(&mut self, record: u64) {
        self.record.clear();
        self.buffered = None;
        self.read_pos = 0;
        self.head = record;
        self.crossed_file_mark = false;
        self.end_of_data = false;
        self.offset = record * self.geometry.record_bytes();
    }

    fn fill_record(&mut self) -> io::Result<()> {
        let record_bytes = self.record_bytes();
        self.record.resize(record_bytes, 0);
        self.read_pos = 0;
        match self.drive.read_record(&mut self.record)? {
            RecordRead::Data(n) => {
                self.record.truncate(n);
                self.buffered = Some(self.head);
                self.offset = self.head * self.geometry.record_bytes();
                self.head += 1;
            }
            RecordRead::FileMark => {
                self.record.clear();
                self.buffered = None;
                self.head += 1;
                self.crossed_file_mark = true;
            }
            RecordRead::EndOfData => {
                self.record.clear();
                self.buffered = None;
                self.end_of_data = true;
            }
        }
        Ok(())
    }

    fn write_pending_records(&mut self) -> io::Result<()> {
        let record_bytes = self.record_bytes();
        while self.pending.len() >= record_bytes {
            self.drive.write_record(&self.pending[..record_bytes])?;
            self.pending.drain(..record_bytes);
            self.head += 1;
        }
        Ok(())
    }

    /// Pads and writes a trailing partial record.
    fn pad_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let record_bytes = self.record_bytes();
        self.pending.resize(record_bytes, 0);
        self.write_pending_records()?;
        self.offset = self.head * self.geometry.record_bytes();
        Ok(())
    }
}

impl<D: TapeDrive> Read for SequentialMedium<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos >= self.record.len() {
            if self.crossed_file_mark || self.end_of_data {
                return Ok(0);
            }
            self.fill_record()?;
            if self.read_pos >= self.record.len() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.record.len() - self.read_pos);
        buf[..n].copy_from_slice(&self.record[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<D: TapeDrive> Write for SequentialMedium<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.buffered.is_some() {
            // The drive head sits after the buffered record; writing from
            // the middle of it is not possible on tape.
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot write into a record that was read",
            ));
        }
        self.pending.extend_from_slice(buf);
        self.write_pending_records()?;
        self.offset += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: TapeDrive> Medium for SequentialMedium<D> {
    fn kind(&self) -> MediumKind {
        MediumKind::Sequential
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn seek_to(&mut self, position: LogPosition) -> StorageResult<()> {
        self.pad_pending()?;
        let skip = (position.block * BLOCK_SIZE) as usize;

        // Stay inside the buffered record when possible.
        if self.buffered == Some(position.record) && skip <= self.record.len() {
            self.read_pos = skip;
            self.offset = self.geometry.offset_of(position);
            return Ok(());
        }

        self.drive.seek_to_record(position.record)?;
        self.reset_at(position.record);
        if skip > 0 {
            self.fill_record()?;
            if self.buffered != Some(position.record) || skip > self.record.len() {
                return Err(StorageError::InvalidPosition {
                    record: position.record,
                    block: position.block,
                });
            }
            self.read_pos = skip;
            self.offset = self.geometry.offset_of(position);
        }
        Ok(())
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.pending.clear();
        self.drive.seek_to_record(0)?;
        self.reset_at(0);
        Ok(())
    }

    fn seek_to_end(&mut self) -> StorageResult<u64> {
        self.pad_pending()?;
        self.drive.go_to_end()?;
        let record = self.drive.tell_record()?;
        self.reset_at(record);
        Ok(self.offset)
    }

    fn current_position(&mut self) -> StorageResult<LogPosition> {
        if self.buffered.is_none() && self.pending.is_empty() {
            let record = self.drive.tell_record()?;
            return Ok(LogPosition::new(record, 0));
        }
        Ok(self.geometry.position_at(self.offset))
    }

    fn resync_candidate(&mut self, failed: LogPosition) -> StorageResult<Option<LogPosition>> {
        if self.end_of_data {
            return Ok(None);
        }
        if !self.crossed_file_mark {
            if let Err(err) = self.drive.skip_to_next_file_mark() {
                debug!(%failed, error = %err, "no file mark after failed position");
                self.end_of_data = true;
                return Ok(None);
            }
        }
        let record = self.drive.tell_record()?;
        let candidate = LogPosition::new(record, 0);
        if candidate <= failed {
            // The drive did not move: a zero-length read at end of data
            // looks like a file mark on some drivers.
            debug!(%failed, record, "no progress past failed position");
            self.end_of_data = true;
            return Ok(None);
        }
        self.reset_at(record);
        debug!(%failed, record, "resuming after file mark");
        Ok(Some(candidate))
    }

    fn finish_session(&mut self, dirty: bool) -> StorageResult<()> {
        self.pad_pending()?;
        if dirty {
            self.drive.write_file_mark()?;
            self.head += 1;
            self.offset = self.head * self.geometry.record_bytes();
        }
        Ok(())
    }

    fn eject(&mut self) -> StorageResult<()> {
        self.pending.clear();
        self.drive.eject()?;
        self.reset_at(0);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

impl MediumSource for VirtualTape {
    fn open(&self) -> StorageResult<Box<dyn Medium>> {
        let mut drive = self.clone();
        drive.seek_to_record(0)?;
        Ok(Box::new(SequentialMedium::new(drive, self.geometry())))
    }

    fn describe(&self) -> String {
        format!("virtual tape ({} records)", self.len())
    }
}
