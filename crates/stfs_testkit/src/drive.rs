//! A tape drive that reports end of data like the Linux `st` driver.
//!
//! [`VirtualTape`] answers a read past the last frame with
//! [`RecordRead::EndOfData`]. A real drive returns a zero-length read
//! there, the same answer it gives for a file mark, and leaves the head
//! where it was. [`StTape`] forwards to a virtual tape and hides the
//! difference, so tests see what a reader of `/dev/nst0` sees.

use std::io;
use stfs_storage::{
    Medium, MediumSource, RecordRead, SequentialMedium, StorageResult, TapeDrive, VirtualTape,
};

/// A virtual tape seen through `st` read semantics.
#[derive(Debug, Clone)]
pub struct StTape {
    tape: VirtualTape,
}

impl StTape {
    /// Wraps `tape`. Clones share the tape and its head.
    pub fn new(tape: VirtualTape) -> Self {
        Self { tape }
    }

    /// Returns the tape underneath.
    pub fn tape(&self) -> &VirtualTape {
        &self.tape
    }
}

impl TapeDrive for StTape {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<RecordRead> {
        match self.tape.read_record(buf)? {
            RecordRead::EndOfData => Ok(RecordRead::FileMark),
            read => Ok(read),
        }
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.tape.write_record(record)
    }

    fn write_file_mark(&mut self) -> io::Result<()> {
        self.tape.write_file_mark()
    }

    fn seek_to_record(&mut self, record: u64) -> io::Result<()> {
        self.tape.seek_to_record(record)
    }

    fn go_to_end(&mut self) -> io::Result<()> {
        self.tape.go_to_end()
    }

    fn skip_to_next_file_mark(&mut self) -> io::Result<()> {
        self.tape.skip_to_next_file_mark()
    }

    fn tell_record(&mut self) -> io::Result<u64> {
        self.tape.tell_record()
    }

    fn eject(&mut self) -> io::Result<()> {
        self.tape.eject()
    }
}

impl MediumSource for StTape {
    fn open(&self) -> StorageResult<Box<dyn Medium>> {
        let mut drive = self.clone();
        drive.seek_to_record(0)?;
        Ok(Box::new(SequentialMedium::new(drive, self.tape.geometry())))
    }

    fn describe(&self) -> String {
        format!("st-like tape ({} records)", self.tape.len())
    }
}
