//! Linux SCSI tape driver (`st`) control operations.

#![allow(unsafe_code)]

use super::{RecordRead, TapeDrive};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

// Operation codes from <sys/mtio.h>.
const MTFSF: libc::c_short = 1;
const MTWEOF: libc::c_short = 5;
const MTOFFL: libc::c_short = 7;
const MTEOM: libc::c_short = 12;
const MTSEEK: libc::c_short = 22;

#[repr(C)]
struct MtOp {
    mt_op: libc::c_short,
    mt_count: libc::c_int,
}

#[repr(C)]
struct MtPos {
    mt_blkno: libc::c_long,
}

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ: libc::c_ulong = 2;

const fn ioc(dir: libc::c_ulong, nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    (dir << 30) | ((size as libc::c_ulong) << 16) | ((b'm' as libc::c_ulong) << 8) | nr
}

const MTIOCTOP: libc::c_ulong = ioc(IOC_WRITE, 1, std::mem::size_of::<MtOp>());
const MTIOCPOS: libc::c_ulong = ioc(IOC_READ, 3, std::mem::size_of::<MtPos>());

/// A tape character device such as `/dev/nst0`.
///
/// Use the non-rewinding device node; the rewinding one loses the head
/// position every time the handle is closed.
#[derive(Debug)]
pub struct MtioDrive {
    file: File,
    /// Record under the head, when known without asking the drive.
    head: Option<u64>,
    /// The last read crossed a file mark.
    after_mark: bool,
}

impl MtioDrive {
    /// Opens the tape device at `path` for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            head: None,
            after_mark: false,
        })
    }

    /// Forgets the cached head after a control operation moved it.
    fn moved(&mut self, head: Option<u64>, after_mark: bool) {
        self.head = head;
        self.after_mark = after_mark;
    }

    fn op(&self, op: libc::c_short, count: libc::c_int) -> io::Result<()> {
        let request = MtOp {
            mt_op: op,
            mt_count: count,
        };
        // SAFETY: MTIOCTOP reads exactly one `struct mtop` from the pointer,
        // which stays valid for the duration of the call.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                MTIOCTOP as _,
                &request as *const MtOp,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl TapeDrive for MtioDrive {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<RecordRead> {
        // The driver returns one record per read and zero bytes on a file
        // mark. End of data is reported the same way, so a zero read is
        // told apart by whether the head moved.
        match self.file.read(buf)? {
            0 => {
                let before = self.head;
                let after = self.tell_record()?;
                let read = classify_zero_read(before.map(|head| after > head), self.after_mark);
                self.moved(Some(after), read == RecordRead::FileMark);
                Ok(read)
            }
            n => {
                let head = self.head.map(|head| head + 1);
                self.moved(head, false);
                Ok(RecordRead::Data(n))
            }
        }
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.file.write_all(record)?;
        let head = self.head.map(|head| head + 1);
        self.moved(head, false);
        Ok(())
    }

    fn write_file_mark(&mut self) -> io::Result<()> {
        self.op(MTWEOF, 1)?;
        let head = self.head.map(|head| head + 1);
        self.moved(head, true);
        Ok(())
    }

    fn seek_to_record(&mut self, record: u64) -> io::Result<()> {
        let count = libc::c_int::try_from(record)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record out of range"))?;
        self.op(MTSEEK, count)?;
        self.moved(Some(record), false);
        Ok(())
    }

    fn go_to_end(&mut self) -> io::Result<()> {
        self.op(MTEOM, 1)?;
        self.moved(None, false);
        Ok(())
    }

    fn skip_to_next_file_mark(&mut self) -> io::Result<()> {
        self.moved(None, false);
        self.op(MTFSF, 1)?;
        self.after_mark = true;
        Ok(())
    }

    fn tell_record(&mut self) -> io::Result<u64> {
        let mut position = MtPos { mt_blkno: 0 };
        // SAFETY: MTIOCPOS writes exactly one `struct mtpos` through the
        // pointer, which is valid and exclusively borrowed for the call.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                MTIOCPOS as _,
                &mut position as *mut MtPos,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        u64::try_from(position.mt_blkno)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative tape position"))
    }

    fn eject(&mut self) -> io::Result<()> {
        self.moved(None, false);
        self.op(MTOFFL, 1)
    }
}

/// Interprets a zero-length read.
///
/// `advanced` is whether the head moved past something, if the head was
/// known before the read. A mark right after another mark ends the data, as
/// does a read that left the head where it was.
fn classify_zero_read(advanced: Option<bool>, after_mark: bool) -> RecordRead {
    match advanced {
        Some(false) => RecordRead::EndOfData,
        _ if after_mark => RecordRead::EndOfData,
        _ => RecordRead::FileMark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes_match_kernel_headers() {
        if cfg!(target_pointer_width = "64") {
            assert_eq!(MTIOCTOP, 0x4008_6d01);
            assert_eq!(MTIOCPOS, 0x8008_6d03);
        }
    }

    #[test]
    fn zero_read_that_moves_the_head_is_a_file_mark() {
        assert_eq!(classify_zero_read(Some(true), false), RecordRead::FileMark);
        assert_eq!(classify_zero_read(None, false), RecordRead::FileMark);
    }

    #[test]
    fn zero_read_in_place_is_end_of_data() {
        assert_eq!(classify_zero_read(Some(false), false), RecordRead::EndOfData);
    }

    #[test]
    fn second_mark_in_a_row_is_end_of_data() {
        assert_eq!(classify_zero_read(Some(true), true), RecordRead::EndOfData);
        assert_eq!(classify_zero_read(None, true), RecordRead::EndOfData);
    }
}
