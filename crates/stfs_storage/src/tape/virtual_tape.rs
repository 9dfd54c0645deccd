//! In-memory tape drive.

use super::{RecordRead, TapeDrive};
use crate::position::Geometry;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Frame {
    Record(Vec<u8>),
    FileMark,
}

#[derive(Debug, Default)]
struct TapeState {
    frames: Vec<Frame>,
    head: usize,
    ejected: bool,
}

/// An in-memory tape drive.
///
/// The tape is a list of records and file marks. Record numbers count file
/// marks, as real drives do. Clones share the tape and its head, like two
/// handles to one device.
#[derive(Debug, Clone)]
pub struct VirtualTape {
    state: Arc<Mutex<TapeState>>,
    geometry: Geometry,
}

impl VirtualTape {
    /// Creates a blank tape.
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            state: Arc::new(Mutex::new(TapeState::default())),
            geometry,
        }
    }

    /// Returns the record layout the tape is written with.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of records and file marks on the tape.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Returns `true` if `record` is a file mark.
    #[must_use]
    pub fn is_file_mark(&self, record: usize) -> bool {
        matches!(self.state.lock().frames.get(record), Some(Frame::FileMark))
    }

    /// Returns a copy of a data record.
    #[must_use]
    pub fn record(&self, record: usize) -> Option<Vec<u8>> {
        match self.state.lock().frames.get(record) {
            Some(Frame::Record(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Overwrites bytes inside a data record.
    ///
    /// Used by tests to simulate damage to the tape.
    ///
    /// # Errors
    ///
    /// Returns an error if `record` is not a data record or the bytes do
    /// not fit inside it.
    pub fn patch_record(&self, record: usize, offset: usize, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        let Some(Frame::Record(data)) = state.frames.get_mut(record) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record {record} is not a data record"),
            ));
        };
        let target = offset
            .checked_add(bytes.len())
            .and_then(|end| data.get_mut(offset..end))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("patch of {} bytes at {offset} exceeds record {record}", bytes.len()),
                )
            })?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Returns `true` once the tape has been ejected.
    #[must_use]
    pub fn is_ejected(&self) -> bool {
        self.state.lock().ejected
    }

    fn check_loaded(state: &TapeState) -> io::Result<()> {
        if state.ejected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "tape ejected"));
        }
        Ok(())
    }
}

impl TapeDrive for VirtualTape {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<RecordRead> {
        let mut state = self.state.lock();
        Self::check_loaded(&state)?;
        let head = state.head;
        let read = match state.frames.get(head) {
            None => return Ok(RecordRead::EndOfData),
            Some(Frame::FileMark) => RecordRead::FileMark,
            Some(Frame::Record(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                RecordRead::Data(n)
            }
        };
        state.head += 1;
        Ok(read)
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        Self::check_loaded(&state)?;
        let head = state.head;
        state.frames.truncate(head);
        state.frames.push(Frame::Record(record.to_vec()));
        state.head += 1;
        Ok(())
    }

    fn write_file_mark(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        Self::check_loaded(&state)?;
        let head = state.head;
        state.frames.truncate(head);
        state.frames.push(Frame::FileMark);
        state.head += 1;
        Ok(())
    }

    fn seek_to_record(&mut self, record: u64) -> io::Result<()> {
        let mut state = self.state.lock();
        state.ejected = false;
        let record = record as usize;
        if record > state.frames.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record {record} is past the end of data"),
            ));
        }
        state.head = record;
        Ok(())
    }

    fn go_to_end(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        Self::check_loaded(&state)?;
        state.head = state.frames.len();
        Ok(())
    }

    fn skip_to_next_file_mark(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        Self::check_loaded(&state)?;
        let head = state.head;
        let mark = state.frames[head.min(state.frames.len())..]
            .iter()
            .position(|frame| matches!(frame, Frame::FileMark));
        match mark {
            Some(index) => {
                state.head = head + index + 1;
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no file mark before end of data",
            )),
        }
    }

    fn tell_record(&mut self) -> io::Result<u64> {
        let state = self.state.lock();
        Self::check_loaded(&state)?;
        Ok(state.head as u64)
    }

    fn eject(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.head = 0;
        state.ejected = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape() -> VirtualTape {
        VirtualTape::new(Geometry::new(1).unwrap())
    }

    #[test]
    fn write_truncates_after_head() {
        let mut tape = tape();
        tape.write_record(&[1; 512]).unwrap();
        tape.write_record(&[2; 512]).unwrap();
        tape.write_file_mark().unwrap();

        tape.seek_to_record(1).unwrap();
        tape.write_record(&[3; 512]).unwrap();
        assert_eq!(tape.len(), 2);
        assert_eq!(tape.record(1), Some(vec![3; 512]));
    }

    #[test]
    fn read_reports_file_marks_and_end() {
        let mut tape = tape();
        tape.write_record(&[1; 512]).unwrap();
        tape.write_file_mark().unwrap();
        tape.seek_to_record(0).unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(tape.read_record(&mut buf).unwrap(), RecordRead::Data(512));
        assert_eq!(tape.read_record(&mut buf).unwrap(), RecordRead::FileMark);
        assert_eq!(tape.read_record(&mut buf).unwrap(), RecordRead::EndOfData);
        assert_eq!(tape.tell_record().unwrap(), 2);
    }

    #[test]
    fn patch_must_fit_the_record() {
        let mut tape = tape();
        tape.write_record(&[1; 512]).unwrap();
        tape.write_file_mark().unwrap();

        tape.patch_record(0, 510, &[9, 9]).unwrap();
        assert_eq!(tape.record(0).unwrap()[510..], [9, 9]);
        assert!(tape.patch_record(0, 511, &[9, 9]).is_err());
        assert!(tape.patch_record(0, usize::MAX, &[9]).is_err());
        assert!(tape.patch_record(1, 0, &[9]).is_err());
    }

    #[test]
    fn skip_without_mark_fails() {
        let mut tape = tape();
        tape.write_record(&[1; 512]).unwrap();
        tape.seek_to_record(0).unwrap();
        assert!(tape.skip_to_next_file_mark().is_err());
    }

    #[test]
    fn seek_past_end_fails() {
        let mut tape = tape();
        assert!(tape.seek_to_record(1).is_err());
        assert!(tape.seek_to_record(0).is_ok());
    }

    #[test]
    fn ejected_tape_rejects_io() {
        let mut tape = tape();
        tape.write_record(&[1; 512]).unwrap();
        tape.eject().unwrap();
        assert!(tape.is_ejected());

        let mut buf = [0u8; 512];
        assert!(tape.read_record(&mut buf).is_err());
        // reloading happens on the next seek
        tape.seek_to_record(0).unwrap();
        assert_eq!(tape.read_record(&mut buf).unwrap(), RecordRead::Data(512));
    }
}
