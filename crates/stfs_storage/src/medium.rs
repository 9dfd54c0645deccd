//! Medium trait definition.

use crate::error::StorageResult;
use crate::position::{Geometry, LogPosition};
use std::fmt;
use std::io::{Read, Write};

/// How a medium can be positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediumKind {
    /// Any byte offset can be sought directly.
    Seekable,
    /// Only records can be sought; file marks separate write sessions.
    Sequential,
}

impl fmt::Display for MediumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seekable => f.write_str("seekable"),
            Self::Sequential => f.write_str("sequential"),
        }
    }
}

/// A block-addressed, append-only medium.
///
/// A medium is an opaque byte stream addressed by [`LogPosition`]. It does
/// not understand the entries written to it. Reading and writing go through
/// the [`Read`] and [`Write`] supertraits from the current cursor.
///
/// # Invariants
///
/// - [`offset`](Medium::offset) is the logical byte offset of the cursor and
///   equals `geometry().offset_of(p)` right after `seek_to(p)`
/// - A write session starts after [`rewind`](Medium::rewind) or
///   [`seek_to_end`](Medium::seek_to_end) and ends with
///   [`finish_session`](Medium::finish_session)
/// - [`resync_candidate`](Medium::resync_candidate) always returns a position
///   strictly after the failed one, or `None`
///
/// # Implementors
///
/// - [`super::InMemoryContainer`] - Seekable, in memory
/// - [`super::FileContainer`] - Seekable, regular file
/// - [`super::SequentialMedium`] - Tape drives
pub trait Medium: Read + Write + Send {
    /// Returns how this medium can be positioned.
    fn kind(&self) -> MediumKind;

    /// Returns the record layout of this medium.
    fn geometry(&self) -> Geometry;

    /// Returns the logical byte offset of the cursor.
    fn offset(&self) -> u64;

    /// Moves the cursor to `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the position cannot be reached.
    fn seek_to(&mut self, position: LogPosition) -> StorageResult<()>;

    /// Moves the cursor to the start of the medium for overwriting.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be rewound.
    fn rewind(&mut self) -> StorageResult<()>;

    /// Moves the cursor past the end of the existing content.
    ///
    /// Returns the logical byte offset of the append point.
    ///
    /// # Errors
    ///
    /// Returns an error if the end cannot be located.
    fn seek_to_end(&mut self) -> StorageResult<u64>;

    /// Returns the position of the cursor.
    ///
    /// On a sequential medium this asks the drive for the current record.
    ///
    /// # Errors
    ///
    /// Returns an error if the drive cannot report its position.
    fn current_position(&mut self) -> StorageResult<LogPosition>;

    /// Returns the next position at which an entry header may start after
    /// reading failed at `failed`.
    ///
    /// Returns `None` once the medium has no more content to offer.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails while repositioning.
    fn resync_candidate(&mut self, failed: LogPosition) -> StorageResult<Option<LogPosition>>;

    /// Completes a write session.
    ///
    /// `dirty` is `true` if at least one entry was written during the session.
    ///
    /// # Errors
    ///
    /// Returns an error if padding or flushing fails.
    fn finish_session(&mut self, dirty: bool) -> StorageResult<()>;

    /// Unloads the medium from its drive.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`](crate::StorageError::Unsupported)
    /// on media that cannot be ejected.
    fn eject(&mut self) -> StorageResult<()>;

    /// Syncs written data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}

/// Opens handles to a medium.
///
/// A handle may be dropped and reopened at any time, for instance after an
/// error left its cursor in an unknown place.
pub trait MediumSource: Send + Sync {
    /// Opens a fresh handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be opened.
    fn open(&self) -> StorageResult<Box<dyn Medium>>;

    /// Returns a short human-readable description for logs.
    fn describe(&self) -> String;
}
