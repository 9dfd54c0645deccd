//! Streaming entry reader with resynchronization.
//!
//! Reads entries one by one from a resume point. The position of the next
//! entry follows from the span of the current one; when the bytes there
//! are not an entry, the medium proposes where to continue:
//!
//! - seekable media: the next block, until the end of the container
//! - sequential media: the record after the next file mark
//!
//! While scanning like this, headers that parse but carry unknown STFS
//! records are skipped as well. At a computed position they are fatal.

use crate::error::{CoreError, CoreResult};
use crate::pipeline::Pipeline;
use std::fmt;
use std::io::{self, Read};
use stfs_codec::records::Records;
use stfs_codec::{decode_entry, LogEntry, WireHeader};
use stfs_storage::{LogPosition, Medium, StorageError};
use tracing::{debug, trace};

/// One decoded entry and where it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Position of the first header block.
    pub position: LogPosition,
    /// The entry, unsealed and with name suffixes removed.
    pub entry: LogEntry,
    /// Extended records of the unsealed header.
    pub records: Records,
    /// Bytes the entry occupies, padding included.
    pub span: u64,
}

/// A streaming reader over the entries of a medium.
///
/// Yields entries in medium order. Structural damage is skipped by
/// resynchronizing; end of data ends the iteration without error.
///
/// # Example
///
/// ```ignore
/// let reader = EntryReader::new(medium, &pipeline, LogPosition::START);
/// for result in reader {
///     let indexed = result?;
///     // Process entry...
/// }
/// ```
pub struct EntryReader<'a> {
    medium: &'a mut dyn Medium,
    pipeline: &'a Pipeline,
    next: Option<LogPosition>,
    /// Set while looking for a header at a proposed position.
    scanning: bool,
    resyncs: u64,
}

impl<'a> EntryReader<'a> {
    /// Creates a reader starting at `from`.
    pub fn new(medium: &'a mut dyn Medium, pipeline: &'a Pipeline, from: LogPosition) -> Self {
        Self {
            medium,
            pipeline,
            next: Some(from),
            scanning: false,
            resyncs: 0,
        }
    }

    /// Returns how often the reader had to resynchronize.
    #[must_use]
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    fn read_next(&mut self) -> CoreResult<Option<IndexedEntry>> {
        while let Some(position) = self.next {
            match decode_at(&mut *self.medium, self.pipeline, position, |_, _| Ok(())) {
                Ok(Some((indexed, ()))) => {
                    let geometry = self.medium.geometry();
                    let end = geometry.offset_of(position) + indexed.span;
                    self.next = Some(geometry.position_after(end));
                    self.scanning = false;
                    return Ok(Some(indexed));
                }
                Ok(None) => self.resync(position, &"no header")?,
                Err(err) if is_desync(&err) => self.resync(position, &err)?,
                Err(err) if self.scanning && err.is_format() => {
                    debug!(record = position.record, block = position.block, error = %err, "skipping unreadable header while scanning");
                    self.resync(position, &err)?;
                }
                Err(err) => {
                    self.next = None;
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    fn resync(&mut self, failed: LogPosition, reason: &dyn fmt::Display) -> CoreResult<()> {
        self.next = self
            .medium
            .resync_candidate(failed)?
            .filter(|candidate| *candidate > failed);
        self.scanning = true;
        self.resyncs += 1;
        trace!(
            record = failed.record,
            block = failed.block,
            next = ?self.next,
            %reason,
            "resynchronizing"
        );
        Ok(())
    }
}

impl Iterator for EntryReader<'_> {
    type Item = CoreResult<IndexedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Returns `true` if `err` means there is no entry at the position.
fn is_desync(err: &CoreError) -> bool {
    match err {
        CoreError::Codec(codec) => codec.is_structural(),
        CoreError::Storage(StorageError::InvalidPosition { .. }) => true,
        _ => false,
    }
}

/// Unseals a wire header and builds the logical entry.
pub(crate) fn interpret(pipeline: &Pipeline, wire: WireHeader) -> CoreResult<(LogEntry, Records)> {
    let inner = pipeline.unseal_header(wire)?;
    let records = inner.records.clone();
    let entry = LogEntry::from_wire(inner)?;
    Ok((pipeline.suffixes().strip_from(&entry), records))
}

/// Decodes the entry at `position`.
///
/// `visit` receives the entry and a reader over its raw payload. Returns
/// `Ok(None)` if no header starts there. Errors of the medium itself are
/// returned as they are, not as structural codec errors.
pub(crate) fn decode_at<T>(
    medium: &mut dyn Medium,
    pipeline: &Pipeline,
    position: LogPosition,
    visit: impl FnOnce(&IndexedEntry, &mut dyn Read) -> CoreResult<T>,
) -> CoreResult<Option<(IndexedEntry, T)>> {
    medium.seek_to(position)?;
    let mut tracked = TrackedReader {
        medium,
        error: None,
    };
    let result = decode_entry(&mut tracked, |raw, payload| {
        let (entry, records) = interpret(pipeline, raw.wire.clone())?;
        let indexed = IndexedEntry {
            position,
            entry,
            records,
            span: raw.span(),
        };
        let value = visit(&indexed, payload)?;
        Ok::<_, CoreError>((indexed, value))
    });
    match result {
        Ok(decoded) => Ok(decoded.map(|(_, pair)| pair)),
        Err(err) => Err(tracked.error.take().map_or(err, CoreError::Io)),
    }
}

/// Remembers the first error of the medium.
///
/// The tar reader turns every read failure into a structural error; this
/// keeps real device failures distinguishable from damaged bytes.
struct TrackedReader<'m> {
    medium: &'m mut dyn Medium,
    error: Option<io::Error>,
}

impl Read for TrackedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.medium.read(buf).inspect_err(|err| {
            if self.error.is_none() {
                self.error = Some(io::Error::new(err.kind(), err.to_string()));
            }
        })
    }
}
