//! Index-free reads.

use crate::error::{CoreError, CoreResult};
use crate::index::{decode_at, EntryReader, IndexedEntry};
use crate::pipeline::Pipeline;
use std::io::{self, Write};
use stfs_storage::{LogPosition, Medium};

/// An entry read directly from the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEntry {
    /// The decoded entry.
    pub indexed: IndexedEntry,
    /// Bytes of decoded content written to the destination.
    pub copied: u64,
}

/// Decodes the single entry at `position`.
///
/// With a destination, the content of a regular file is decrypted,
/// decompressed, verified and streamed into it. The metadata index is not
/// consulted.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if no entry starts at `position`, a
/// structural codec error if the bytes there are damaged, and format,
/// integrity and medium errors.
pub(crate) fn fetch_entry(
    medium: &mut dyn Medium,
    pipeline: &Pipeline,
    position: LogPosition,
    destination: Option<&mut dyn Write>,
) -> CoreResult<FetchedEntry> {
    let decoded = decode_at(medium, pipeline, position, |indexed, payload| {
        let (Some(destination), Some(header)) = (destination, indexed.entry.header()) else {
            return Ok(0);
        };
        if !indexed.entry.has_content() {
            return Ok(0);
        }
        let mut content = pipeline.content_reader(Box::new(payload), header)?;
        io::copy(&mut content, destination).map_err(CoreError::from_io)
    })?;
    let (indexed, copied) =
        decoded.ok_or_else(|| CoreError::not_found(format!("entry at {position}")))?;
    Ok(FetchedEntry { indexed, copied })
}

/// Lists the entries from `from` on without touching the index.
///
/// # Errors
///
/// Returns the errors of [`EntryReader`].
pub(crate) fn query(
    medium: &mut dyn Medium,
    pipeline: &Pipeline,
    from: LogPosition,
) -> CoreResult<Vec<IndexedEntry>> {
    EntryReader::new(medium, pipeline, from).collect()
}
