//! Metadata index of the logical tree.
//!
//! The index is derived state: everything in it can be rebuilt by replaying
//! the medium. The [`MetadataStore`] trait is the seam between the engine
//! and whatever keeps the index; [`MemoryMetadataStore`] keeps it in memory
//! with an optional JSON snapshot.

mod memory;
mod record;

pub use memory::MemoryMetadataStore;
pub use record::MetadataRecord;

use crate::error::CoreResult;
use stfs_storage::LogPosition;

/// Name of the root directory entry.
pub const ROOT: &str = "/";

/// Storage of indexed metadata records, keyed by name.
///
/// Lookups by name tolerate the trailing-slash variant of directory names:
/// `get("docs")` finds `docs/`. Tombstoned records are hidden from every
/// lookup except [`get_any`](Self::get_any) and [`all`](Self::all).
pub trait MetadataStore: Send + Sync {
    /// Inserts or replaces the record stored under `record.name`.
    fn upsert(&self, record: MetadataRecord) -> CoreResult<()>;

    /// Returns the live record for `name`.
    fn get(&self, name: &str) -> CoreResult<Option<MetadataRecord>>;

    /// Returns the record for `name`, live or tombstoned.
    fn get_any(&self, name: &str) -> CoreResult<Option<MetadataRecord>>;

    /// Returns the live direct children of a directory, sorted by name.
    fn children(&self, name: &str) -> CoreResult<Vec<MetadataRecord>>;

    /// Returns all live records below a directory, sorted by name.
    fn descendants(&self, name: &str) -> CoreResult<Vec<MetadataRecord>>;

    /// Marks `name` deleted by the entry at `position`.
    ///
    /// Inserts a tombstone if the name is unknown.
    fn tombstone(&self, name: &str, position: LogPosition) -> CoreResult<()>;

    /// Moves the record stored under `from` to `to`.
    ///
    /// Returns `false` if there was nothing to move.
    fn rename(&self, from: &str, to: &str) -> CoreResult<bool>;

    /// Returns the furthest position the index accounts for.
    ///
    /// This is the maximum of all stored positions, all last-known
    /// positions and the high-water mark set by
    /// [`mark_indexed`](Self::mark_indexed). `None` for an empty index.
    fn last_indexed_position(&self) -> CoreResult<Option<LogPosition>>;

    /// Raises the high-water mark to `position`.
    fn mark_indexed(&self, position: LogPosition) -> CoreResult<()>;

    /// Removes every record and the high-water mark.
    fn purge(&self) -> CoreResult<()>;

    /// Returns every record, including tombstones, sorted by name.
    fn all(&self) -> CoreResult<Vec<MetadataRecord>>;

    /// Persists pending changes, if the store is durable.
    fn flush(&self) -> CoreResult<()>;
}

/// Returns the other spelling of a name: with or without a trailing slash.
pub(crate) fn alternate_name(name: &str) -> String {
    match name.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => format!("{name}/"),
    }
}

/// Returns `true` if `candidate` lies below `dir`.
///
/// With `direct`, only immediate children match.
pub(crate) fn is_below(dir: &str, candidate: &str, direct: bool) -> bool {
    let dir = dir.trim_end_matches('/');
    let rest = if dir.is_empty() {
        // Below the root: every name except the root itself.
        candidate.trim_start_matches('/')
    } else {
        match candidate
            .strip_prefix(dir)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(rest) => rest,
            None => return false,
        }
    };
    let rest = rest.trim_end_matches('/');
    !rest.is_empty() && (!direct || !rest.contains('/'))
}
