//! Index and recovery.
//!
//! The index is rebuilt by reading the medium from a resume point and
//! applying every entry to a [`MetadataStore`](crate::metadata::MetadataStore).
//! Reading tolerates damage: missing trailers, corrupted blocks and
//! concatenated sessions are stepped over by resynchronizing.

mod engine;
mod reader;

pub use engine::{IndexEngine, IndexOptions, IndexReport};
pub use reader::{EntryReader, IndexedEntry};

pub(crate) use reader::decode_at;
