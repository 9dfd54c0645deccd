//! Building blocks of the filesystem operations.
//!
//! Each operation of [`Filesystem`](crate::Filesystem) is composed from the
//! pieces here: planners that turn a request into log entries, the archive
//! step that writes them, and the fetch and restore steps that read back.

pub(crate) mod archive;
pub(crate) mod fetch;
pub(crate) mod mutate;
pub(crate) mod restore;
mod source;

pub use fetch::FetchedEntry;
pub use source::{ContentSource, HostFile, SourceEntry};
