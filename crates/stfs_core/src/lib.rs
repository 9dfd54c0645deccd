//! # STFS Core
//!
//! A filesystem on tape, kept as an append-only log of tar entries.
//!
//! This crate provides:
//! - The content pipeline (compression, encryption, signatures)
//! - The session writer that appends entries to a medium
//! - The index engine that replays a medium into a metadata store,
//!   recovering from damage and concatenated sessions
//! - The [`Filesystem`] facade tying these together
//!
//! ## Layers
//!
//! ```text
//! Filesystem ── ops (plan, archive, fetch, restore)
//!     │             │
//!     ├── index ────┤── pipeline
//!     │             │
//!     └── log ──────┴── stfs_codec ── stfs_storage
//! ```
//!
//! The medium is the only source of truth. The index is derived state and
//! can always be rebuilt with [`Filesystem::reindex`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod dir;
mod error;
mod filesystem;
pub mod index;
pub mod log;
pub mod metadata;
mod ops;
pub mod pipeline;

pub use config::{CompressionLevel, Config};
pub use dir::{SessionLock, StateDir};
pub use error::{CoreError, CoreResult};
pub use filesystem::Filesystem;
pub use index::{IndexOptions, IndexReport, IndexedEntry};
pub use metadata::{MemoryMetadataStore, MetadataRecord, MetadataStore, ROOT};
pub use ops::{ContentSource, FetchedEntry, HostFile, SourceEntry};
pub use pipeline::Pipeline;
