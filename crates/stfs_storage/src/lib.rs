//! # STFS Storage
//!
//! Position arithmetic and medium backends for STFS.
//!
//! This crate is the lowest layer of STFS. A medium is an append-only
//! sequence of 512-byte blocks grouped into fixed-size records. Media do
//! not interpret the bytes they carry; the log format lives in
//! `stfs_codec` and the replay logic in `stfs_core`.
//!
//! ## Design Principles
//!
//! - One capability trait, [`Medium`], for every kind of medium
//! - Position arithmetic is pure and shared by all backends
//! - Sequential media only move through record-level control operations
//! - Handles are opened through a [`MediumSource`] so they can be reopened
//!
//! ## Available Media
//!
//! - [`InMemoryContainer`] - Seekable container for tests and ephemeral use
//! - [`FileContainer`] - Seekable container backed by a regular file
//! - [`SequentialMedium`] - Record-buffered tape over a [`TapeDrive`]
//!   - [`VirtualTape`] - In-memory drive with records and file marks
//!   - `MtioDrive` - SCSI tape character device (Linux)
//!
//! ## Example
//!
//! ```rust
//! use stfs_storage::{Geometry, LogPosition};
//!
//! let geometry = Geometry::new(20).unwrap();
//! let position = LogPosition::new(1, 3);
//! let offset = geometry.offset_of(position);
//! assert_eq!(offset, 20 * 512 + 3 * 512);
//! assert_eq!(geometry.position_at(offset), position);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod medium;
mod memory;
mod position;
mod tape;

pub use error::{StorageError, StorageResult};
pub use file::{DrivePath, FileContainer};
pub use medium::{Medium, MediumKind, MediumSource};
pub use memory::InMemoryContainer;
pub use position::{align_to_block, Geometry, LogPosition, BLOCK_SIZE, DEFAULT_RECORD_SIZE};
#[cfg(target_os = "linux")]
pub use tape::MtioDrive;
pub use tape::{RecordRead, SequentialMedium, TapeDrive, VirtualTape};
