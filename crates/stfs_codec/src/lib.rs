//! # STFS Codec
//!
//! The log-entry format of STFS.
//!
//! Every change to an STFS filesystem is one immutable entry appended to the
//! medium. Entries are plain PAX tar members, so any tar reader can list a
//! medium, and STFS adds its semantics through `STFS.*` extended records:
//!
//! | Record | Meaning |
//! |---|---|
//! | `STFS.Version` | Format version, always `1` |
//! | `STFS.Action` | `CREATE`, `UPDATE` or `DELETE` |
//! | `STFS.ReplacesName` | Previous name of a renamed entry |
//! | `STFS.ReplacesContent` | Whether an update carries new content |
//! | `STFS.UncompressedSize` | Content size before transformation |
//! | `STFS.Signature` | Base64 signature |
//! | `STFS.EmbeddedHeader` | Base64 sealed copy of the full header |
//!
//! ## Layers
//!
//! - [`LogEntry`] is the typed meaning of an entry
//! - [`WireHeader`] is the tar header plus its extended records
//! - [`encode_header`] and [`decode_entry`] move wire headers on and off a
//!   byte stream
//!
//! ## Usage
//!
//! ```
//! use stfs_codec::{decode_entry, encode_header, CodecError, EntryHeader, EntryKind, LogEntry};
//!
//! let entry = LogEntry::Create(EntryHeader::new("docs/", EntryKind::Directory));
//! let bytes = encode_header(&entry.to_wire()).unwrap();
//!
//! let (raw, ()) = decode_entry(&bytes[..], |_, _| Ok::<_, CodecError>(()))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(LogEntry::from_wire(raw.wire).unwrap(), entry);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod embedded;
mod encoder;
mod entry;
mod error;
mod header;
pub mod records;
mod suffix;

pub use decoder::{decode_entry, RawEntry};
pub use embedded::{decode_base64, encode_base64, EmbeddedHeader};
pub use encoder::{encode_header, padding_for, END_OF_ARCHIVE};
pub use entry::{Deletion, LogEntry, Update, WireHeader};
pub use error::{CodecError, CodecResult};
pub use header::{EntryHeader, EntryKind};
pub use records::{Action, Records};
pub use suffix::NameSuffixes;

/// Size of a tar block in bytes.
pub const BLOCK_SIZE: usize = 512;
