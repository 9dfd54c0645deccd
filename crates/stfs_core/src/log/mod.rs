//! Append-only write path.
//!
//! Every mutation of the filesystem is a write session: the medium is
//! positioned after its existing content (or rewound when overwriting),
//! entries are appended, and the session is closed with a trailer.

mod writer;

pub use writer::{LogWriter, PayloadWriter, WriteMode};
