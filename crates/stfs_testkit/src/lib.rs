//! # STFS Testkit
//!
//! Test utilities for STFS.
//!
//! This crate provides:
//! - Test filesystems over every kind of medium
//! - A tape drive with the read semantics of the Linux `st` driver
//! - The matrix of content pipelines
//! - Sample trees and damaged-medium helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stfs_testkit::prelude::*;
//!
//! #[test]
//! fn archive_on_tape() {
//!     let fs = TestFilesystem::tape();
//!     fs.archive(&sample_tree()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod drive;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::drive::StTape;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_logging;
}

pub use drive::StTape;
pub use fixtures::*;
pub use generators::*;

/// Installs a `tracing` subscriber for tests, once per process.
///
/// Filtering follows `RUST_LOG`; output is captured by the test harness.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
