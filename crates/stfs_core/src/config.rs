//! Filesystem configuration.

use crate::error::{CoreError, CoreResult};
use crate::pipeline::ZstdCompressor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stfs_storage::{Geometry, DEFAULT_RECORD_SIZE};

/// How hard the compressor works.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Fastest compression.
    Fastest,
    /// Default trade-off.
    #[default]
    Balanced,
    /// Smallest output.
    Smallest,
}

impl CompressionLevel {
    /// Returns the zstd level for this setting.
    #[must_use]
    pub const fn zstd_level(self) -> i32 {
        match self {
            Self::Fastest => 1,
            Self::Balanced => 3,
            Self::Smallest => 19,
        }
    }
}

/// Configuration for opening a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Blocks per record. Fixed for the lifetime of a medium.
    pub record_size: u64,

    /// Compression level used when a compressor is active.
    pub compression_level: CompressionLevel,

    /// Directory holding the write lock and the index snapshot.
    pub state_dir: Option<PathBuf>,

    /// Whether to write the index snapshot after every session.
    pub persist_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record_size: DEFAULT_RECORD_SIZE,
            compression_level: CompressionLevel::Balanced,
            state_dir: None,
            persist_index: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of blocks per record.
    #[must_use]
    pub const fn record_size(mut self, blocks: u64) -> Self {
        self.record_size = blocks;
        self
    }

    /// Sets the compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the state directory.
    #[must_use]
    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    /// Sets whether the index snapshot is written after every session.
    #[must_use]
    pub const fn persist_index(mut self, value: bool) -> Self {
        self.persist_index = value;
        self
    }

    /// Returns the medium geometry for this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_size` is zero.
    pub fn geometry(&self) -> CoreResult<Geometry> {
        Geometry::new(self.record_size).map_err(CoreError::from)
    }

    /// Returns a compressor working at the configured level.
    #[must_use]
    pub const fn compressor(&self) -> ZstdCompressor {
        ZstdCompressor::new(self.compression_level)
    }
}
