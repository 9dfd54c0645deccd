//! Record/block position arithmetic.
//!
//! Every entry on a medium is addressed by a [`LogPosition`]: a record index
//! and a block index inside that record. Records are groups of
//! `record_size` blocks of [`BLOCK_SIZE`] bytes. The same arithmetic is used
//! for seekable containers and for tapes, where a record is the unit the
//! drive can seek to.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one block in bytes.
pub const BLOCK_SIZE: u64 = 512;

/// Blocks per record used when nothing else is configured.
///
/// This is the classic tar blocking factor.
pub const DEFAULT_RECORD_SIZE: u64 = 20;

/// Address of an entry on a medium.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogPosition {
    /// Record index.
    pub record: u64,
    /// Block index within the record.
    pub block: u64,
}

impl LogPosition {
    /// The first position of every medium.
    pub const START: Self = Self {
        record: 0,
        block: 0,
    };

    /// Creates a position.
    #[must_use]
    pub const fn new(record: u64, block: u64) -> Self {
        Self { record, block }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record, self.block)
    }
}

/// Record layout of a medium.
///
/// The record size is fixed for the lifetime of a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    record_size: u64,
}

impl Geometry {
    /// Creates a geometry with `record_size` blocks per record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidGeometry`] if `record_size` is zero.
    pub fn new(record_size: u64) -> StorageResult<Self> {
        if record_size == 0 {
            return Err(StorageError::InvalidGeometry { record_size });
        }
        Ok(Self { record_size })
    }

    /// Blocks per record.
    #[must_use]
    pub const fn record_size(&self) -> u64 {
        self.record_size
    }

    /// Bytes per record.
    #[must_use]
    pub const fn record_bytes(&self) -> u64 {
        self.record_size * BLOCK_SIZE
    }

    /// Byte offset of a position.
    #[must_use]
    pub const fn offset_of(&self, position: LogPosition) -> u64 {
        position.record * self.record_bytes() + position.block * BLOCK_SIZE
    }

    /// Position of the block containing `offset`.
    #[must_use]
    pub const fn position_at(&self, offset: u64) -> LogPosition {
        self.position_of_block(offset / BLOCK_SIZE)
    }

    /// Position of the first block boundary at or after `end_offset`.
    ///
    /// This is where the entry following one that ends at `end_offset` starts.
    #[must_use]
    pub const fn position_after(&self, end_offset: u64) -> LogPosition {
        self.position_of_block(end_offset.div_ceil(BLOCK_SIZE))
    }

    /// Returns `true` if the block index fits inside a record.
    #[must_use]
    pub const fn contains(&self, position: LogPosition) -> bool {
        position.block < self.record_size
    }

    const fn position_of_block(&self, total_blocks: u64) -> LogPosition {
        LogPosition {
            record: total_blocks / self.record_size,
            block: total_blocks % self.record_size,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            record_size: DEFAULT_RECORD_SIZE,
        }
    }
}

/// Rounds `offset` up to the next block boundary.
#[must_use]
pub const fn align_to_block(offset: u64) -> u64 {
    offset.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_record_size_rejected() {
        assert!(matches!(
            Geometry::new(0),
            Err(StorageError::InvalidGeometry { record_size: 0 })
        ));
    }

    #[test]
    fn offset_of_start_is_zero() {
        let geometry = Geometry::new(20).unwrap();
        assert_eq!(geometry.offset_of(LogPosition::START), 0);
    }

    #[test]
    fn block_rolls_over_into_next_record() {
        let geometry = Geometry::new(4).unwrap();
        // 4 full blocks end exactly at the record boundary
        assert_eq!(geometry.position_after(4 * BLOCK_SIZE), LogPosition::new(1, 0));
        assert_eq!(geometry.position_after(3 * BLOCK_SIZE + 1), LogPosition::new(1, 0));
        assert_eq!(geometry.position_after(3 * BLOCK_SIZE), LogPosition::new(0, 3));
    }

    #[test]
    fn position_after_rounds_up_partial_blocks() {
        let geometry = Geometry::new(20).unwrap();
        assert_eq!(geometry.position_after(0), LogPosition::START);
        assert_eq!(geometry.position_after(1), LogPosition::new(0, 1));
        assert_eq!(geometry.position_after(512), LogPosition::new(0, 1));
        assert_eq!(geometry.position_after(513), LogPosition::new(0, 2));
    }

    #[test]
    fn align_to_block_is_idempotent() {
        assert_eq!(align_to_block(0), 0);
        assert_eq!(align_to_block(1), 512);
        assert_eq!(align_to_block(512), 512);
        assert_eq!(align_to_block(align_to_block(1000)), 1024);
    }

    #[test]
    fn display_format() {
        assert_eq!(LogPosition::new(7, 3).to_string(), "7:3");
    }

    proptest! {
        #[test]
        fn offset_round_trip(record_size in 1u64..=512, record in 0u64..1_000_000, block_seed in any::<u64>()) {
            let geometry = Geometry::new(record_size).unwrap();
            let position = LogPosition::new(record, block_seed % record_size);
            prop_assert!(geometry.contains(position));
            prop_assert_eq!(geometry.position_at(geometry.offset_of(position)), position);
            prop_assert_eq!(geometry.position_after(geometry.offset_of(position)), position);
        }

        #[test]
        fn position_after_is_block_aligned(record_size in 1u64..=64, end in 0u64..10_000_000) {
            let geometry = Geometry::new(record_size).unwrap();
            let next = geometry.position_after(end);
            let offset = geometry.offset_of(next);
            prop_assert!(geometry.contains(next));
            prop_assert!(offset >= end);
            prop_assert!(offset - end < BLOCK_SIZE);
            prop_assert_eq!(offset % BLOCK_SIZE, 0);
        }
    }
}
