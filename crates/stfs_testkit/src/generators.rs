//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use stfs_codec::{EntryHeader, EntryKind};
use stfs_core::SourceEntry;
use stfs_storage::{Geometry, LogPosition};

/// Strategy for generating valid record sizes, in blocks.
pub fn record_size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), Just(20u64), 2u64..=128]
}

/// Strategy for generating a geometry together with a position inside it.
pub fn position_strategy() -> impl Strategy<Value = (Geometry, LogPosition)> {
    record_size_strategy().prop_flat_map(|record_size| {
        (0u64..1_000_000, 0..record_size).prop_map(move |(record, block)| {
            (
                Geometry::new(record_size).expect("Invalid record size"),
                LogPosition::new(record, block),
            )
        })
    })
}

/// Strategy for generating a single path component.
pub fn name_component_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Component must not be a dot name", |s| s != "." && s != "..")
}

/// Strategy for generating relative entry names, some longer than the
/// 100 bytes a plain tar header holds.
pub fn entry_name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(name_component_strategy(), 1..10).prop_map(|parts| parts.join("/"))
}

/// Strategy for generating file content.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..2048),
        (any::<u8>(), 0usize..20_000).prop_map(|(byte, len)| vec![byte; len]),
    ]
}

/// Strategy for generating entry headers of any common kind.
pub fn header_strategy() -> impl Strategy<Value = EntryHeader> {
    (
        entry_name_strategy(),
        prop_oneof![
            Just(EntryKind::Regular),
            Just(EntryKind::Directory),
            Just(EntryKind::Symlink),
        ],
        0u32..0o10000,
        0u64..70_000,
        0i64..4_000_000_000,
    )
        .prop_map(|(name, kind, mode, uid, mtime)| {
            let mut header = EntryHeader::new(name, kind);
            header.mode = mode;
            header.uid = uid;
            header.gid = uid;
            header.mtime = mtime;
            if kind.is_dir() {
                header.name.push('/');
            }
            if matches!(kind, EntryKind::Symlink) {
                header.link_name = "target".into();
            }
            header
        })
}

/// Strategy for generating flat sets of files with distinct names.
pub fn file_set_strategy() -> impl Strategy<Value = Vec<SourceEntry>> {
    prop::collection::btree_map(name_component_strategy(), content_strategy(), 1..8).prop_map(
        |files| {
            files
                .into_iter()
                .map(|(name, content)| SourceEntry::file(name, content))
                .collect()
        },
    )
}
