//! Recovery tests: damaged media, aborted sessions and resumed indexing.

use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use stfs_codec::records::VERSION;
use stfs_codec::{encode_header, padding_for, EntryHeader, EntryKind, LogEntry, END_OF_ARCHIVE};
use stfs_core::{ContentSource, CoreError, Filesystem, MetadataStore, SourceEntry, ROOT};
use stfs_storage::{LogPosition, BLOCK_SIZE};
use stfs_testkit::prelude::*;

fn tree_names(fs: &Filesystem) -> Vec<String> {
    fs.tree(ROOT)
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect()
}

fn read(fs: &Filesystem, name: &str) -> Vec<u8> {
    let mut content = Vec::new();
    fs.read_file(name, &mut content).unwrap();
    content
}

/// Encodes a complete CREATE entry by hand.
fn raw_entry(name: &str, content: &[u8], version: &str) -> Vec<u8> {
    let mut header = EntryHeader::new(name, EntryKind::Regular);
    header.size = content.len() as u64;
    let mut wire = LogEntry::Create(header).to_wire();
    wire.records.insert(VERSION.into(), version.into());
    let mut bytes = encode_header(&wire).unwrap();
    bytes.extend_from_slice(content);
    bytes.resize(bytes.len() + padding_for(content.len() as u64) as usize, 0);
    bytes
}

/// Content that reads fine once, then fails partway through.
struct FailingSecondRead {
    opened: AtomicUsize,
}

impl ContentSource for FailingSecondRead {
    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        if self.opened.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Box::new(&[9u8; 1000][..]));
        }
        Ok(Box::new((&[9u8; 100][..]).chain(FailingReader)))
    }
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("source vanished"))
    }
}

/// Content that grows between the two reads of an archive pass.
struct Growing {
    opened: AtomicUsize,
}

impl ContentSource for Growing {
    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        let len = 10 * (1 + self.opened.fetch_add(1, Ordering::SeqCst));
        Ok(Box::new(io::repeat(b'g').take(len as u64)))
    }
}

#[test]
fn missing_trailer_between_sessions() {
    init_test_logging();
    let fs = TestFilesystem::memory();
    fs.archive(&[SourceEntry::file("a", vec![b'a'; 10])]).unwrap();

    // Drop the trailer, as if the session had been cut off after its
    // last entry.
    let container = fs.container().unwrap();
    container.truncate(container.len() - END_OF_ARCHIVE.len() as u64);

    let positions = fs.archive(&[SourceEntry::file("b", vec![b'b'; 10])]).unwrap();
    assert_eq!(positions, [LogPosition::new(2, 1)]);

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(tree_names(&reopened), ["a", "b"]);
    assert_eq!(read(&reopened, "b"), vec![b'b'; 10]);
}

#[test]
fn corrupted_trailer_is_stepped_over() {
    let fs = TestFilesystem::memory();
    let container = fs.container().unwrap();
    // The root entry takes three blocks; its trailer follows.
    container.patch(3 * BLOCK_SIZE, &[0xFF; 2 * BLOCK_SIZE as usize]);

    fs.archive(&[SourceEntry::file("a", b"still here".to_vec())])
        .unwrap();
    assert_eq!(read(&fs, "a"), b"still here");

    let reopened = fs.reopen();
    let report = reopened.reindex().unwrap();
    assert_eq!(report.applied, 2);
    assert!(report.resyncs >= 2);
    assert_eq!(tree_names(&reopened), ["a"]);
}

#[test]
fn damaged_tape_record_loses_only_its_session() {
    let fs = TestFilesystem::tape();
    fs.archive(&[
        SourceEntry::file("a", vec![b'a'; 10]),
        SourceEntry::file("b", vec![b'b'; 10]),
    ])
    .unwrap();
    fs.archive(&[SourceEntry::file("c", vec![b'c'; 10])]).unwrap();

    let tape = fs.virtual_tape().unwrap();
    let record_bytes = geometry().record_bytes() as usize;
    tape.patch_record(3, 0, &vec![0xEE; record_bytes]).unwrap();

    let reopened = fs.reopen();
    let report = reopened.reindex().unwrap();
    assert!(reopened.stat(ROOT).is_ok());
    assert_eq!(tree_names(&reopened), ["c"]);
    assert_eq!(read(&reopened, "c"), vec![b'c'; 10]);
    assert!(report.resyncs >= 2);
}

#[test]
fn failed_content_keeps_the_log_readable() {
    let fs = TestFilesystem::memory();
    let err = fs
        .archive(&[
            SourceEntry::file("ok", b"fine".to_vec()),
            SourceEntry::file(
                "broken",
                FailingSecondRead {
                    opened: AtomicUsize::new(0),
                },
            ),
        ])
        .unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
    assert_eq!(read(&fs, "ok"), b"fine");

    fs.archive(&[SourceEntry::file("later", b"after the failure".to_vec())])
        .unwrap();

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(read(&reopened, "ok"), b"fine");
    assert_eq!(read(&reopened, "later"), b"after the failure");
}

#[test]
fn changed_source_is_reported() {
    let fs = TestFilesystem::memory();
    let err = fs
        .archive(&[SourceEntry::file(
            "growing.log",
            Growing {
                opened: AtomicUsize::new(0),
            },
        )])
        .unwrap_err();
    assert!(matches!(err, CoreError::SourceChanged { .. }));

    // The entry is complete on the medium, with the announced size.
    assert_eq!(fs.stat("growing.log").unwrap().size, 10);
    assert_eq!(read(&fs, "growing.log"), vec![b'g'; 10]);
}

#[test]
fn unknown_version_at_computed_position_is_fatal() {
    let fs = TestFilesystem::memory();
    fs.archive(&[SourceEntry::file("a", b"1".to_vec())]).unwrap();

    let container = fs.container().unwrap();
    let end = container.len() - END_OF_ARCHIVE.len() as u64;
    container.truncate(end);
    container.patch(end, &raw_entry("future", b"2", "2"));

    let reopened = fs.reopen();
    let err = reopened.reindex().unwrap_err();
    assert!(err.is_format());
    assert!(reopened.query(LogPosition::START).unwrap_err().is_format());
}

#[test]
fn unknown_version_is_skipped_while_scanning() {
    let fs = TestFilesystem::memory();
    fs.archive(&[SourceEntry::file("a", b"1".to_vec())]).unwrap();

    // Foreign content appended after the trailer: an entry this version
    // cannot read, then a readable one.
    let container = fs.container().unwrap();
    let mut tail = raw_entry("future", b"2", "2");
    tail.extend(raw_entry("b", b"3", "1"));
    container.patch(container.len(), &tail);

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(tree_names(&reopened), ["a", "b"]);
    assert_eq!(read(&reopened, "b"), b"3");
}

#[test]
fn foreign_tail_is_block_aligned_before_appending() {
    let fs = TestFilesystem::memory();
    let container = fs.container().unwrap();
    let end = container.len();
    container.patch(end, &[0u8; 100]);

    let positions = fs.archive(&[SourceEntry::file("a", b"x".to_vec())]).unwrap();
    assert_eq!(
        geometry().offset_of(positions[0]),
        end + BLOCK_SIZE,
        "entry starts on the next block boundary"
    );
    assert_eq!(read(&fs, "a"), b"x");
}

#[test]
fn sessions_resume_after_the_last_indexed_entry() {
    let fs = TestFilesystem::memory();
    let first = fs.archive(&[SourceEntry::file("a", b"1".to_vec())]).unwrap();
    let second = fs.archive(&[SourceEntry::file("b", b"2".to_vec())]).unwrap();

    assert_eq!(fs.store().last_indexed_position().unwrap(), Some(second[0]));
    assert!(first[0] < second[0]);

    // Deletions advance the high-water mark although their record is a
    // tombstone.
    let deleted = fs.delete("a").unwrap();
    assert_eq!(fs.store().last_indexed_position().unwrap(), Some(deleted[0]));
    fs.archive(&[SourceEntry::file("c", b"3".to_vec())]).unwrap();
    assert_eq!(tree_names(&fs), ["b", "c"]);
}
