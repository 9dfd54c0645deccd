//! Tape tests on a drive that answers end of data with a zero-length read,
//! as the Linux `st` driver does.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use stfs_core::{CoreError, Filesystem, IndexOptions, IndexReport, MetadataStore, SourceEntry, ROOT};
use stfs_storage::LogPosition;
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

/// Indexes on another thread and fails if the scan does not end.
fn index_bounded(fs: Filesystem, options: IndexOptions) -> (Filesystem, Result<IndexReport, CoreError>) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let report = fs.index(options);
        let _ = tx.send((fs, report));
    });
    rx.recv_timeout(Duration::from_secs(10))
        .expect("indexing did not reach the end of data")
}

fn two_sessions() -> TestFilesystem {
    let fs = TestFilesystem::st_tape();
    let first = fs
        .archive(&[
            SourceEntry::file("a", vec![b'a'; 10]),
            SourceEntry::file("b", vec![b'b'; 10]),
        ])
        .unwrap();
    let second = fs.archive(&[SourceEntry::file("c", vec![b'c'; 10])]).unwrap();
    assert_eq!(first, [LogPosition::new(3, 0), LogPosition::new(4, 0)]);
    assert_eq!(second, [LogPosition::new(7, 0)]);
    fs
}

#[test]
fn full_index_stops_at_end_of_data() {
    init_test_logging();
    let fs = two_sessions();

    let (reopened, report) = index_bounded(fs.reopen(), IndexOptions::full());
    let report = report.unwrap();
    assert_eq!(report.applied, 4);
    assert_eq!(tree_names(&reopened), ["a", "b", "c"]);
    assert_eq!(read(&reopened, "b"), vec![b'b'; 10]);
}

#[test]
fn index_from_end_of_data_finds_nothing() {
    let fs = two_sessions();
    let tape = fs.virtual_tape().unwrap();
    let end = LogPosition::new(tape.len() as u64, 0);

    let (_reopened, report) = index_bounded(fs.reopen(), IndexOptions::default().from(end));
    let report = report.unwrap();
    assert_eq!(report.parsed, 0);
    assert_eq!(report.applied, 0);
}

#[test]
fn query_ends_after_the_last_session() {
    let fs = two_sessions();
    let entries = fs.query(LogPosition::START).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.entry.name().to_string()).collect();
    assert_eq!(names, [ROOT, "a", "b", "c"]);
}

#[test]
fn appends_resume_after_the_last_indexed_entry() {
    let fs = two_sessions();

    let deleted = fs.delete("a").unwrap();
    assert_eq!(fs.store().last_indexed_position().unwrap(), Some(deleted[0]));
    fs.archive(&[SourceEntry::file("d", b"later".to_vec())]).unwrap();
    assert_eq!(tree_names(&fs), ["b", "c", "d"]);

    let (reopened, report) = index_bounded(fs.reopen(), IndexOptions::full());
    report.unwrap();
    assert_eq!(tree_names(&reopened), ["b", "c", "d"]);
    assert_eq!(read(&reopened, "d"), b"later");
}

#[test]
fn damaged_record_loses_only_its_session() {
    let fs = two_sessions();
    let tape = fs.virtual_tape().unwrap();
    let record_bytes = geometry().record_bytes() as usize;
    tape.patch_record(3, 0, &vec![0xEE; record_bytes]).unwrap();

    let (reopened, report) = index_bounded(fs.reopen(), IndexOptions::full());
    assert!(report.unwrap().resyncs >= 2);
    assert_eq!(tree_names(&reopened), ["c"]);
}
