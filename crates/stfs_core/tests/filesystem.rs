//! End-to-end tests of filesystem operations across media and pipelines.

use std::fs;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use stfs_codec::{EntryKind, LogEntry};
use stfs_core::{
    Config, CoreError, Filesystem, IndexOptions, MetadataRecord, MetadataStore, SourceEntry,
    StateDir, ROOT,
};
use stfs_storage::{InMemoryContainer, LogPosition};
use stfs_testkit::prelude::*;
use tempfile::TempDir;

fn names(records: &[MetadataRecord]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

fn read(fs: &Filesystem, name: &str) -> Vec<u8> {
    let mut content = Vec::new();
    fs.read_file(name, &mut content).unwrap();
    content
}

/// A destination that stalls on its first write until released.
struct Stalling {
    started: Option<Sender<()>>,
    release: Receiver<()>,
    written: usize,
}

impl Write for Stalling {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(started) = self.started.take() {
            started.send(()).unwrap();
            self.release.recv().unwrap();
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn entries_land_at_computed_positions() {
    init_test_logging();
    let fs = TestFilesystem::memory();

    let positions = fs
        .archive(&[
            SourceEntry::file("a.txt", vec![1u8; 10]),
            SourceEntry::file("b.bin", vec![2u8; 600]),
            SourceEntry::file("c.txt", Vec::new()),
        ])
        .unwrap();

    // Root (3 blocks) and its trailer (2 blocks) come first.
    assert_eq!(
        positions,
        [
            LogPosition::new(1, 1),
            LogPosition::new(2, 1),
            LogPosition::new(3, 2),
        ]
    );
    for (name, position) in ["a.txt", "b.bin", "c.txt"].iter().zip(&positions) {
        assert_eq!(fs.stat(name).unwrap().position, Some(*position));
    }
}

#[test]
fn tree_is_listed_and_read_back() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();

    assert_eq!(names(&fs.list(ROOT).unwrap()), ["docs/", "notes.txt"]);
    assert_eq!(
        names(&fs.list("docs").unwrap()),
        ["docs/latest", "docs/readme.txt", "docs/reports/"]
    );
    assert_eq!(fs.tree("docs/").unwrap().len(), 4);

    assert_eq!(read(&fs, "docs/readme.txt"), b"read me first\n");
    assert_eq!(read(&fs, "docs/reports/q1.csv"), sample_content(3000));

    let link = fs.stat("docs/latest").unwrap();
    assert_eq!(link.kind, EntryKind::Symlink);
    assert_eq!(link.link_name, "reports/q1.csv");
    assert_eq!(fs.stat("docs").unwrap().mtime, 1_700_000_000);

    assert!(matches!(
        fs.list("notes.txt"),
        Err(CoreError::InvalidOperation { .. })
    ));
}

#[test]
fn every_pipeline_round_trips() {
    for (label, pipeline) in pipeline_matrix() {
        let fs = TestFilesystem::memory_with(pipeline);
        fs.archive(&sample_tree()).unwrap();

        assert_eq!(
            read(&fs, "docs/reports/q1.csv"),
            sample_content(3000),
            "{label}"
        );
        assert_eq!(fs.stat("notes.txt").unwrap().size, 17, "{label}");

        // A fresh index built from the medium alone sees the same names.
        let reopened = fs.reopen();
        reopened.reindex().unwrap();
        assert_eq!(
            names(&reopened.tree(ROOT).unwrap()),
            names(&fs.tree(ROOT).unwrap()),
            "{label}"
        );

        let target = TempDir::new().unwrap();
        assert_eq!(reopened.restore("docs", target.path(), false).unwrap(), 5);
        assert_eq!(
            fs::read(target.path().join("docs/reports/q1.csv")).unwrap(),
            sample_content(3000),
            "{label}"
        );
    }
}

#[test]
fn delete_leaves_a_tombstone() {
    let fs = TestFilesystem::memory();
    fs.archive(&[SourceEntry::file("a.txt", b"gone soon".to_vec())])
        .unwrap();

    let deleted = fs.delete("a.txt").unwrap();
    assert_eq!(deleted.len(), 1);

    assert!(matches!(fs.stat("a.txt"), Err(CoreError::NotFound { .. })));
    let tombstone = fs.store().get_any("a.txt").unwrap().unwrap();
    assert!(tombstone.deleted);
    assert_eq!(tombstone.last_known_position, Some(deleted[0]));

    // The deletion itself is on the medium and can be fetched directly.
    let reopened = fs.reopen();
    let fetched = reopened.fetch(deleted[0], None).unwrap();
    assert!(matches!(fetched.indexed.entry, LogEntry::Delete(_)));
    assert_eq!(fetched.copied, 0);
}

#[test]
fn deleting_a_directory_removes_its_tree() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();

    let deleted = fs.delete("docs/").unwrap();
    assert_eq!(deleted.len(), 5);
    assert_eq!(names(&fs.tree(ROOT).unwrap()), ["notes.txt"]);

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(names(&reopened.tree(ROOT).unwrap()), ["notes.txt"]);
}

#[test]
fn moving_a_directory_keeps_content_in_place() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();
    let before = fs.stat("docs/reports/q1.csv").unwrap().position;

    let moved = fs.rename("docs", "archive").unwrap();
    assert_eq!(moved.len(), 5);

    assert!(matches!(fs.stat("docs/"), Err(CoreError::NotFound { .. })));
    let after = fs.stat("archive/reports/q1.csv").unwrap();
    assert_eq!(after.position, before);
    assert_eq!(read(&fs, "archive/reports/q1.csv"), sample_content(3000));
    assert!(fs.stat("archive/").unwrap().is_dir());

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(
        names(&reopened.tree(ROOT).unwrap()),
        [
            "archive/",
            "archive/latest",
            "archive/readme.txt",
            "archive/reports/",
            "archive/reports/q1.csv",
            "notes.txt",
        ]
    );
}

#[test]
fn invalid_moves_are_rejected() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();

    assert!(matches!(
        fs.rename("docs", "docs/reports/inner"),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert!(matches!(
        fs.rename("docs/readme.txt", "notes.txt"),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert!(matches!(
        fs.rename(ROOT, "elsewhere"),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert!(matches!(
        fs.rename("missing", "elsewhere"),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn content_update_moves_the_position() {
    let fs = TestFilesystem::memory();
    let created = fs
        .archive(&[SourceEntry::file("a.txt", b"first".to_vec())])
        .unwrap();

    let updated = fs
        .update(&[SourceEntry::file("a.txt", b"second version".to_vec())])
        .unwrap();
    assert_ne!(created, updated);

    let record = fs.stat("a.txt").unwrap();
    assert_eq!(record.position, Some(updated[0]));
    assert_eq!(record.size, 14);
    assert_eq!(read(&fs, "a.txt"), b"second version");
}

#[test]
fn metadata_update_keeps_the_content() {
    let fs = TestFilesystem::memory();
    let created = fs
        .archive(&[SourceEntry::file("a.txt", b"content".to_vec()).with_mode(0o600)])
        .unwrap();

    let mut changed = SourceEntry::file("a.txt", Vec::new()).with_mode(0o640);
    changed.content = None;
    fs.update(&[changed]).unwrap();

    let record = fs.stat("a.txt").unwrap();
    assert_eq!(record.mode, 0o640);
    assert_eq!(record.position, Some(created[0]));
    assert_eq!(read(&fs, "a.txt"), b"content");
}

#[test]
fn updating_an_unknown_name_fails() {
    let fs = TestFilesystem::memory();
    let err = fs
        .update(&[SourceEntry::file("missing.txt", b"x".to_vec())])
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn empty_names_are_rejected() {
    let fs = TestFilesystem::memory();
    let err = fs
        .archive(&[SourceEntry::directory("")])
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
}

#[test]
fn flattened_restore_drops_the_parent() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();

    let target = TempDir::new().unwrap();
    assert_eq!(fs.restore("docs/reports/", target.path(), true).unwrap(), 2);
    assert_eq!(
        fs::read(target.path().join("reports/q1.csv")).unwrap(),
        sample_content(3000)
    );
    assert!(!target.path().join("docs").exists());
}

#[cfg(unix)]
#[test]
fn restore_recreates_links_and_modes() {
    use std::os::unix::fs::PermissionsExt;

    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();

    let target = TempDir::new().unwrap();
    fs.restore("docs", target.path(), false).unwrap();

    let link = fs::read_link(target.path().join("docs/latest")).unwrap();
    assert_eq!(link, std::path::Path::new("reports/q1.csv"));
    let mode = fs::metadata(target.path().join("docs/readme.txt"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[test]
fn host_tree_is_archived_under_a_prefix() {
    let host = TempDir::new().unwrap();
    fs::create_dir_all(host.path().join("sub")).unwrap();
    fs::write(host.path().join("top.txt"), b"top").unwrap();
    fs::write(host.path().join("sub/inner.txt"), b"inner").unwrap();

    let fs = TestFilesystem::memory();
    let positions = fs.archive_tree(host.path(), "backup").unwrap();
    assert_eq!(positions.len(), 4);

    assert_eq!(
        names(&fs.tree("backup").unwrap()),
        ["backup/sub/", "backup/sub/inner.txt", "backup/top.txt"]
    );
    assert_eq!(read(&fs, "backup/sub/inner.txt"), b"inner");
}

#[test]
fn virtual_tape_keeps_sessions_apart() {
    let fs = TestFilesystem::tape();
    let first = fs
        .archive(&[
            SourceEntry::file("a", vec![b'a'; 10]),
            SourceEntry::file("b", vec![b'b'; 10]),
        ])
        .unwrap();
    let second = fs
        .archive(&[SourceEntry::file("c", vec![b'c'; 10])])
        .unwrap();

    // Every session starts on a fresh record after a file mark.
    assert_eq!(first, [LogPosition::new(3, 0), LogPosition::new(4, 0)]);
    assert_eq!(second, [LogPosition::new(7, 0)]);
    let tape = fs.virtual_tape().unwrap();
    assert!(tape.is_file_mark(2));
    assert!(tape.is_file_mark(6));
    assert!(tape.is_file_mark(9));

    let reopened = fs.reopen();
    let report = reopened.reindex().unwrap();
    assert_eq!(report.applied, 4);
    assert_eq!(read(&reopened, "c"), vec![b'c'; 10]);
}

#[test]
fn container_file_survives_reopening() {
    let fs = TestFilesystem::file();
    fs.archive(&sample_tree()).unwrap();
    fs.close();

    let reopened = fs.reopen();
    reopened.reindex().unwrap();
    assert_eq!(read(&reopened, "notes.txt"), b"remember the milk");
    assert_eq!(reopened.tree(ROOT).unwrap().len(), 6);
}

#[test]
fn query_lists_every_entry() {
    let fs = TestFilesystem::memory();
    fs.archive(&sample_tree()).unwrap();
    fs.delete("notes.txt").unwrap();

    let entries = fs.query(LogPosition::START).unwrap();
    let actions: Vec<_> = entries
        .iter()
        .map(|e| (e.entry.action().to_string(), e.entry.name().to_string()))
        .collect();
    assert_eq!(actions.len(), 8);
    assert_eq!(actions[0].1, ROOT);
    assert_eq!(actions[7], ("DELETE".to_string(), "notes.txt".to_string()));
}

#[test]
fn partial_index_options() {
    let fs = TestFilesystem::memory();
    let positions = fs.archive(&sample_tree()).unwrap();

    let reopened = fs.reopen();
    let report = reopened
        .index(IndexOptions::default().from(positions[3]).skip(1))
        .unwrap();
    assert_eq!(report.parsed, 3);
    assert_eq!(report.applied, 2);
    assert_eq!(
        names(&reopened.tree(ROOT).unwrap()),
        ["docs/latest", "notes.txt"]
    );
    assert_eq!(report.last_position, Some(positions[5]));
}

#[test]
fn held_lock_refuses_write_sessions() {
    let state = TempDir::new().unwrap();
    let config = test_config().state_dir(state.path());
    let fs = Filesystem::open(InMemoryContainer::new(geometry()), config).unwrap();
    fs.initialize().unwrap();

    let other = StateDir::open(state.path()).unwrap();
    let guard = other.lock().unwrap();
    let err = fs
        .archive(&[SourceEntry::file("a", b"x".to_vec())])
        .unwrap_err();
    assert!(matches!(err, CoreError::MediumLocked));

    drop(guard);
    fs.archive(&[SourceEntry::file("a", b"x".to_vec())]).unwrap();
}

#[test]
fn persisted_index_is_reloaded() {
    let state = TempDir::new().unwrap();
    let container = InMemoryContainer::new(geometry());
    let config = || {
        test_config()
            .state_dir(state.path())
            .persist_index(true)
    };

    let fs = Filesystem::open(container.clone(), config()).unwrap();
    fs.initialize().unwrap();
    fs.archive(&sample_tree()).unwrap();
    drop(fs);

    // No reindex: the snapshot alone knows the tree.
    let fs = Filesystem::open(container, config()).unwrap();
    assert_eq!(fs.tree(ROOT).unwrap().len(), 6);
    assert_eq!(read(&fs, "docs/readme.txt"), b"read me first\n");

    // Later sessions resume after the snapshot's last entry.
    fs.archive(&[SourceEntry::file("later.txt", b"later".to_vec())])
        .unwrap();
    assert_eq!(fs.tree(ROOT).unwrap().len(), 7);
}

#[test]
fn config_mismatch_is_rejected() {
    let container = InMemoryContainer::new(geometry());
    let fs = Filesystem::open(container, Config::default()).unwrap();
    assert!(matches!(
        fs.initialize(),
        Err(CoreError::InvalidOperation { .. })
    ));
}

#[test]
fn close_interrupts_a_running_read() {
    let fs = TestFilesystem::memory();
    let content = sample_content(1 << 20);
    fs.archive(&[SourceEntry::file("big.bin", content.clone())])
        .unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut destination = Stalling {
        started: Some(started_tx),
        release: release_rx,
        written: 0,
    };

    thread::scope(|scope| {
        let reader = scope.spawn(|| fs.read_file("big.bin", &mut destination));
        started_rx.recv().unwrap();

        // The read holds the medium; close has to interrupt it.
        let closer = scope.spawn(|| fs.close());
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        let err = reader.join().unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Cancelled), "{err}");
        closer.join().unwrap();
    });
    assert!(destination.written < content.len());

    // The next operation opens a fresh handle.
    assert_eq!(read(&fs, "big.bin"), content);
}
