//! Replay of log entries into a metadata store.

use super::reader::{EntryReader, IndexedEntry};
use crate::error::CoreResult;
use crate::metadata::{MetadataRecord, MetadataStore};
use crate::pipeline::Pipeline;
use stfs_codec::LogEntry;
use stfs_storage::{LogPosition, Medium};
use tracing::{debug, info, warn};

/// Where and how a replay starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexOptions {
    /// Position of the first entry to read.
    pub from: LogPosition,
    /// Number of entries to parse without applying.
    pub skip: u64,
    /// Clears the store before replaying.
    pub purge: bool,
}

impl IndexOptions {
    /// A full reindex from the start of the medium.
    #[must_use]
    pub fn full() -> Self {
        Self {
            from: LogPosition::START,
            skip: 0,
            purge: true,
        }
    }

    /// Resumes after the last indexed entry.
    ///
    /// The entry at `last` is already in the store, so it is parsed again
    /// only to find the next position. An empty store starts at the
    /// beginning of the medium.
    #[must_use]
    pub fn resume(last: Option<LogPosition>) -> Self {
        match last {
            Some(from) => Self {
                from,
                skip: 1,
                purge: false,
            },
            None => Self::default(),
        }
    }

    /// Sets the start position.
    #[must_use]
    pub fn from(mut self, from: LogPosition) -> Self {
        self.from = from;
        self
    }

    /// Sets the number of entries to skip.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Entries decoded, skipped ones included.
    pub parsed: u64,
    /// Entries applied to the store.
    pub applied: u64,
    /// Entries whose target was missing.
    pub orphaned: u64,
    /// Times the reader had to resynchronize.
    pub resyncs: u64,
    /// Position of the last decoded entry.
    pub last_position: Option<LogPosition>,
}

/// Applies decoded entries to a metadata store.
pub struct IndexEngine<'a> {
    store: &'a dyn MetadataStore,
    pipeline: &'a Pipeline,
}

impl<'a> IndexEngine<'a> {
    /// Creates an engine writing into `store`.
    pub fn new(store: &'a dyn MetadataStore, pipeline: &'a Pipeline) -> Self {
        Self { store, pipeline }
    }

    /// Replays the medium into the store.
    ///
    /// # Errors
    ///
    /// Returns format errors found at computed positions, medium errors and
    /// store errors. Damaged regions and the end of data are not errors.
    pub fn replay(&self, medium: &mut dyn Medium, options: IndexOptions) -> CoreResult<IndexReport> {
        info!(
            record = options.from.record,
            block = options.from.block,
            skip = options.skip,
            purge = options.purge,
            "replaying log"
        );
        if options.purge {
            self.store.purge()?;
        }

        let mut report = IndexReport::default();
        let mut reader = EntryReader::new(medium, self.pipeline, options.from);
        for indexed in reader.by_ref() {
            let indexed = indexed?;
            report.parsed += 1;
            report.last_position = Some(indexed.position);
            if report.parsed <= options.skip {
                continue;
            }
            if self.apply(&indexed)? {
                report.applied += 1;
            } else {
                report.orphaned += 1;
            }
            self.store.mark_indexed(indexed.position)?;
        }
        report.resyncs = reader.resyncs();

        info!(
            parsed = report.parsed,
            applied = report.applied,
            orphaned = report.orphaned,
            resyncs = report.resyncs,
            "replay complete"
        );
        Ok(report)
    }

    /// Applies one entry. Returns `false` if its target was missing.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn apply(&self, indexed: &IndexedEntry) -> CoreResult<bool> {
        let position = indexed.position;
        debug!(
            record = position.record,
            block = position.block,
            name = indexed.entry.name(),
            action = %indexed.entry.action(),
            "applying entry"
        );

        match &indexed.entry {
            LogEntry::Create(header) => {
                self.store
                    .upsert(MetadataRecord::live(header, &indexed.records, position))?;
            }
            LogEntry::Delete(deletion) => {
                self.store.tombstone(&deletion.name, position)?;
            }
            LogEntry::Update(update) if update.replaces_content => {
                if let Some(old) = &update.replaces_name {
                    self.store.rename(old, &update.header.name)?;
                }
                self.store.upsert(MetadataRecord::live(
                    &update.header,
                    &indexed.records,
                    position,
                ))?;
            }
            LogEntry::Update(update) => {
                let target = update
                    .replaces_name
                    .as_deref()
                    .unwrap_or(&update.header.name);
                let Some(existing) = self.store.get(target)? else {
                    warn!(
                        record = position.record,
                        block = position.block,
                        name = target,
                        "update target not indexed, skipping"
                    );
                    return Ok(false);
                };
                let mut record = existing.with_metadata(&update.header, &indexed.records);
                if update.replaces_name.is_some() {
                    self.store.rename(&existing.name, &update.header.name)?;
                    record.name.clone_from(&update.header.name);
                }
                self.store.upsert(record)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use stfs_codec::records::Records;
    use stfs_codec::{Deletion, EntryHeader, EntryKind, Update};

    fn indexed(entry: LogEntry, record: u64) -> IndexedEntry {
        IndexedEntry {
            position: LogPosition::new(record, 0),
            entry,
            records: Records::new(),
            span: 1024,
        }
    }

    fn file(name: &str, size: u64) -> EntryHeader {
        let mut header = EntryHeader::new(name, EntryKind::Regular);
        header.size = size;
        header
    }

    #[test]
    fn create_then_delete() {
        let store = MemoryMetadataStore::new();
        let pipeline = Pipeline::identity();
        let engine = IndexEngine::new(&store, &pipeline);

        engine
            .apply(&indexed(LogEntry::Create(file("a.txt", 5)), 0))
            .unwrap();
        assert_eq!(
            store.get("a.txt").unwrap().unwrap().position,
            Some(LogPosition::new(0, 0))
        );

        engine
            .apply(&indexed(
                LogEntry::Delete(Deletion {
                    name: "a.txt".into(),
                }),
                3,
            ))
            .unwrap();
        assert!(store.get("a.txt").unwrap().is_none());
        let tombstone = store.get_any("a.txt").unwrap().unwrap();
        assert_eq!(tombstone.last_known_position, Some(LogPosition::new(3, 0)));
    }

    #[test]
    fn metadata_update_keeps_position() {
        let store = MemoryMetadataStore::new();
        let pipeline = Pipeline::identity();
        let engine = IndexEngine::new(&store, &pipeline);
        engine
            .apply(&indexed(LogEntry::Create(file("a.txt", 5)), 0))
            .unwrap();

        let mut header = EntryHeader::new("b.txt", EntryKind::Regular);
        header.mode = 0o600;
        let applied = engine
            .apply(&indexed(
                LogEntry::Update(Update {
                    header,
                    replaces_name: Some("a.txt".into()),
                    replaces_content: false,
                }),
                2,
            ))
            .unwrap();

        assert!(applied);
        assert!(store.get("a.txt").unwrap().is_none());
        let moved = store.get("b.txt").unwrap().unwrap();
        assert_eq!(moved.position, Some(LogPosition::new(0, 0)));
        assert_eq!(moved.size, 5);
        assert_eq!(moved.mode, 0o600);
    }

    #[test]
    fn content_update_moves_position() {
        let store = MemoryMetadataStore::new();
        let pipeline = Pipeline::identity();
        let engine = IndexEngine::new(&store, &pipeline);
        engine
            .apply(&indexed(LogEntry::Create(file("a.txt", 5)), 0))
            .unwrap();
        engine
            .apply(&indexed(
                LogEntry::Update(Update {
                    header: file("a.txt", 9),
                    replaces_name: None,
                    replaces_content: true,
                }),
                4,
            ))
            .unwrap();

        let record = store.get("a.txt").unwrap().unwrap();
        assert_eq!(record.position, Some(LogPosition::new(4, 0)));
        assert_eq!(record.size, 9);
    }

    #[test]
    fn update_of_unknown_name_is_skipped() {
        let store = MemoryMetadataStore::new();
        let pipeline = Pipeline::identity();
        let engine = IndexEngine::new(&store, &pipeline);

        let applied = engine
            .apply(&indexed(
                LogEntry::Update(Update {
                    header: file("ghost", 0),
                    replaces_name: None,
                    replaces_content: false,
                }),
                1,
            ))
            .unwrap();

        assert!(!applied);
        assert!(store.is_empty());
    }

    #[test]
    fn resume_options() {
        assert_eq!(IndexOptions::resume(None), IndexOptions::default());
        let resumed = IndexOptions::resume(Some(LogPosition::new(7, 3)));
        assert_eq!(resumed.from, LogPosition::new(7, 3));
        assert_eq!(resumed.skip, 1);
        assert!(!resumed.purge);
        assert!(IndexOptions::full().purge);
    }
}
