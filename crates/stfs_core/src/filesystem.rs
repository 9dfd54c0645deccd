//! Filesystem facade.

use crate::cancel::{CancelFlag, Cancellable};
use crate::config::Config;
use crate::dir::StateDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEngine, IndexOptions, IndexReport, IndexedEntry};
use crate::log::{LogWriter, WriteMode};
use crate::metadata::{MemoryMetadataStore, MetadataRecord, MetadataStore, ROOT};
use crate::ops::archive::append_entry;
use crate::ops::fetch::{fetch_entry, query};
use crate::ops::mutate::{plan_delete, plan_move, plan_update};
use crate::ops::restore::{apply_dir_mode, restore_record, RestorePlan};
use crate::ops::{FetchedEntry, SourceEntry};
use crate::pipeline::Pipeline;
use parking_lot::{Mutex, RwLock};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use stfs_codec::{EntryHeader, EntryKind, LogEntry};
use stfs_storage::{Geometry, LogPosition, Medium, MediumSource, StorageError};
use tracing::{debug, info, warn, Span};

/// A tape filesystem on one medium.
///
/// `Filesystem` is the entry point to STFS. It provides:
/// - Write sessions that append entries (archive, update, delete, move)
/// - Indexing of the medium into a metadata store, with recovery
/// - Reads through the index (restore, read, stat, list) and without it
///   (fetch, query)
///
/// Every write session reindexes the entries it appended before it
/// returns, so the index always reflects the medium.
///
/// # Example
///
/// ```rust,ignore
/// use stfs_core::{Config, Filesystem, SourceEntry};
/// use stfs_storage::{Geometry, InMemoryContainer};
///
/// let container = InMemoryContainer::new(Geometry::default());
/// let fs = Filesystem::open(container, Config::default())?;
/// fs.initialize()?;
/// fs.archive(&[SourceEntry::file("hello.txt", b"hi".to_vec())])?;
///
/// let mut content = Vec::new();
/// fs.read_file("hello.txt", &mut content)?;
/// ```
///
/// # Concurrency
///
/// Write sessions exclude every other operation; reads may run together.
/// With a state directory, write sessions also hold an advisory lock
/// shared with other processes, failing with
/// [`CoreError::MediumLocked`] instead of waiting.
pub struct Filesystem {
    source: Box<dyn MediumSource>,
    config: Config,
    geometry: Geometry,
    pipeline: Pipeline,
    store: Arc<dyn MetadataStore>,
    state: Option<StateDir>,
    /// Write sessions take this exclusively, reads shared.
    session: RwLock<()>,
    /// Cached medium handle, opened on first use.
    handle: Mutex<Option<Box<dyn Medium>>>,
    /// Raised by `close` to stop the operation holding the handle.
    cancel: CancelFlag,
    span: Span,
}

impl Filesystem {
    /// Opens a filesystem on `source`.
    ///
    /// The medium itself is opened on first use. Content passes through the
    /// identity pipeline until [`with_pipeline`](Self::with_pipeline) sets
    /// another. The index is kept in memory; with a state directory and
    /// `persist_index`, it is loaded from and saved to a snapshot there.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the state
    /// directory or snapshot cannot be opened.
    pub fn open(source: impl MediumSource + 'static, config: Config) -> CoreResult<Self> {
        let geometry = config.geometry()?;
        let state = config
            .state_dir
            .as_deref()
            .map(StateDir::open)
            .transpose()?;
        let store: Arc<dyn MetadataStore> = match &state {
            Some(state) if config.persist_index => {
                Arc::new(MemoryMetadataStore::open(&state.index_path())?)
            }
            _ => Arc::new(MemoryMetadataStore::new()),
        };

        info!(
            medium = %source.describe(),
            record_size = config.record_size,
            "filesystem opened"
        );
        Ok(Self {
            source: Box::new(source),
            config,
            geometry,
            pipeline: Pipeline::identity(),
            store,
            state,
            session: RwLock::new(()),
            handle: Mutex::new(None),
            cancel: CancelFlag::default(),
            span: Span::none(),
        })
    }

    /// Sets the content pipeline.
    ///
    /// The pipeline must match the one the medium was written with.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replaces the metadata store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = store;
        self
    }

    /// Scopes every event of this filesystem to `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the content pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the metadata store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    // =========================================================================
    // Write sessions
    // =========================================================================

    /// Overwrites the medium with an empty filesystem.
    ///
    /// Everything on the medium is discarded; afterwards it holds a single
    /// root directory entry and the index is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns lock, medium and store errors.
    pub fn initialize(&self) -> CoreResult<LogPosition> {
        let mut root = EntryHeader::new(ROOT, EntryKind::Directory);
        root.mtime = now();
        let root = LogEntry::Create(root);
        self.write_session(WriteMode::Overwrite, |writer| {
            append_entry(writer, &self.pipeline, &root, None)
        })
    }

    /// Appends a CREATE entry for every source entry, in order.
    ///
    /// Returns the position of each entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SourceChanged`] if content changed while it was
    /// written; the entries already written stay indexed. Returns source,
    /// lock, medium and store errors.
    pub fn archive(&self, entries: &[SourceEntry]) -> CoreResult<Vec<LogPosition>> {
        for entry in entries {
            if entry.header.name.trim_matches('/').is_empty() {
                return Err(CoreError::invalid_operation("entry name must not be empty"));
            }
        }
        self.write_session(WriteMode::Append, |writer| {
            entries
                .iter()
                .map(|entry| {
                    let create = LogEntry::Create(entry.header.clone());
                    append_entry(writer, &self.pipeline, &create, entry.content.as_deref())
                })
                .collect()
        })
    }

    /// Archives the host tree at `root` under the name `prefix`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`SourceEntry::collect_tree`] and
    /// [`archive`](Self::archive).
    pub fn archive_tree(&self, root: &Path, prefix: &str) -> CoreResult<Vec<LogPosition>> {
        let entries = SourceEntry::collect_tree(root, prefix)?;
        self.archive(&entries)
    }

    /// Appends UPDATE entries for existing names.
    ///
    /// Regular files with content get new content; everything else gets new
    /// metadata only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for names that are not indexed, and
    /// the errors of [`archive`](Self::archive).
    pub fn update(&self, entries: &[SourceEntry]) -> CoreResult<Vec<LogPosition>> {
        self.write_session(WriteMode::Append, |writer| {
            let planned = entries
                .iter()
                .map(|entry| plan_update(&*self.store, entry))
                .collect::<CoreResult<Vec<_>>>()?;
            planned
                .iter()
                .zip(entries)
                .map(|(update, entry)| {
                    append_entry(writer, &self.pipeline, update, entry.content.as_deref())
                })
                .collect()
        })
    }

    /// Deletes `name` and, for a directory, everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not indexed, and lock,
    /// medium and store errors.
    pub fn delete(&self, name: &str) -> CoreResult<Vec<LogPosition>> {
        self.write_session(WriteMode::Append, |writer| {
            let planned = plan_delete(&*self.store, name)?;
            self.append_planned(writer, &planned)
        })
    }

    /// Moves `from` to `to`, including everything below a directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `from` is not indexed,
    /// [`CoreError::InvalidOperation`] if `to` exists or lies below `from`,
    /// and lock, medium and store errors.
    pub fn rename(&self, from: &str, to: &str) -> CoreResult<Vec<LogPosition>> {
        self.write_session(WriteMode::Append, |writer| {
            let planned = plan_move(&*self.store, from, to)?;
            self.append_planned(writer, &planned)
        })
    }

    fn append_planned(
        &self,
        writer: &mut LogWriter<'_>,
        planned: &[LogEntry],
    ) -> CoreResult<Vec<LogPosition>> {
        planned
            .iter()
            .map(|entry| append_entry(writer, &self.pipeline, entry, None))
            .collect()
    }

    /// Runs one write session and indexes what it appended.
    fn write_session<T>(
        &self,
        mode: WriteMode,
        f: impl FnOnce(&mut LogWriter<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let _entered = self.span.enter();
        let _session = self.session.write();
        let _lock = self.state.as_ref().map(StateDir::lock).transpose()?;
        let mut handle = self.handle.lock();

        let written = self.with_medium(&mut handle, |medium| {
            let mut writer = LogWriter::begin(medium, mode)?;
            let value = f(&mut writer);
            let finished = writer.finish();
            let value = value?;
            finished?;
            Ok(value)
        });

        let options = match mode {
            WriteMode::Overwrite => IndexOptions::full(),
            WriteMode::Append => IndexOptions::resume(self.store.last_indexed_position()?),
        };
        let indexed = self
            .with_medium(&mut handle, |medium| {
                IndexEngine::new(&*self.store, &self.pipeline).replay(medium, options)
            })
            .and_then(|_| self.persist());

        match (written, indexed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(index_err)) => {
                warn!(error = %index_err, "indexing after a failed session failed as well");
                Err(err)
            }
        }
    }

    fn persist(&self) -> CoreResult<()> {
        if self.config.persist_index {
            self.store.flush()?;
        }
        Ok(())
    }

    // =========================================================================
    // Indexing
    // =========================================================================

    /// Replays the medium into the index.
    ///
    /// # Errors
    ///
    /// Returns format errors at computed positions, medium errors and store
    /// errors.
    pub fn index(&self, options: IndexOptions) -> CoreResult<IndexReport> {
        let _entered = self.span.enter();
        let _session = self.session.read();
        let mut handle = self.handle.lock();
        let report = self.with_medium(&mut handle, |medium| {
            IndexEngine::new(&*self.store, &self.pipeline).replay(medium, options)
        })?;
        self.persist()?;
        Ok(report)
    }

    /// Rebuilds the index from scratch.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`index`](Self::index).
    pub fn reindex(&self) -> CoreResult<IndexReport> {
        self.index(IndexOptions::full())
    }

    // =========================================================================
    // Reads without the index
    // =========================================================================

    /// Decodes the entry at `position`, streaming its content into
    /// `destination` if given.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no entry starts there, and codec,
    /// integrity and medium errors.
    pub fn fetch(
        &self,
        position: LogPosition,
        destination: Option<&mut dyn Write>,
    ) -> CoreResult<FetchedEntry> {
        self.read_session(|medium| fetch_entry(medium, &self.pipeline, position, destination))
    }

    /// Lists the entries on the medium from `from` on.
    ///
    /// # Errors
    ///
    /// Returns format errors at computed positions and medium errors.
    pub fn query(&self, from: LogPosition) -> CoreResult<Vec<IndexedEntry>> {
        self.read_session(|medium| query(medium, &self.pipeline, from))
    }

    // =========================================================================
    // Reads through the index
    // =========================================================================

    /// Restores `name`, and everything below it for a directory, into
    /// `target`.
    ///
    /// Names keep their full path below `target`; with `flatten`, `name`
    /// itself lands directly in `target`. Returns the number of restored
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not indexed, integrity
    /// errors for damaged content, and host and medium errors.
    pub fn restore(&self, name: &str, target: &Path, flatten: bool) -> CoreResult<usize> {
        let record = self.stat(name)?;
        let mut records = vec![record.clone()];
        if record.is_dir() {
            records.extend(self.store.descendants(&record.name)?);
        }
        let plan = RestorePlan::new(target, &record.name, flatten);

        self.read_session(|medium| {
            for record in &records {
                restore_record(medium, &self.pipeline, record, &plan.host_path(&record.name)?)?;
            }
            Ok(())
        })?;
        // Directory permissions last, deepest first, so that read-only
        // directories do not block their children.
        for record in records.iter().rev() {
            apply_dir_mode(record, &plan.host_path(&record.name)?)?;
        }
        info!(name, count = records.len(), "restored");
        Ok(records.len())
    }

    /// Streams the decoded content of a regular file into `destination`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not indexed,
    /// [`CoreError::InvalidOperation`] if it is not a regular file, and
    /// integrity and medium errors.
    pub fn read_file(&self, name: &str, destination: &mut dyn Write) -> CoreResult<u64> {
        let record = self.stat(name)?;
        if !record.kind.is_regular() {
            return Err(CoreError::invalid_operation(format!(
                "{} is not a regular file",
                record.name
            )));
        }
        let position = record
            .position
            .ok_or_else(|| CoreError::not_found(record.name.clone()))?;
        let fetched = self.fetch(position, Some(destination))?;
        Ok(fetched.copied)
    }

    /// Returns the indexed record of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not indexed.
    pub fn stat(&self, name: &str) -> CoreResult<MetadataRecord> {
        let _session = self.session.read();
        self.store
            .get(name)?
            .ok_or_else(|| CoreError::not_found(name))
    }

    /// Returns the direct children of a directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not an indexed
    /// directory.
    pub fn list(&self, name: &str) -> CoreResult<Vec<MetadataRecord>> {
        self.directory(name)?;
        self.store.children(name)
    }

    /// Returns everything below a directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `name` is not an indexed
    /// directory.
    pub fn tree(&self, name: &str) -> CoreResult<Vec<MetadataRecord>> {
        self.directory(name)?;
        self.store.descendants(name)
    }

    fn directory(&self, name: &str) -> CoreResult<()> {
        // The root is listable even on media without a root entry.
        if name.trim_matches('/').is_empty() {
            return Ok(());
        }
        let record = self.stat(name)?;
        if !record.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "{} is not a directory",
                record.name
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Drive management
    // =========================================================================

    /// Returns the current position of the medium.
    ///
    /// # Errors
    ///
    /// Returns medium errors.
    pub fn tell(&self) -> CoreResult<LogPosition> {
        self.read_session(|medium| Ok(medium.current_position()?))
    }

    /// Ejects the medium.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for media that cannot be
    /// ejected.
    pub fn eject(&self) -> CoreResult<()> {
        let _entered = self.span.enter();
        let _session = self.session.write();
        let mut handle = self.handle.lock();
        self.with_medium(&mut handle, |medium| Ok(medium.eject()?))?;
        *handle = None;
        info!("medium ejected");
        Ok(())
    }

    /// Drops the cached medium handle.
    ///
    /// An operation running on the medium is interrupted at its next read
    /// or write and fails with [`CoreError::Cancelled`]. The next operation
    /// opens a fresh handle.
    pub fn close(&self) {
        self.cancel.cancel();
        let closed = self.handle.lock().take().is_some();
        self.cancel.reset();
        if closed {
            info!(parent: &self.span, "medium closed");
        }
    }

    fn read_session<T>(&self, f: impl FnOnce(&mut dyn Medium) -> CoreResult<T>) -> CoreResult<T> {
        let _entered = self.span.enter();
        let _session = self.session.read();
        let mut handle = self.handle.lock();
        self.with_medium(&mut handle, f)
    }

    /// Runs `f` on the cached handle, opening it first if needed.
    ///
    /// A handle whose medium failed is dropped: its position is unknown.
    fn with_medium<T>(
        &self,
        handle: &mut Option<Box<dyn Medium>>,
        f: impl FnOnce(&mut dyn Medium) -> CoreResult<T>,
    ) -> CoreResult<T> {
        if handle.is_none() {
            let medium = self.source.open()?;
            if medium.geometry() != self.geometry {
                return Err(CoreError::invalid_operation(format!(
                    "medium has {} blocks per record, configuration expects {}",
                    medium.geometry().record_size(),
                    self.geometry.record_size()
                )));
            }
            info!(medium = %self.source.describe(), kind = %medium.kind(), "medium opened");
            *handle = Some(Box::new(Cancellable::new(medium, self.cancel.clone())));
        }
        let medium = handle.as_deref_mut().ok_or(StorageError::Closed)?;
        let result = f(medium).map_err(|err| {
            if self.cancel.is_cancelled() {
                debug!(error = %err, "operation cancelled by close");
                CoreError::Cancelled
            } else {
                err
            }
        });
        if let Err(err @ (CoreError::Storage(_) | CoreError::Io(_))) = &result {
            warn!(error = %err, "medium failed, dropping handle");
            *handle = None;
        }
        result
    }
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("medium", &self.source.describe())
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
