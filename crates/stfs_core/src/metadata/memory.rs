//! In-memory metadata store with an optional JSON snapshot.

use super::{alternate_name, is_below, MetadataRecord, MetadataStore};
use crate::dir::write_atomically;
use crate::error::CoreResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use stfs_storage::LogPosition;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    records: BTreeMap<String, MetadataRecord>,
    indexed: Option<LogPosition>,
}

impl StoreState {
    /// Finds the key a name is stored under.
    fn key_of(&self, name: &str) -> Option<String> {
        if self.records.contains_key(name) {
            return Some(name.to_string());
        }
        let alternate = alternate_name(name);
        self.records.contains_key(&alternate).then_some(alternate)
    }

    fn find(&self, name: &str) -> Option<&MetadataRecord> {
        self.key_of(name).and_then(|key| self.records.get(&key))
    }

    fn live_below(&self, dir: &str, direct: bool) -> Vec<MetadataRecord> {
        self.records
            .values()
            .filter(|record| !record.deleted && is_below(dir, &record.name, direct))
            .cloned()
            .collect()
    }
}

/// Metadata store kept in a `BTreeMap`.
///
/// With a snapshot path, [`flush`](MetadataStore::flush) writes the whole
/// index as JSON, replacing the previous snapshot atomically, and
/// [`open`](Self::open) loads it back.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl MemoryMetadataStore {
    /// Creates an empty store without a snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a snapshot file.
    ///
    /// A missing or empty file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or parsed.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let state = match fs::read(path) {
            Ok(data) if !data.is_empty() => serde_json::from_slice(&data)?,
            Ok(_) => StoreState::default(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), records = state.records.len(), "loaded index snapshot");
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path.to_path_buf()),
        })
    }

    /// Returns the snapshot path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the number of records, including tombstones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn upsert(&self, record: MetadataRecord) -> CoreResult<()> {
        let mut state = self.state.write();
        // One record per name, whichever spelling it was stored under.
        if let Some(key) = state.key_of(&record.name) {
            state.records.remove(&key);
        }
        state.records.insert(record.name.clone(), record);
        Ok(())
    }

    fn get(&self, name: &str) -> CoreResult<Option<MetadataRecord>> {
        let state = self.state.read();
        Ok(state.find(name).filter(|record| !record.deleted).cloned())
    }

    fn get_any(&self, name: &str) -> CoreResult<Option<MetadataRecord>> {
        Ok(self.state.read().find(name).cloned())
    }

    fn children(&self, name: &str) -> CoreResult<Vec<MetadataRecord>> {
        Ok(self.state.read().live_below(name, true))
    }

    fn descendants(&self, name: &str) -> CoreResult<Vec<MetadataRecord>> {
        Ok(self.state.read().live_below(name, false))
    }

    fn tombstone(&self, name: &str, position: LogPosition) -> CoreResult<()> {
        let mut state = self.state.write();
        match state.key_of(name) {
            Some(key) => {
                if let Some(record) = state.records.get_mut(&key) {
                    record.deleted = true;
                    record.last_known_position = Some(position);
                }
            }
            None => {
                state
                    .records
                    .insert(name.to_string(), MetadataRecord::tombstone(name, position));
            }
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> CoreResult<bool> {
        let mut state = self.state.write();
        let Some(key) = state.key_of(from) else {
            return Ok(false);
        };
        let Some(mut record) = state.records.remove(&key) else {
            return Ok(false);
        };
        if let Some(existing) = state.key_of(to) {
            state.records.remove(&existing);
        }
        record.name = to.to_string();
        state.records.insert(to.to_string(), record);
        Ok(true)
    }

    fn last_indexed_position(&self) -> CoreResult<Option<LogPosition>> {
        let state = self.state.read();
        let stored = state
            .records
            .values()
            .filter_map(MetadataRecord::furthest_position)
            .max();
        Ok(stored.max(state.indexed))
    }

    fn mark_indexed(&self, position: LogPosition) -> CoreResult<()> {
        let mut state = self.state.write();
        state.indexed = state.indexed.max(Some(position));
        Ok(())
    }

    fn purge(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.records.clear();
        state.indexed = None;
        Ok(())
    }

    fn all(&self) -> CoreResult<Vec<MetadataRecord>> {
        Ok(self.state.read().records.values().cloned().collect())
    }

    fn flush(&self) -> CoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_vec(&*self.state.read())?;
        write_atomically(path, &data)?;
        debug!(path = %path.display(), "wrote index snapshot");
        Ok(())
    }
}
