//! Planning of update, delete and move entries.
//!
//! Planners only read the index; they return the entries a write session
//! appends. Operations on a directory produce one entry per affected name,
//! the directory first for moves and last for deletions.

use super::source::SourceEntry;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{is_below, MetadataRecord, MetadataStore, ROOT};
use stfs_codec::{Deletion, LogEntry, Update};

/// Plans the removal of `name` and, for a directory, everything below it.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if `name` is not indexed, and
/// [`CoreError::InvalidOperation`] for the root directory.
pub(crate) fn plan_delete(store: &dyn MetadataStore, name: &str) -> CoreResult<Vec<LogEntry>> {
    let record = live_record(store, name)?;
    if record.name == ROOT {
        return Err(CoreError::invalid_operation("cannot delete the root directory"));
    }

    let mut names = Vec::new();
    if record.is_dir() {
        names.extend(store.descendants(&record.name)?.into_iter().map(|r| r.name));
        // Children before their parents.
        names.reverse();
    }
    names.push(record.name);

    Ok(names
        .into_iter()
        .map(|name| LogEntry::Delete(Deletion { name }))
        .collect())
}

/// Plans moving `from` to `to`, carrying along everything below a
/// directory. Content stays where it is on the medium.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if `from` is not indexed and
/// [`CoreError::InvalidOperation`] if `to` exists, lies below `from`, or
/// either side is the root.
pub(crate) fn plan_move(store: &dyn MetadataStore, from: &str, to: &str) -> CoreResult<Vec<LogEntry>> {
    let record = live_record(store, from)?;
    let to = to.trim_end_matches('/');
    if record.name == ROOT || to.is_empty() {
        return Err(CoreError::invalid_operation("cannot move the root directory"));
    }
    if store.get(to)?.is_some() {
        return Err(CoreError::invalid_operation(format!("{to} already exists")));
    }
    let source_prefix = record.name.trim_end_matches('/').to_string();
    if is_below(&source_prefix, to, false) {
        return Err(CoreError::invalid_operation(format!(
            "cannot move {source_prefix} into itself"
        )));
    }

    let descendants = if record.is_dir() {
        store.descendants(&record.name)?
    } else {
        Vec::new()
    };
    let mut entries = vec![moved(&record, &format!("{to}{}", dir_slash(&record)))];
    for child in &descendants {
        let rest = child.name.strip_prefix(&source_prefix).unwrap_or(&child.name);
        entries.push(moved(child, &format!("{to}{rest}")));
    }
    Ok(entries)
}

/// Plans an update of an indexed entry from `source`.
///
/// A regular file with content gets its content replaced; anything else is
/// a metadata-only update.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the name is not indexed and
/// [`CoreError::InvalidOperation`] if the kind of object changes.
pub(crate) fn plan_update(store: &dyn MetadataStore, source: &SourceEntry) -> CoreResult<LogEntry> {
    let existing = live_record(store, &source.header.name)?;
    if existing.kind != source.header.kind {
        return Err(CoreError::invalid_operation(format!(
            "{} would change from {:?} to {:?}",
            existing.name, existing.kind, source.header.kind
        )));
    }
    Ok(LogEntry::Update(Update {
        header: source.header.renamed(existing.name),
        replaces_name: None,
        replaces_content: source.header.kind.is_regular() && source.content.is_some(),
    }))
}

fn live_record(store: &dyn MetadataStore, name: &str) -> CoreResult<MetadataRecord> {
    store.get(name)?.ok_or_else(|| CoreError::not_found(name))
}

fn moved(record: &MetadataRecord, to: &str) -> LogEntry {
    LogEntry::Update(Update {
        header: record.to_header().renamed(to),
        replaces_name: Some(record.name.clone()),
        replaces_content: false,
    })
}

fn dir_slash(record: &MetadataRecord) -> &'static str {
    if record.is_dir() {
        "/"
    } else {
        ""
    }
}
