//! Restoring indexed entries onto the host.

use super::fetch::fetch_entry;
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataRecord;
use crate::pipeline::Pipeline;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use stfs_codec::EntryKind;
use stfs_storage::Medium;
use tracing::{debug, warn};

/// Maps indexed names onto a host directory.
#[derive(Debug, Clone)]
pub(crate) struct RestorePlan {
    target: PathBuf,
    /// Prefix removed from every name.
    strip: String,
}

impl RestorePlan {
    /// Plans restoring `base` into `target`.
    ///
    /// Without `flatten`, names keep their full path below `target`. With
    /// it, `base` lands directly in `target`.
    pub(crate) fn new(target: &Path, base: &str, flatten: bool) -> Self {
        let strip = if flatten {
            base.trim_end_matches('/')
                .rsplit_once('/')
                .map(|(parent, _)| format!("{parent}/"))
                .unwrap_or_default()
        } else {
            String::new()
        };
        Self {
            target: target.to_path_buf(),
            strip,
        }
    }

    /// Returns the host path of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for names that would leave
    /// the target directory.
    pub(crate) fn host_path(&self, name: &str) -> CoreResult<PathBuf> {
        let relative = name.strip_prefix(&self.strip).unwrap_or(name);
        let relative = Path::new(relative.trim_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(CoreError::invalid_operation(format!(
                "refusing to restore {name} outside the target directory"
            )));
        }
        Ok(self.target.join(relative))
    }
}

/// Writes one record to `path`.
///
/// Directories are created, symbolic links recreated and regular files
/// fetched from the medium. Permissions are applied on Unix, except to
/// directories; see [`apply_dir_mode`].
pub(crate) fn restore_record(
    medium: &mut dyn Medium,
    pipeline: &Pipeline,
    record: &MetadataRecord,
    path: &Path,
) -> CoreResult<()> {
    debug!(name = %record.name, path = %path.display(), "restoring");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    match record.kind {
        EntryKind::Directory => fs::create_dir_all(path)?,
        EntryKind::Symlink => restore_symlink(&record.link_name, path)?,
        EntryKind::Regular => {
            let position = record
                .position
                .ok_or_else(|| CoreError::not_found(record.name.clone()))?;
            let mut file = File::create(path)?;
            let fetched = fetch_entry(medium, pipeline, position, Some(&mut file))?;
            if fetched.copied != record.size {
                return Err(CoreError::integrity_check_failed(format!(
                    "{}: restored {} bytes, expected {}",
                    record.name, fetched.copied, record.size
                )));
            }
            file.flush()?;
            apply_mode(path, record.mode)?;
        }
        kind => {
            warn!(name = %record.name, ?kind, "cannot restore this kind of entry, skipping");
        }
    }
    Ok(())
}

/// Applies a directory's permissions once its children are in place.
pub(crate) fn apply_dir_mode(record: &MetadataRecord, path: &Path) -> CoreResult<()> {
    if record.is_dir() {
        apply_mode(path, record.mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restore_symlink(target: &str, path: &Path) -> CoreResult<()> {
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path)?;
    }
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn restore_symlink(target: &str, path: &Path) -> CoreResult<()> {
    warn!(target, path = %path.display(), "symbolic links are not supported here, skipping");
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> CoreResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> CoreResult<()> {
    Ok(())
}
