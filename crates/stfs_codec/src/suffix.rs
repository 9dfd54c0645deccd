//! File name suffixes of transformed content.

use crate::entry::LogEntry;

/// Suffixes appended to the names of regular files whose content was
/// transformed.
///
/// The compression suffix comes first, then the encryption suffix, so a
/// file `a.txt` stored compressed and encrypted appears on the medium as
/// `a.txt.zst.aes`. Stripping happens in reverse order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSuffixes {
    compression: Option<String>,
    encryption: Option<String>,
}

impl NameSuffixes {
    /// Creates suffixes for the active formats.
    pub fn new(compression: Option<&str>, encryption: Option<&str>) -> Self {
        Self {
            compression: compression.filter(|s| !s.is_empty()).map(str::to_string),
            encryption: encryption.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Returns `true` if no suffix is applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compression.is_none() && self.encryption.is_none()
    }

    /// Appends the suffixes to `name`.
    #[must_use]
    pub fn apply(&self, name: &str) -> String {
        let mut name = name.to_string();
        for suffix in [&self.compression, &self.encryption].into_iter().flatten() {
            name.push_str(suffix);
        }
        name
    }

    /// Removes the suffixes from `name`, in reverse order of [`apply`](Self::apply).
    #[must_use]
    pub fn strip(&self, name: &str) -> String {
        let mut name = name;
        for suffix in [&self.encryption, &self.compression].into_iter().flatten() {
            name = name.strip_suffix(suffix.as_str()).unwrap_or(name);
        }
        name.to_string()
    }

    /// Returns a copy of `entry` with its regular-file name suffixed.
    #[must_use]
    pub fn apply_to(&self, entry: &LogEntry) -> LogEntry {
        self.rename(entry, |name| self.apply(name))
    }

    /// Returns a copy of `entry` with the suffixes of a regular-file name removed.
    #[must_use]
    pub fn strip_from(&self, entry: &LogEntry) -> LogEntry {
        self.rename(entry, |name| self.strip(name))
    }

    fn rename(&self, entry: &LogEntry, f: impl Fn(&str) -> String) -> LogEntry {
        entry.map_header(|header| {
            if header.kind.is_regular() && !self.is_empty() {
                header.renamed(f(&header.name))
            } else {
                header.clone()
            }
        })
    }
}
