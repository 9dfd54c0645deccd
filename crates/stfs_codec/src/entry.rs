//! Typed log entries and their wire representation.

use crate::error::{CodecError, CodecResult};
use crate::header::{EntryHeader, EntryKind};
use crate::records::{self, Action, Records};
use serde::{Deserialize, Serialize};

/// A tar header together with its extended records.
///
/// This is what actually sits on the medium. `header` holds the plain tar
/// fields; the `STFS.*` meaning lives in `records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHeader {
    /// Plain header fields.
    pub header: EntryHeader,
    /// Extended records other than the standard PAX keys.
    pub records: Records,
}

/// New metadata, and optionally new content, for an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// The updated metadata, under the entry's new name.
    pub header: EntryHeader,
    /// The entry's previous name when it was renamed.
    pub replaces_name: Option<String>,
    /// `true` if a payload with new content follows the header.
    pub replaces_content: bool,
}

/// Removal of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    /// Name of the removed entry.
    pub name: String,
}

/// One immutable change to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A new entry, with content for regular files.
    Create(EntryHeader),
    /// A change to an existing entry.
    Update(Update),
    /// A removal.
    Delete(Deletion),
}

impl LogEntry {
    /// Returns the action of this entry.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::Create(_) => Action::Create,
            Self::Update(_) => Action::Update,
            Self::Delete(_) => Action::Delete,
        }
    }

    /// Returns the name this entry applies to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Create(header) => &header.name,
            Self::Update(update) => &update.header.name,
            Self::Delete(deletion) => &deletion.name,
        }
    }

    /// Returns the header of entries that carry one.
    #[must_use]
    pub fn header(&self) -> Option<&EntryHeader> {
        match self {
            Self::Create(header) => Some(header),
            Self::Update(update) => Some(&update.header),
            Self::Delete(_) => None,
        }
    }

    /// Returns `true` if a content payload follows the header.
    #[must_use]
    pub fn has_content(&self) -> bool {
        match self {
            Self::Create(header) => header.kind.is_regular(),
            Self::Update(update) => update.replaces_content && update.header.kind.is_regular(),
            Self::Delete(_) => false,
        }
    }

    /// Returns a copy of this entry with its header rewritten by `f`.
    ///
    /// Deletions have no header and are returned unchanged.
    #[must_use]
    pub fn map_header(&self, f: impl FnOnce(&EntryHeader) -> EntryHeader) -> Self {
        match self {
            Self::Create(header) => Self::Create(f(header)),
            Self::Update(update) => Self::Update(Update {
                header: f(&update.header),
                ..update.clone()
            }),
            Self::Delete(deletion) => Self::Delete(deletion.clone()),
        }
    }

    /// Builds the wire representation of this entry.
    #[must_use]
    pub fn to_wire(&self) -> WireHeader {
        let mut records = Records::new();
        records.insert(records::VERSION.into(), records::FORMAT_VERSION.into());
        records.insert(records::ACTION.into(), self.action().as_str().into());

        let header = match self {
            Self::Create(header) => {
                content_records(header, &mut records);
                header.clone()
            }
            Self::Update(update) => {
                if let Some(previous) = &update.replaces_name {
                    records.insert(records::REPLACES_NAME.into(), previous.clone());
                }
                records.insert(
                    records::REPLACES_CONTENT.into(),
                    update.replaces_content.to_string(),
                );
                if update.replaces_content {
                    content_records(&update.header, &mut records);
                    update.header.clone()
                } else {
                    EntryHeader {
                        size: 0,
                        ..update.header.clone()
                    }
                }
            }
            Self::Delete(deletion) => EntryHeader::new(deletion.name.clone(), EntryKind::Regular),
        };

        WireHeader {
            header: EntryHeader {
                uncompressed_size: None,
                signature: None,
                ..header
            },
            records,
        }
    }

    /// Interprets a wire header.
    ///
    /// # Errors
    ///
    /// Returns a format error if the version or action records are missing
    /// or unknown, or if a record value cannot be parsed.
    pub fn from_wire(wire: WireHeader) -> CodecResult<Self> {
        let WireHeader { header, records } = wire;
        records::check_version(&records)?;
        let action = records
            .get(records::ACTION)
            .ok_or(CodecError::MissingRecord {
                key: records::ACTION,
            })
            .and_then(|value| Action::parse(value))?;

        match action {
            Action::Create => Ok(Self::Create(with_content_records(header, &records)?)),
            Action::Update => {
                let replaces_content = match records.get(records::REPLACES_CONTENT) {
                    None => false,
                    Some(value) => value
                        .parse()
                        .map_err(|_| CodecError::invalid_record(records::REPLACES_CONTENT, value))?,
                };
                let replaces_name = records.get(records::REPLACES_NAME).cloned();
                let header = if replaces_content {
                    with_content_records(header, &records)?
                } else {
                    header
                };
                Ok(Self::Update(Update {
                    header,
                    replaces_name,
                    replaces_content,
                }))
            }
            Action::Delete => Ok(Self::Delete(Deletion { name: header.name })),
        }
    }
}

fn content_records(header: &EntryHeader, records: &mut Records) {
    if let Some(size) = header.uncompressed_size {
        records.insert(records::UNCOMPRESSED_SIZE.into(), size.to_string());
    }
    if let Some(signature) = &header.signature {
        records.insert(records::SIGNATURE.into(), signature.clone());
    }
}

fn with_content_records(header: EntryHeader, records: &Records) -> CodecResult<EntryHeader> {
    let uncompressed_size = records
        .get(records::UNCOMPRESSED_SIZE)
        .map(|value| {
            value
                .parse()
                .map_err(|_| CodecError::invalid_record(records::UNCOMPRESSED_SIZE, value))
        })
        .transpose()?;
    Ok(EntryHeader {
        uncompressed_size,
        signature: records.get(records::SIGNATURE).cloned(),
        ..header
    })
}
