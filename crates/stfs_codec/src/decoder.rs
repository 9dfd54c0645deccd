//! Parsing of one entry from a byte stream.

use crate::encoder::padding_for;
use crate::entry::WireHeader;
use crate::error::{CodecError, CodecResult};
use crate::header::{EntryHeader, EntryKind};
use crate::records::Records;
use std::io::Read;
use tar::{Archive, Entry};

/// A decoded wire header and the layout of its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// The header as found on the medium.
    pub wire: WireHeader,
    /// Bytes from the start of the entry to the start of its payload.
    pub header_len: u64,
    /// Payload bytes, without padding.
    pub payload_len: u64,
}

impl RawEntry {
    /// Bytes the whole entry occupies, including payload padding.
    #[must_use]
    pub fn span(&self) -> u64 {
        let end = self.header_len + self.payload_len;
        end + padding_for(end)
    }
}

/// Decodes the entry at the start of `reader`.
///
/// Returns `Ok(None)` if the stream is exhausted or starts with a zero
/// block. Otherwise `visit` is called with the header and a reader over
/// exactly the entry's payload, and its result is returned alongside the
/// header. The payload does not have to be consumed.
///
/// # Errors
///
/// Returns [`CodecError::Structure`] if the stream does not start with a
/// valid tar header, and any error returned by `visit`.
pub fn decode_entry<R, T, E, F>(reader: R, visit: F) -> Result<Option<(RawEntry, T)>, E>
where
    R: Read,
    E: From<CodecError>,
    F: FnOnce(&RawEntry, &mut dyn Read) -> Result<T, E>,
{
    let mut archive = Archive::new(reader);
    let mut entries = archive.entries().map_err(CodecError::structure)?;
    let mut entry = match entries.next() {
        None => return Ok(None),
        Some(Err(err)) => return Err(CodecError::structure(err).into()),
        Some(Ok(entry)) => entry,
    };
    let raw = read_raw(&mut entry)?;
    let value = visit(&raw, &mut entry)?;
    Ok(Some((raw, value)))
}

fn read_raw<R: Read>(entry: &mut Entry<'_, R>) -> CodecResult<RawEntry> {
    let mut records = Records::new();
    if let Some(extensions) = entry.pax_extensions().map_err(CodecError::structure)? {
        for extension in extensions {
            let extension = extension.map_err(CodecError::structure)?;
            let key = extension.key().map_err(CodecError::structure)?;
            let value = extension.value().map_err(CodecError::structure)?;
            records.insert(key.to_string(), value.to_string());
        }
    }

    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    let link_name = entry
        .link_name_bytes()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    // The archive starts at the entry, so this includes any PAX blocks.
    let header_len = entry.raw_file_position();
    let payload_len = entry.size();

    let tar_header = entry.header();
    let mut header = EntryHeader {
        name,
        link_name,
        kind: EntryKind::from_byte(tar_header.entry_type().as_byte()),
        size: payload_len,
        mode: tar_header.mode().map_err(CodecError::structure)?,
        uid: tar_header.uid().map_err(CodecError::structure)?,
        gid: tar_header.gid().map_err(CodecError::structure)?,
        user_name: text(tar_header.username()),
        group_name: text(tar_header.groupname()),
        mtime: i64::try_from(tar_header.mtime().map_err(CodecError::structure)?).unwrap_or(0),
        atime: 0,
        ctime: 0,
        dev_major: tar_header
            .device_major()
            .map_err(CodecError::structure)?
            .unwrap_or(0),
        dev_minor: tar_header
            .device_minor()
            .map_err(CodecError::structure)?
            .unwrap_or(0),
        uncompressed_size: None,
        signature: None,
    };
    apply_standard_records(&mut header, &mut records)?;

    Ok(RawEntry {
        wire: WireHeader { header, records },
        header_len,
        payload_len,
    })
}

fn text(field: Result<Option<&str>, std::str::Utf8Error>) -> String {
    field.ok().flatten().unwrap_or_default().to_string()
}

/// Moves standard PAX keys into the header fields they override.
fn apply_standard_records(header: &mut EntryHeader, records: &mut Records) -> CodecResult<()> {
    // path, linkpath and size are already applied by the tar reader.
    records.remove("path");
    records.remove("linkpath");
    records.remove("size");
    if let Some(value) = records.remove("uname") {
        header.user_name = value;
    }
    if let Some(value) = records.remove("gname") {
        header.group_name = value;
    }
    if let Some(value) = records.remove("uid") {
        header.uid = value
            .parse()
            .map_err(|_| CodecError::invalid_record("uid", value.as_str()))?;
    }
    if let Some(value) = records.remove("gid") {
        header.gid = value
            .parse()
            .map_err(|_| CodecError::invalid_record("gid", value.as_str()))?;
    }
    for (key, slot) in [
        ("mtime", &mut header.mtime),
        ("atime", &mut header.atime),
        ("ctime", &mut header.ctime),
    ] {
        if let Some(value) = records.remove(key) {
            *slot = parse_seconds(&value).ok_or_else(|| CodecError::invalid_record(key, value))?;
        }
    }
    Ok(())
}

/// Parses a PAX timestamp, dropping any fractional part.
fn parse_seconds(value: &str) -> Option<i64> {
    value.split('.').next().and_then(|seconds| seconds.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_header, END_OF_ARCHIVE};
    use crate::entry::{Deletion, LogEntry};
    use crate::BLOCK_SIZE;
    use std::io::Read as _;

    fn regular(name: &str, size: u64) -> EntryHeader {
        let mut header = EntryHeader::new(name, EntryKind::Regular);
        header.size = size;
        header.mode = 0o640;
        header.uid = 1000;
        header.gid = 100;
        header.user_name = "alice".into();
        header.group_name = "users".into();
        header.mtime = 1_700_000_000;
        header.atime = 1_700_000_100;
        header.ctime = 1_700_000_200;
        header
    }

    fn stream(wire: &WireHeader, payload: &[u8]) -> Vec<u8> {
        let mut bytes = encode_header(wire).unwrap();
        bytes.extend_from_slice(payload);
        bytes.resize(bytes.len() + padding_for(payload.len() as u64) as usize, 0);
        bytes
    }

    #[test]
    fn decodes_fields_and_payload() {
        let header = regular("dir/a.txt", 5);
        let wire = LogEntry::Create(header.clone()).to_wire();
        let bytes = stream(&wire, b"hello");

        let (raw, payload) = decode_entry(&bytes[..], |_, payload| {
            let mut content = Vec::new();
            payload.read_to_end(&mut content).map_err(CodecError::structure)?;
            Ok::<_, CodecError>(content)
        })
        .unwrap()
        .unwrap();

        assert_eq!(payload, b"hello");
        assert_eq!(raw.wire, wire);
        assert_eq!(raw.header_len, 3 * BLOCK_SIZE as u64);
        assert_eq!(raw.span(), bytes.len() as u64);
    }

    #[test]
    fn zero_block_is_end() {
        let result = decode_entry(&END_OF_ARCHIVE[..], |_, _| Ok::<_, CodecError>(())).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_stream_is_end() {
        let result = decode_entry(&[0u8; 0][..], |_, _| Ok::<_, CodecError>(())).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn garbage_is_structural() {
        let garbage = [0xAAu8; BLOCK_SIZE];
        let err = decode_entry(&garbage[..], |_, _| Ok::<_, CodecError>(())).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn long_names_survive() {
        let name = format!("{}/leaf.txt", "nested".repeat(30));
        let mut header = regular(&name, 0);
        header.kind = EntryKind::Symlink;
        header.link_name = format!("{}/target", "elsewhere".repeat(20));
        let wire = LogEntry::Create(header).to_wire();
        let bytes = stream(&wire, b"");

        let (raw, ()) = decode_entry(&bytes[..], |_, _| Ok::<_, CodecError>(()))
            .unwrap()
            .unwrap();
        assert_eq!(raw.wire, wire);
    }

    #[test]
    fn deletion_has_empty_payload() {
        let wire = LogEntry::Delete(Deletion {
            name: "gone.txt".into(),
        })
        .to_wire();
        let bytes = stream(&wire, b"");

        let (raw, read) = decode_entry(&bytes[..], |_, payload| {
            let mut content = Vec::new();
            payload.read_to_end(&mut content).map_err(CodecError::structure)?;
            Ok::<_, CodecError>(content.len())
        })
        .unwrap()
        .unwrap();
        assert_eq!(read, 0);
        assert_eq!(raw.payload_len, 0);
        assert_eq!(raw.span(), raw.header_len);
    }

    #[test]
    fn foreign_records_are_kept() {
        let mut wire = LogEntry::Create(regular("a", 0)).to_wire();
        wire.records
            .insert("SCHILY.xattr.user.tag".into(), "blue".into());
        let bytes = stream(&wire, b"");

        let (raw, ()) = decode_entry(&bytes[..], |_, _| Ok::<_, CodecError>(()))
            .unwrap()
            .unwrap();
        assert_eq!(raw.wire.records["SCHILY.xattr.user.tag"], "blue");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn spans_chain_back_to_back(
                files in prop::collection::vec(("[a-z]{1,12}(/[a-z]{1,12}){0,12}", 0usize..3000), 1..6)
            ) {
                let mut bytes = Vec::new();
                for (name, len) in &files {
                    let wire = LogEntry::Create(regular(name, *len as u64)).to_wire();
                    bytes.extend(stream(&wire, &vec![0x5A; *len]));
                }

                let mut offset = 0usize;
                for (name, len) in &files {
                    let (raw, ()) = decode_entry(&bytes[offset..], |_, _| Ok::<_, CodecError>(()))
                        .unwrap()
                        .unwrap();
                    prop_assert_eq!(&raw.wire.header.name, name);
                    prop_assert_eq!(raw.payload_len, *len as u64);
                    prop_assert_eq!(raw.span() % BLOCK_SIZE as u64, 0);
                    offset += raw.span() as usize;
                }
                prop_assert_eq!(offset, bytes.len());
            }
        }
    }
}
