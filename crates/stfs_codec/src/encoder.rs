//! Serialization of wire headers into tar blocks.

use crate::entry::WireHeader;
use crate::error::{CodecError, CodecResult};
use crate::BLOCK_SIZE;
use std::io;
use tar::{Builder, EntryType, Header};

/// The two zero blocks that end a tar archive.
pub const END_OF_ARCHIVE: [u8; 2 * BLOCK_SIZE] = [0; 2 * BLOCK_SIZE];

/// Largest size an octal ustar size field can hold.
const MAX_USTAR_SIZE: u64 = 0o777_7777_7777;

/// Number of zero bytes that follow a payload of `len` bytes.
#[must_use]
pub const fn padding_for(len: u64) -> u64 {
    let rest = len % BLOCK_SIZE as u64;
    if rest == 0 {
        0
    } else {
        BLOCK_SIZE as u64 - rest
    }
}

/// Encodes a wire header as PAX extended header blocks followed by a ustar
/// header block.
///
/// The payload is not included; the caller writes `header.size` bytes of
/// content followed by [`padding_for`] zero bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if a field cannot be represented.
pub fn encode_header(wire: &WireHeader) -> CodecResult<Vec<u8>> {
    let fields = &wire.header;
    let mut pax: Vec<(String, String)> = wire
        .records
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::new(fields.kind.as_byte()));
    header.set_mode(fields.mode);
    header.set_uid(fields.uid);
    header.set_gid(fields.gid);
    header.set_mtime(u64::try_from(fields.mtime).unwrap_or(0));
    if fields.size > MAX_USTAR_SIZE {
        pax.push(("size".into(), fields.size.to_string()));
    } else {
        header.set_size(fields.size);
    }

    if !copy_name(&mut header.as_old_mut().name, &fields.name) {
        pax.push(("path".into(), fields.name.clone()));
    }
    if !copy_name(&mut header.as_old_mut().linkname, &fields.link_name) {
        pax.push(("linkpath".into(), fields.link_name.clone()));
    }
    if header.set_username(&fields.user_name).is_err() {
        pax.push(("uname".into(), fields.user_name.clone()));
    }
    if header.set_groupname(&fields.group_name).is_err() {
        pax.push(("gname".into(), fields.group_name.clone()));
    }
    header
        .set_device_major(fields.dev_major)
        .map_err(CodecError::encoding_failed)?;
    header
        .set_device_minor(fields.dev_minor)
        .map_err(CodecError::encoding_failed)?;
    if fields.atime != 0 {
        pax.push(("atime".into(), fields.atime.to_string()));
    }
    if fields.ctime != 0 {
        pax.push(("ctime".into(), fields.ctime.to_string()));
    }
    header.set_cksum();

    write_blocks(&pax, &header).map_err(CodecError::encoding_failed)
}

fn write_blocks(pax: &[(String, String)], header: &Header) -> io::Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    builder.append_pax_extensions(
        pax.iter()
            .map(|(key, value)| (key.as_str(), value.as_bytes())),
    )?;
    builder.append(header, io::empty())?;
    // Only the header blocks are wanted here; the session writes the
    // archive trailer once at its end.
    Ok(std::mem::take(builder.get_mut()))
}

/// Copies `name` into a fixed header field.
///
/// Returns `false` if the name does not fit and must go into a PAX record.
fn copy_name(field: &mut [u8; 100], name: &str) -> bool {
    let bytes = name.as_bytes();
    let fits = bytes.len() <= field.len();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogEntry;
    use crate::header::{EntryHeader, EntryKind};

    #[test]
    fn padding_rounds_to_block() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(1), 511);
        assert_eq!(padding_for(512), 0);
        assert_eq!(padding_for(513), 511);
    }

    #[test]
    fn header_is_block_aligned_without_trailer() {
        let wire = LogEntry::Create(EntryHeader::new("a.txt", EntryKind::Regular)).to_wire();
        let bytes = encode_header(&wire).unwrap();
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        // pax header, pax data, ustar header
        assert_eq!(bytes.len(), 3 * BLOCK_SIZE);
        assert_ne!(&bytes[bytes.len() - BLOCK_SIZE..], &[0u8; BLOCK_SIZE][..]);
    }

    #[test]
    fn header_carries_ustar_magic() {
        let wire = LogEntry::Create(EntryHeader::new("a.txt", EntryKind::Regular)).to_wire();
        let bytes = encode_header(&wire).unwrap();
        let last = &bytes[bytes.len() - BLOCK_SIZE..];
        assert_eq!(&last[257..263], b"ustar\0");
        assert_eq!(&last[..5], b"a.txt");
    }

    #[test]
    fn long_names_move_to_pax() {
        let name = "d/".repeat(80) + "file.txt";
        let wire = LogEntry::Create(EntryHeader::new(name.clone(), EntryKind::Regular)).to_wire();
        let bytes = encode_header(&wire).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains(&format!("path={name}\n")));
    }
}
