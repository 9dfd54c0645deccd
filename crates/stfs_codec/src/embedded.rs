//! Sealed headers carried inside a minimal outer header.
//!
//! When headers must stay confidential or be authenticated, the full wire
//! header is serialized, transformed by the caller (signed, encrypted) and
//! stored in the `STFS.EmbeddedHeader` and `STFS.Signature` records of an
//! outer header that only exposes the payload size.

use crate::entry::WireHeader;
use crate::error::{CodecError, CodecResult};
use crate::header::{EntryHeader, EntryKind};
use crate::records::{self, Records};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Encodes bytes for an extended record value.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes an extended record value.
///
/// # Errors
///
/// Returns [`CodecError::InvalidRecord`] naming `key` if the value is not
/// valid base64.
pub fn decode_base64(key: &str, value: &str) -> CodecResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|_| CodecError::invalid_record(key, value))
}

/// The transformed bytes of a sealed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedHeader {
    /// Serialized header after the caller's transformation.
    pub payload: Vec<u8>,
    /// Signature over the serialized header, if one was made.
    pub signature: Option<Vec<u8>>,
}

impl EmbeddedHeader {
    /// Serializes a wire header before it is sealed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncodingFailed`] if serialization fails.
    pub fn serialize(wire: &WireHeader) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(wire).map_err(CodecError::encoding_failed)
    }

    /// Parses a wire header after it was unsealed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidRecord`] if the bytes are not a
    /// serialized wire header.
    pub fn deserialize(bytes: &[u8]) -> CodecResult<WireHeader> {
        serde_json::from_slice(bytes).map_err(|err| {
            CodecError::invalid_record(records::EMBEDDED_HEADER, err.to_string())
        })
    }

    /// Builds the outer header for an entry with `payload_size` payload bytes.
    #[must_use]
    pub fn into_shell(self, payload_size: u64) -> WireHeader {
        let mut header = EntryHeader::new("", EntryKind::Regular);
        header.size = payload_size;

        let mut records = Records::new();
        records.insert(records::VERSION.into(), records::FORMAT_VERSION.into());
        records.insert(records::EMBEDDED_HEADER.into(), encode_base64(&self.payload));
        if let Some(signature) = &self.signature {
            records.insert(records::SIGNATURE.into(), encode_base64(signature));
        }
        WireHeader { header, records }
    }

    /// Extracts the sealed header from an outer header.
    ///
    /// Returns `Ok(None)` if the header is not sealed.
    ///
    /// # Errors
    ///
    /// Returns a format error if the outer header has an unknown version or
    /// undecodable record values.
    pub fn from_shell(wire: &WireHeader) -> CodecResult<Option<Self>> {
        let Some(payload) = wire.records.get(records::EMBEDDED_HEADER) else {
            return Ok(None);
        };
        records::check_version(&wire.records)?;
        let signature = wire
            .records
            .get(records::SIGNATURE)
            .map(|value| decode_base64(records::SIGNATURE, value))
            .transpose()?;
        Ok(Some(Self {
            payload: decode_base64(records::EMBEDDED_HEADER, payload)?,
            signature,
        }))
    }
}
