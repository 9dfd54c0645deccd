//! Header sealing.

use super::Pipeline;
use crate::error::{CoreError, CoreResult};
use stfs_codec::records;
use stfs_codec::{CodecError, EmbeddedHeader, WireHeader};

impl Pipeline {
    /// Seals a wire header when a cipher or signer is active.
    ///
    /// The whole header is serialized, signed and encrypted into an
    /// embedded header. The returned outer header only exposes the payload
    /// size. Without a cipher or signer the header is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal_header(&self, wire: &WireHeader) -> CoreResult<WireHeader> {
        if !self.seals_headers() {
            return Ok(wire.clone());
        }
        let serialized = EmbeddedHeader::serialize(wire)?;
        let signature = self.signer.as_ref().map(|signer| signer.sign(&serialized));
        let payload = match &self.cipher {
            Some(cipher) => cipher.seal(&serialized)?,
            None => serialized,
        };
        Ok(EmbeddedHeader { payload, signature }.into_shell(wire.header.size))
    }

    /// Reverses [`seal_header`](Self::seal_header).
    ///
    /// # Errors
    ///
    /// Returns a format error if a cipher or signer is active and the
    /// header carries no embedded header or no signature, if the embedded
    /// header cannot be decrypted, or if its signature does not match.
    pub fn unseal_header(&self, wire: WireHeader) -> CoreResult<WireHeader> {
        if !self.seals_headers() {
            return Ok(wire);
        }
        let embedded = EmbeddedHeader::from_shell(&wire)?.ok_or(CodecError::MissingRecord {
            key: records::EMBEDDED_HEADER,
        })?;
        let serialized = match &self.cipher {
            Some(cipher) => cipher.open(&embedded.payload)?,
            None => embedded.payload,
        };
        if let Some(signer) = &self.signer {
            let signature = embedded.signature.ok_or(CodecError::MissingRecord {
                key: records::SIGNATURE,
            })?;
            signer
                .verify(&serialized, &signature)
                .map_err(|_| CoreError::integrity_check_failed("embedded header signature"))?;
        }
        let inner = EmbeddedHeader::deserialize(&serialized)?;
        if inner.header.size != wire.header.size {
            return Err(CodecError::invalid_record(
                records::EMBEDDED_HEADER,
                format!(
                    "payload size {} differs from outer size {}",
                    inner.header.size, wire.header.size
                ),
            )
            .into());
        }
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AesGcmCipher, EncryptionKey, HmacSigner};
    use stfs_codec::{EntryHeader, EntryKind, LogEntry};

    fn wire() -> WireHeader {
        let mut header = EntryHeader::new("private/notes.txt", EntryKind::Regular);
        header.size = 1234;
        header.uncompressed_size = Some(4000);
        LogEntry::Create(header).to_wire()
    }

    #[test]
    fn identity_does_not_seal() {
        let pipeline = Pipeline::identity();
        assert_eq!(pipeline.seal_header(&wire()).unwrap(), wire());
        assert_eq!(pipeline.unseal_header(wire()).unwrap(), wire());
    }

    #[test]
    fn encrypted_header_hides_name() {
        let pipeline = Pipeline::identity().with_cipher(AesGcmCipher::new(&EncryptionKey::generate()));
        let sealed = pipeline.seal_header(&wire()).unwrap();

        assert_eq!(sealed.header.name, "");
        assert_eq!(sealed.header.size, 1234);
        let encoded = serde_json::to_string(&sealed).unwrap();
        assert!(!encoded.contains("notes"));

        assert_eq!(pipeline.unseal_header(sealed).unwrap(), wire());
    }

    #[test]
    fn signed_header_is_verified() {
        let pipeline = Pipeline::identity().with_signer(HmacSigner::new(b"k").unwrap());
        let sealed = pipeline.seal_header(&wire()).unwrap();
        assert!(sealed.records.contains_key(records::SIGNATURE));
        assert_eq!(pipeline.unseal_header(sealed.clone()).unwrap(), wire());

        let other = Pipeline::identity().with_signer(HmacSigner::new(b"other").unwrap());
        let err = other.unseal_header(sealed).unwrap_err();
        assert!(matches!(err, CoreError::IntegrityCheckFailed { .. }));
    }

    #[test]
    fn plain_header_rejected_when_sealing() {
        let pipeline = Pipeline::identity().with_signer(HmacSigner::new(b"k").unwrap());
        let err = pipeline.unseal_header(wire()).unwrap_err();
        assert!(err.is_format());
    }
}
