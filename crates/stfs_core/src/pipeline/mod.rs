//! Content transform pipeline.
//!
//! Regular-file content passes through up to three stages. On write the
//! plaintext is signed, then compressed, then encrypted; on read the
//! payload is decrypted, then decompressed, then verified. Each stage is a
//! trait so algorithms can be swapped; this crate ships zstd compression,
//! AES-256-GCM encryption and HMAC-SHA256 signatures.
//!
//! The pipeline also decides how names and headers look on the medium:
//! active stages append name suffixes, and an active cipher or signer seals
//! every header into an embedded header (see [`Pipeline::seal_header`]).

mod compression;
mod encryption;
mod header;
mod signature;

pub use compression::ZstdCompressor;
pub use encryption::{AesGcmCipher, EncryptionKey, CHUNK_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use signature::HmacSigner;

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use stfs_codec::records;
use stfs_codec::{decode_base64, encode_base64, CodecError, EntryHeader, NameSuffixes};

/// Buffer size for streaming content through the stages.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A writer that must be finished to flush trailing state.
pub trait FinishWrite: Write {
    /// Writes any buffered state and finishes the wrapped writer.
    fn finish(self: Box<Self>) -> CoreResult<()>;
}

/// A boxed write stage.
pub type StageWriter<'a> = Box<dyn FinishWrite + 'a>;

/// A boxed read stage.
pub type StageReader<'a> = Box<dyn Read + 'a>;

/// Compression stage.
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Suffix appended to names of compressed files.
    fn suffix(&self) -> &str;

    /// Wraps `sink` so that bytes written are compressed into it.
    fn compress<'a>(&self, sink: StageWriter<'a>) -> CoreResult<StageWriter<'a>>;

    /// Wraps `source` so that reads yield decompressed bytes.
    fn decompress<'a>(&self, source: StageReader<'a>) -> CoreResult<StageReader<'a>>;
}

/// Encryption stage.
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Suffix appended to names of encrypted files.
    fn suffix(&self) -> &str;

    /// Wraps `sink` so that bytes written are encrypted into it.
    fn encrypt<'a>(&self, sink: StageWriter<'a>) -> CoreResult<StageWriter<'a>>;

    /// Wraps `source` so that reads yield decrypted bytes.
    fn decrypt<'a>(&self, source: StageReader<'a>) -> CoreResult<StageReader<'a>>;

    /// Encrypts a small message in one piece.
    fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts a message produced by [`seal`](Self::seal).
    fn open(&self, sealed: &[u8]) -> CoreResult<Vec<u8>>;
}

/// Signature stage.
pub trait Signer: Send + Sync + fmt::Debug {
    /// Starts an incremental signature.
    fn start(&self) -> Box<dyn SignatureState>;

    /// Signs `data` in one piece.
    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut state = self.start();
        state.update(data);
        state.sign()
    }

    /// Verifies a signature over `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IntegrityCheckFailed`] on mismatch.
    fn verify(&self, data: &[u8], signature: &[u8]) -> CoreResult<()> {
        let mut state = self.start();
        state.update(data);
        state.verify(signature)
    }
}

/// An incremental signature computation.
pub trait SignatureState: Send {
    /// Feeds more signed bytes.
    fn update(&mut self, data: &[u8]);

    /// Returns the signature over everything fed so far.
    fn sign(self: Box<Self>) -> Vec<u8>;

    /// Checks `signature` against everything fed so far.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IntegrityCheckFailed`] on mismatch.
    fn verify(self: Box<Self>, signature: &[u8]) -> CoreResult<()>;
}

/// Sizes and signature of transformed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStats {
    /// Bytes on the medium after all stages.
    pub physical_size: u64,
    /// Bytes of plaintext.
    pub logical_size: u64,
    /// Signature over the plaintext.
    pub signature: Option<Vec<u8>>,
}

/// The configured stages, in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    compressor: Option<Arc<dyn Compressor>>,
    cipher: Option<Arc<dyn Cipher>>,
    signer: Option<Arc<dyn Signer>>,
}

impl Pipeline {
    /// Creates a pipeline that stores content unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Adds a compression stage.
    #[must_use]
    pub fn with_compressor(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compressor = Some(Arc::new(compressor));
        self
    }

    /// Adds an encryption stage.
    #[must_use]
    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    /// Adds a signature stage.
    #[must_use]
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Returns `true` if no stage is active.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.compressor.is_none() && self.cipher.is_none() && self.signer.is_none()
    }

    /// Returns `true` if content bytes on the medium differ from the plaintext.
    #[must_use]
    pub fn transforms_content(&self) -> bool {
        self.compressor.is_some() || self.cipher.is_some()
    }

    /// Returns `true` if headers are sealed into embedded headers.
    #[must_use]
    pub fn seals_headers(&self) -> bool {
        self.cipher.is_some() || self.signer.is_some()
    }

    /// Returns the name suffixes of the active stages.
    #[must_use]
    pub fn suffixes(&self) -> NameSuffixes {
        NameSuffixes::new(
            self.compressor.as_ref().map(|c| c.suffix()),
            self.cipher.as_ref().map(|c| c.suffix()),
        )
    }

    /// Streams `source` through sign, compress and encrypt into `sink`.
    ///
    /// # Errors
    ///
    /// Returns any error of the source, the stages or the sink.
    pub fn transform(&self, source: &mut dyn Read, sink: &mut dyn Write) -> CoreResult<ContentStats> {
        let mut counter = CountingWriter::new(sink);
        let mut signature = self.signer.as_ref().map(|signer| signer.start());
        let mut logical_size = 0u64;

        let mut chain = self.writer_chain(&mut counter)?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if let Some(state) = signature.as_mut() {
                state.update(&buffer[..n]);
            }
            chain.write_all(&buffer[..n]).map_err(CoreError::from_io)?;
            logical_size += n as u64;
        }
        chain.finish()?;

        Ok(ContentStats {
            physical_size: counter.count(),
            logical_size,
            signature: signature.map(|state| state.sign()),
        })
    }

    /// Records the result of [`transform`](Self::transform) in a header.
    #[must_use]
    pub fn describe_content(&self, header: &EntryHeader, stats: &ContentStats) -> EntryHeader {
        EntryHeader {
            size: stats.physical_size,
            uncompressed_size: self
                .transforms_content()
                .then_some(stats.logical_size),
            signature: stats.signature.as_deref().map(encode_base64),
            ..header.clone()
        }
    }

    /// Wraps a payload reader so that it yields verified plaintext.
    ///
    /// # Errors
    ///
    /// Returns a format error if a signer is active and the header has no
    /// signature. Integrity failures surface from the returned reader.
    pub fn content_reader<'a>(
        &self,
        payload: StageReader<'a>,
        header: &EntryHeader,
    ) -> CoreResult<StageReader<'a>> {
        let mut reader = payload;
        if let Some(cipher) = &self.cipher {
            reader = cipher.decrypt(reader)?;
        }
        if let Some(compressor) = &self.compressor {
            reader = compressor.decompress(reader)?;
        }
        if self.is_identity() {
            return Ok(reader);
        }

        let signature = match &self.signer {
            Some(signer) => {
                let expected = header.signature.as_deref().ok_or(CodecError::MissingRecord {
                    key: records::SIGNATURE,
                })?;
                Some((signer.start(), decode_base64(records::SIGNATURE, expected)?))
            }
            None => None,
        };
        Ok(Box::new(VerifyingReader {
            inner: reader,
            expected_len: header.logical_size(),
            read: 0,
            signature,
            done: false,
        }))
    }

    fn writer_chain<'a>(&self, sink: &'a mut dyn Write) -> CoreResult<StageWriter<'a>> {
        let mut chain: StageWriter<'a> = Box::new(SinkStage(sink));
        if let Some(cipher) = &self.cipher {
            chain = cipher.encrypt(chain)?;
        }
        if let Some(compressor) = &self.compressor {
            chain = compressor.compress(chain)?;
        }
        Ok(chain)
    }
}

/// Innermost write stage.
struct SinkStage<'a>(&'a mut dyn Write);

impl Write for SinkStage<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishWrite for SinkStage<'_> {
    fn finish(mut self: Box<Self>) -> CoreResult<()> {
        self.0.flush().map_err(CoreError::from_io)
    }
}

/// Counts bytes passed to the wrapped writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Checks length and signature of plaintext once it is fully read.
struct VerifyingReader<'a> {
    inner: StageReader<'a>,
    expected_len: u64,
    read: u64,
    signature: Option<(Box<dyn SignatureState>, Vec<u8>)>,
    done: bool,
}

impl VerifyingReader<'_> {
    fn complete(&mut self) -> CoreResult<()> {
        self.done = true;
        if self.read != self.expected_len {
            return Err(CoreError::integrity_check_failed(format!(
                "content is {} bytes, header says {}",
                self.read, self.expected_len
            )));
        }
        if let Some((state, expected)) = self.signature.take() {
            state.verify(&expected)?;
        }
        Ok(())
    }
}

impl Read for VerifyingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.complete().map_err(CoreError::into_io)?;
            return Ok(0);
        }
        if let Some((state, _)) = self.signature.as_mut() {
            state.update(&buf[..n]);
        }
        self.read += n as u64;
        Ok(n)
    }
}
