//! AES-256-GCM encryption stage.
//!
//! Content is split into frames of [`CHUNK_SIZE`] plaintext bytes. Each
//! frame is stored as `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! and authenticated together with its index and a final-frame flag, so
//! frames cannot be reordered, dropped or appended. The final frame holds
//! fewer than [`CHUNK_SIZE`] bytes and may be empty; a stream that ends
//! without one was truncated.

use super::{Cipher, FinishWrite, StageReader, StageWriter};
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::io::{self, Read, Write};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Plaintext bytes per full frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Associated data of sealed headers.
const HEADER_AAD: &[u8] = b"STFS.EmbeddedHeader";

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a key from a password using HKDF-SHA256.
    ///
    /// HKDF does not slow down guessing; the password should already carry
    /// enough entropy, such as a generated passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyDerivationFailed`] if HKDF cannot expand
    /// the key.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"stfs-encryption-key-v1", &mut bytes)
            .map_err(|_| CoreError::key_derivation_failed("HKDF expand failed"))?;
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts content and headers with AES-256-GCM.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Creates a cipher with the given key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

impl Cipher for AesGcmCipher {
    fn suffix(&self) -> &str {
        ".aes"
    }

    fn encrypt<'a>(&self, sink: StageWriter<'a>) -> CoreResult<StageWriter<'a>> {
        Ok(Box::new(EncryptingWriter {
            cipher: self.cipher.clone(),
            inner: sink,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            index: 0,
        }))
    }

    fn decrypt<'a>(&self, source: StageReader<'a>) -> CoreResult<StageReader<'a>> {
        Ok(Box::new(DecryptingReader {
            cipher: self.cipher.clone(),
            inner: source,
            plain: Vec::new(),
            pos: 0,
            index: 0,
            done: false,
        }))
    }

    fn seal(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        encrypt_frame(&self.cipher, plaintext, HEADER_AAD)
    }

    fn open(&self, sealed: &[u8]) -> CoreResult<Vec<u8>> {
        decrypt_frame(&self.cipher, sealed, HEADER_AAD)
    }
}

fn frame_aad(index: u64, last: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = u8::from(last);
    aad
}

fn encrypt_frame(cipher: &Aes256Gcm, plaintext: &[u8], aad: &[u8]) -> CoreResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CoreError::encryption_failed("encryption error"))?;

    let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(&nonce_bytes);
    frame.extend(ciphertext);
    Ok(frame)
}

fn decrypt_frame(cipher: &Aes256Gcm, frame: &[u8], aad: &[u8]) -> CoreResult<Vec<u8>> {
    if frame.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CoreError::decryption_failed("ciphertext too short"));
    }
    let nonce = Nonce::from_slice(&frame[..NONCE_SIZE]);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &frame[NONCE_SIZE..],
                aad,
            },
        )
        .map_err(|_| CoreError::decryption_failed("decryption error"))
}

struct EncryptingWriter<'a> {
    cipher: Aes256Gcm,
    inner: StageWriter<'a>,
    buffer: Vec<u8>,
    index: u64,
}

impl EncryptingWriter<'_> {
    fn write_frame(&mut self, plaintext: &[u8], last: bool) -> CoreResult<()> {
        let frame = encrypt_frame(&self.cipher, plaintext, &frame_aad(self.index, last))?;
        self.inner.write_all(&frame).map_err(CoreError::from_io)?;
        self.index += 1;
        Ok(())
    }
}

impl Write for EncryptingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        // A full chunk is never the last frame: the final frame is written
        // by `finish`, possibly empty.
        while self.buffer.len() >= CHUNK_SIZE {
            let chunk: Vec<u8> = self.buffer.drain(..CHUNK_SIZE).collect();
            self.write_frame(&chunk, false).map_err(CoreError::into_io)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl FinishWrite for EncryptingWriter<'_> {
    fn finish(mut self: Box<Self>) -> CoreResult<()> {
        let rest = std::mem::take(&mut self.buffer);
        self.write_frame(&rest, true)?;
        self.inner.finish()
    }
}

struct DecryptingReader<'a> {
    cipher: Aes256Gcm,
    inner: StageReader<'a>,
    plain: Vec<u8>,
    pos: usize,
    index: u64,
    done: bool,
}

impl DecryptingReader<'_> {
    fn next_frame(&mut self) -> CoreResult<()> {
        let mut frame = vec![0u8; NONCE_SIZE + CHUNK_SIZE + TAG_SIZE];
        let n = read_full(&mut self.inner, &mut frame)?;
        if n == 0 {
            return Err(CoreError::decryption_failed("stream ends without final frame"));
        }
        // Only the final frame is shorter than a full one.
        let last = n < frame.len();
        self.plain = decrypt_frame(&self.cipher, &frame[..n], &frame_aad(self.index, last))?;
        self.pos = 0;
        self.index += 1;
        self.done = last;
        Ok(())
    }
}

impl Read for DecryptingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.plain.len() {
            if self.done {
                return Ok(0);
            }
            self.next_frame().map_err(CoreError::into_io)?;
        }
        let n = buf.len().min(self.plain.len() - self.pos);
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
