//! HMAC-SHA256 signature stage.

use super::{SignatureState, Signer};
use crate::error::{CoreError, CoreResult};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs content and headers with HMAC-SHA256 under a shared secret.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    /// Creates a signer from a secret.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeySize`] for an empty secret.
    pub fn new(secret: &[u8]) -> CoreResult<Self> {
        if secret.is_empty() {
            return Err(CoreError::invalid_key_size(0, 32));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| CoreError::invalid_key_size(secret.len(), 32))?;
        Ok(Self { mac })
    }

    /// Derives a signing secret from a password using HKDF-SHA256.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CoreResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut secret = [0u8; 32];
        hk.expand(b"stfs-signing-key-v1", &mut secret)
            .map_err(|_| CoreError::key_derivation_failed("HKDF expand failed"))?;
        Self::new(&secret)
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("mac", &"HmacSha256")
            .finish()
    }
}

impl Signer for HmacSigner {
    fn start(&self) -> Box<dyn SignatureState> {
        Box::new(HmacState {
            mac: self.mac.clone(),
        })
    }
}

struct HmacState {
    mac: HmacSha256,
}

impl SignatureState for HmacState {
    fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    fn sign(self: Box<Self>) -> Vec<u8> {
        self.mac.finalize().into_bytes().to_vec()
    }

    fn verify(self: Box<Self>, signature: &[u8]) -> CoreResult<()> {
        self.mac
            .verify_slice(signature)
            .map_err(|_| CoreError::integrity_check_failed("signature mismatch"))
    }
}
