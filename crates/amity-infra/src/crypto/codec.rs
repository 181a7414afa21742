//! AES-256-GCM message codec with per-message key material.
//!
//! Every encryption call draws a fresh random 16-byte salt and 12-byte
//! nonce, derives the key from the shared application secret and the salt
//! via PBKDF2-HMAC-SHA256, and encodes `salt || nonce || ciphertext+tag`
//! as base64. Decryption reverses this by fixed-offset slicing. Because
//! salt and nonce are never reused, two encryptions of identical plaintext
//! never produce identical envelopes.
//!
//! Decrypt failures degrade to a sentinel string rather than propagating:
//! one corrupted historical message must not block rendering of an entire
//! conversation.
//!
//! SECURITY: error types never contain plaintext or key material.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Salt length prepended to every envelope.
const SALT_LEN: usize = 16;

/// Nonce size for AES-256-GCM (96 bits / 12 bytes).
const NONCE_LEN: usize = 12;

/// GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Smallest decodable envelope: salt + nonce + tag around an empty body.
const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// PBKDF2 iteration count for key derivation.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Substituted for any message body that fails to decrypt.
pub const UNAVAILABLE_SENTINEL: &str = "[content unavailable]";

/// Errors from codec operations.
///
/// IMPORTANT: these never include plaintext, key material, or ciphertext
/// in their Display/Debug output.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid envelope encoding")]
    InvalidEncoding,

    #[error("envelope too short")]
    EnvelopeTooShort,
}

/// Per-message AES-256-GCM codec keyed off a shared application secret.
#[derive(Clone)]
pub struct MessageCodec {
    secret: SecretString,
}

impl MessageCodec {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Derive a 32-byte key from the shared secret and a per-message salt.
    fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            self.secret.expose_secret().as_bytes(),
            salt,
            PBKDF2_ITERATIONS,
            &mut key,
        );
        key
    }

    /// Encrypt plaintext into a base64 envelope.
    ///
    /// Fresh salt and nonce per call; identical plaintexts produce
    /// distinct envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new((&key).into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// A decoded payload shorter than the minimum envelope length is
    /// rejected before any decryption attempt.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        let raw = BASE64
            .decode(envelope)
            .map_err(|_| CipherError::InvalidEncoding)?;
        if raw.len() < MIN_ENVELOPE_LEN {
            return Err(CipherError::EnvelopeTooShort);
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new((&key).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidEncoding)
    }

    /// Decrypt, degrading any failure to the sentinel string. This is the
    /// read path for stored history: it never raises.
    pub fn decrypt_or_sentinel(&self, envelope: &str) -> String {
        match self.decrypt(envelope) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::warn!(error = %err, "message decrypt failed, substituting sentinel");
                UNAVAILABLE_SENTINEL.to_string()
            }
        }
    }
}
