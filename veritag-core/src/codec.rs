//! QR payload codec — AES-256-GCM over the serialized payload.
//!
//! The codec is symmetric with the encode operation used at product
//! registration time: the same secret and serialization produce the
//! base64 string printed into the QR code. Decoding is fail-closed:
//! any base64, length, AEAD, or structural failure yields `None`, never
//! an error, and callers must treat `None` as an `INVALID` verdict.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CodecError;
use crate::types::QrPayload;

/// Size of the AES-GCM nonce prepended to the ciphertext.
const NONCE_LEN: usize = 12;

/// Width of one payload size-class bucket, in base64 characters.
///
/// The anomaly detector compares the size class of the presented payload
/// against prior scans of the same product; cloned or re-wrapped codes
/// tend to land in a different bucket.
const SIZE_CLASS_WIDTH: usize = 64;

/// Encrypts and decrypts the signed payload embedded in a product QR code.
pub struct QrCodec {
    cipher: Aes256Gcm,
}

impl QrCodec {
    /// Create a codec from a raw 32-byte key.
    pub fn from_key(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key).expect("32-byte key is always valid");
        Self { cipher }
    }

    /// Create a codec from a base64-encoded 32-byte secret.
    pub fn from_base64_secret(secret: &str) -> Result<Self, CodecError> {
        let key_bytes = base64_decode(secret).map_err(|e| CodecError::InvalidSecret {
            message: e.to_string(),
        })?;
        if key_bytes.len() != 32 {
            return Err(CodecError::InvalidKeyLength {
                got: key_bytes.len(),
            });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self::from_key(&key))
    }

    /// Generate a codec with a fresh random key. Intended for tests and
    /// local development; production keys come from configuration.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::from_key(&key)
    }

    /// Encrypt a payload into its QR wire form.
    ///
    /// Returns base64 of `nonce (12 bytes) || ciphertext`.
    pub fn encode(&self, payload: &QrPayload) -> Result<String, CodecError> {
        let plaintext = serde_json::to_vec(payload).map_err(|e| CodecError::Serialize {
            message: e.to_string(),
        })?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| CodecError::EncryptFailed {
                message: e.to_string(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(base64_encode(&combined))
    }

    /// Decrypt a QR wire string back into its payload.
    ///
    /// Fail-closed: returns `None` on any cryptographic or structural
    /// failure. A `None` result short-circuits the verification pipeline
    /// into the `INVALID` fast path.
    pub fn decode(&self, encoded: &str) -> Option<QrPayload> {
        let data = base64_decode(encoded).ok()?;
        if data.len() < NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }
}

/// Coarse size class of an encoded payload string.
pub fn payload_size_class(encoded: &str) -> u32 {
    (encoded.len() / SIZE_CLASS_WIDTH) as u32
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}
