//! AES-256-GCM encryption for stored OAuth tokens.
//!
//! Each token is encrypted separately with a unique random nonce. The
//! master key comes from an environment variable as base64 and must decode
//! to exactly 32 bytes.

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .map_err(|e| Error::Store(format!("invalid base64 encryption key: {e}")))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(Error::Store(format!(
            "encryption key must be {} bytes, got {}",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Encrypts a token with a fresh random nonce.
///
/// Returns `(ciphertext, nonce)`, both base64-encoded for storage.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<(String, String)> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Store(format!("failed to create cipher: {e}")))?;

    // Random nonce, never reused
    let nonce_bytes = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext_bytes = cipher
        .encrypt(&nonce_bytes, plaintext.as_bytes())
        .map_err(|e| Error::Store(format!("encryption failed: {e}")))?;

    Ok((BASE64.encode(&ciphertext_bytes), BASE64.encode(nonce_bytes)))
}

/// Decrypts a stored token.
///
/// Fails if the key or nonce does not match, or the ciphertext was
/// tampered with (authenticated encryption).
pub fn decrypt(ciphertext: &str, nonce: &str, key: &[u8]) -> Result<String> {
    let ciphertext_bytes = BASE64
        .decode(ciphertext)
        .map_err(|e| Error::Store(format!("invalid ciphertext encoding: {e}")))?;
    let nonce_bytes = BASE64
        .decode(nonce)
        .map_err(|e| Error::Store(format!("invalid nonce encoding: {e}")))?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(Error::Store(format!(
            "invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Store(format!("failed to create cipher: {e}")))?;

    let plaintext_bytes = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext_bytes.as_ref())
        .map_err(|_| Error::Store("decryption failed: wrong key or corrupted data".to_string()))?;

    String::from_utf8(plaintext_bytes)
        .map_err(|e| Error::Store(format!("decrypted token is not valid UTF-8: {e}")))
}
