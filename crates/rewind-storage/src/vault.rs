//! Authenticated encryption of secrets at rest.
//!
//! Blobs are self-contained: `format byte || 96-bit nonce || ciphertext+tag`.
//! The format byte is bound in as associated data, so altering any byte of a
//! blob makes [`decrypt`] fail instead of returning altered plaintext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use rewind_core::StoreError;
use serde::{de::DeserializeOwned, Serialize};

use crate::key_manager::EncryptionKey;

const FORMAT_V1: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, StoreError> {
    let cipher = build_cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &[FORMAT_V1],
            },
        )
        .map_err(|e| StoreError::storage(format!("encrypt failed: {e}")))?;

    let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    blob.push(FORMAT_V1);
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`] under the same key.
pub fn decrypt(blob: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, StoreError> {
    let (&format, rest) = blob
        .split_first()
        .ok_or_else(|| StoreError::decryption("empty ciphertext"))?;
    if format != FORMAT_V1 {
        return Err(StoreError::decryption(format!(
            "unknown format byte {format:#04x}"
        )));
    }
    if rest.len() < NONCE_LEN + TAG_LEN {
        return Err(StoreError::decryption(format!(
            "ciphertext truncated to {} bytes",
            blob.len()
        )));
    }

    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    build_cipher(key)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &[FORMAT_V1],
            },
        )
        .map_err(|_| StoreError::decryption("authentication failed (wrong key or corrupted data)"))
}

/// Serialize `value` to JSON and encrypt it.
pub fn seal_json<T: Serialize>(value: &T, key: &EncryptionKey) -> Result<Vec<u8>, StoreError> {
    let plaintext = serde_json::to_vec(value).map_err(StoreError::serialization)?;
    encrypt(&plaintext, key)
}

/// Decrypt a blob and parse the JSON inside.
pub fn open_json<T: DeserializeOwned>(blob: &[u8], key: &EncryptionKey) -> Result<T, StoreError> {
    let plaintext = decrypt(blob, key)?;
    serde_json::from_slice(&plaintext).map_err(StoreError::serialization)
}

fn build_cipher(key: &EncryptionKey) -> Result<Aes256Gcm, StoreError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| StoreError::InvalidKey {
        reason: format!("cipher init failed: {e}"),
    })
}
