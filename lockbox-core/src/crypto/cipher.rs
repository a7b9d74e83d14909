//! AES-256-GCM encryption and decryption.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key
//! - 96-bit (12 byte) initialization vector
//! - 128-bit authentication tag appended to the ciphertext
//!
//! The caller supplies the IV so it can be stored next to the ciphertext in a
//! [`ProtectedValue`](crate::crypto::ProtectedValue).

use crate::crypto::{CryptoError, CryptographicKey, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

/// Key length in bytes
pub const KEY_LENGTH: usize = 32;
/// Initialization vector length in bytes
pub const IV_LENGTH: usize = 12;
/// Authentication tag length in bytes
pub const TAG_LENGTH: usize = 16;

/// Generate a new random 256-bit encryption key
pub fn generate_encryption_key() -> CryptographicKey {
    let mut key = vec![0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    CryptographicKey::from_bytes(key)
}

/// Generate a new random 96-bit initialization vector
///
/// Never reuse an IV with the same key.
pub fn generate_initialization_vector() -> Vec<u8> {
    let mut iv = vec![0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn check_lengths(iv: &[u8], key: &[u8]) -> std::result::Result<(), String> {
    if key.len() != KEY_LENGTH {
        return Err(format!(
            "invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        ));
    }
    if iv.len() != IV_LENGTH {
        return Err(format!(
            "invalid initialization vector length: expected {}, got {}",
            IV_LENGTH,
            iv.len()
        ));
    }
    Ok(())
}

/// Encrypt data using AES-256-GCM
///
/// # Returns
/// `ciphertext || auth_tag(16)`
pub fn encrypt(iv: &[u8], key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_lengths(iv, key).map_err(CryptoError::EncryptionFailed)?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt data using AES-256-GCM
///
/// Returns an error if the authentication tag does not verify, which covers
/// both a wrong key and tampered data.
pub fn decrypt(iv: &[u8], key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_lengths(iv, key).map_err(CryptoError::DecryptionFailed)?;

    if ciphertext.len() < TAG_LENGTH {
        return Err(CryptoError::DecryptionFailed(
            "ciphertext too short - missing auth tag".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| {
            CryptoError::DecryptionFailed(
                "authentication failed - wrong key or tampered data".to_string(),
            )
        })
}
