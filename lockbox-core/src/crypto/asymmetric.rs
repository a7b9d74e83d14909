//! RSA-OAEP wrapping of item keys.
//!
//! Each user owns one item-encryption key pair. The public half is stored in
//! plaintext on the user row; the secret half is stored PKCS#8-encoded inside
//! a `ProtectedValue` under the master encryption key. Only small payloads
//! (item keys) are ever encrypted with it.

use crate::crypto::{CryptoError, CryptographicKey, Result};
use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;

/// Default modulus size in bits
pub const DEFAULT_KEY_BITS: usize = 2048;

/// A freshly generated item-encryption key pair
pub struct ItemEncryptionKeyPair {
    /// SubjectPublicKeyInfo DER
    pub public_key: Vec<u8>,
    /// PKCS#8 DER, zeroized on drop
    pub secret_key: CryptographicKey,
}

/// Generate a new RSA key pair of the given size
pub fn generate_key_pair(bits: usize) -> Result<ItemEncryptionKeyPair> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::EncryptionFailed(format!("key pair generation failed: {}", e)))?;

    let public_key = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| CryptoError::EncryptionFailed(format!("public key encoding failed: {}", e)))?
        .as_bytes()
        .to_vec();
    let secret_der = private_key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::EncryptionFailed(format!("secret key encoding failed: {}", e)))?;

    Ok(ItemEncryptionKeyPair {
        public_key,
        secret_key: CryptographicKey::from_bytes(secret_der.as_bytes().to_vec()),
    })
}

/// Encrypt a small payload for the holder of `public_key`
pub fn encrypt(public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let public_key = RsaPublicKey::from_public_key_der(public_key)
        .map_err(|e| CryptoError::EncryptionFailed(format!("invalid public key: {}", e)))?;

    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt a payload with the PKCS#8-encoded secret key
pub fn decrypt(secret_key: &CryptographicKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let private_key = RsaPrivateKey::from_pkcs8_der(secret_key.as_bytes())
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid secret key: {}", e)))?;

    private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
