//! PBKDF2 key derivation for master password processing.
//!
//! Uses PBKDF2-HMAC-SHA256 with:
//! - Output length: 32 bytes (256 bits)
//! - Salt length: 32 bytes (equal to the output length)
//! - Iteration count stored per user in [`KeyDerivationInformation`]
//!
//! Passwords are trimmed and NFKD-normalized before use so that the same
//! password typed on different platforms or keyboards yields the same key.

use crate::crypto::{cipher::KEY_LENGTH, CryptoError, CryptographicKey, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::Hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

/// Salt length in bytes; always equal to the derived key length.
pub const SALT_LENGTH: usize = KEY_LENGTH;

const SERVER_HASH_SCHEME: &str = "pbkdf2-sha256";
const LOCAL_HASH_DOMAIN: &[u8] = b"lockbox/local-authentication/v1:";

/// Salt and iteration count used to derive a user's master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationInformation {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub salt: Vec<u8>,
    pub iteration_count: u32,
}

impl KeyDerivationInformation {
    /// Create fresh derivation information with a random salt
    pub fn generate(iteration_count: u32) -> Self {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self {
            salt,
            iteration_count,
        }
    }

    /// Verify the salt length and iteration count
    pub fn validate(&self) -> Result<()> {
        if self.salt.len() != SALT_LENGTH {
            return Err(CryptoError::InvalidArgument(format!(
                "salt length must be {} bytes, got {}",
                SALT_LENGTH,
                self.salt.len()
            )));
        }
        if self.iteration_count == 0 {
            return Err(CryptoError::InvalidArgument(
                "iteration count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trim surrounding whitespace and apply NFKD normalization.
pub fn normalize_password(password: &str) -> Zeroizing<String> {
    Zeroizing::new(password.trim().nfkd().collect())
}

fn pbkdf2_sha256(input: &[u8], salt: &[u8], iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
    let mut output = Zeroizing::new(vec![0u8; KEY_LENGTH]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(input, salt, iterations, &mut output)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(output)
}

/// Derive a 256-bit master key from a password
///
/// # Errors
/// - `InvalidArgument` if the password is blank or the derivation
///   information is malformed
/// - `KeyDerivationFailed` if the underlying PBKDF2 call fails
pub fn derive_key(password: &str, info: &KeyDerivationInformation) -> Result<CryptographicKey> {
    info.validate()?;
    let normalized = normalize_password(password);
    if normalized.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "password must not be blank".to_string(),
        ));
    }

    let output = pbkdf2_sha256(normalized.as_bytes(), &info.salt, info.iteration_count)?;
    Ok(CryptographicKey::from_bytes(output.to_vec()))
}

/// Derive the deterministic local authentication hash.
///
/// The salt is bound to the username, never to the user's random master key
/// salt, so this value reveals nothing about the master key.
pub fn derive_local_authentication_hash(
    username: &str,
    password: &str,
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>> {
    let normalized = normalize_password(password);
    if normalized.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "password must not be blank".to_string(),
        ));
    }
    if iterations == 0 {
        return Err(CryptoError::InvalidArgument(
            "iteration count must be positive".to_string(),
        ));
    }

    let username: String = username.trim().nfkd().collect::<String>().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(LOCAL_HASH_DOMAIN);
    hasher.update(username.as_bytes());
    let salt = hasher.finalize();

    pbkdf2_sha256(normalized.as_bytes(), &salt, iterations)
}

/// Server-side form of the authentication hash: salted and iterated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAuthenticationHash {
    pub iteration_count: u32,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

impl ServerAuthenticationHash {
    /// Encode as `pbkdf2-sha256$<iterations>$<salt>$<hash>`
    pub fn encode(&self) -> String {
        format!(
            "{}${}${}${}",
            SERVER_HASH_SCHEME,
            self.iteration_count,
            STANDARD.encode(&self.salt),
            STANDARD.encode(&self.hash)
        )
    }

    /// Parse the encoded form produced by [`encode`](Self::encode)
    pub fn parse(encoded: &str) -> Result<Self> {
        let invalid = || CryptoError::InvalidArgument("malformed authentication hash".to_string());

        let mut parts = encoded.split('$');
        if parts.next() != Some(SERVER_HASH_SCHEME) {
            return Err(invalid());
        }
        let iteration_count = parts
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let salt = parts
            .next()
            .and_then(|s| STANDARD.decode(s).ok())
            .ok_or_else(invalid)?;
        let hash = parts
            .next()
            .and_then(|s| STANDARD.decode(s).ok())
            .ok_or_else(invalid)?;
        if parts.next().is_some() || salt.len() != SALT_LENGTH || iteration_count == 0 {
            return Err(invalid());
        }

        Ok(Self {
            iteration_count,
            salt,
            hash,
        })
    }
}

/// Derive the value stored by (and sent to) the server from a local hash.
///
/// A fresh random salt is drawn for every call; it travels with the hash.
pub fn derive_server_authentication_hash(local_hash: &[u8], iterations: u32) -> Result<String> {
    if local_hash.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "local authentication hash must not be empty".to_string(),
        ));
    }
    if iterations == 0 {
        return Err(CryptoError::InvalidArgument(
            "iteration count must be positive".to_string(),
        ));
    }

    let mut salt = vec![0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    let hash = pbkdf2_sha256(local_hash, &salt, iterations)?;

    Ok(ServerAuthenticationHash {
        iteration_count: iterations,
        salt,
        hash: hash.to_vec(),
    }
    .encode())
}

/// Check a local hash against a stored server authentication hash.
///
/// Comparison is constant-time.
pub fn verify_server_authentication_hash(local_hash: &[u8], stored: &str) -> Result<bool> {
    let stored = ServerAuthenticationHash::parse(stored)?;
    let candidate = pbkdf2_sha256(local_hash, &stored.salt, stored.iteration_count)?;
    Ok(candidate.as_slice().ct_eq(stored.hash.as_slice()).into())
}
