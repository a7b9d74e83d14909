//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - PBKDF2 key derivation and authentication hashes
//! - AES-256-GCM encryption/decryption
//! - RSA-OAEP item key wrapping
//! - The `ProtectedValue` envelope
//! - The unlocked key session with zeroization

pub mod asymmetric;
pub mod cipher;
pub mod kdf;
pub mod key;
pub mod keyring;
pub mod protected;

pub use asymmetric::ItemEncryptionKeyPair;
pub use cipher::{generate_encryption_key, generate_initialization_vector};
pub use kdf::{
    derive_key, derive_local_authentication_hash, derive_server_authentication_hash,
    verify_server_authentication_hash, KeyDerivationInformation,
};
pub use key::CryptographicKey;
pub use keyring::KeySession;
pub use protected::{EncryptionAlgorithm, ProtectedValue};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
/// Alias for Result used in the public API
pub type CryptoResult<T> = Result<T>;
