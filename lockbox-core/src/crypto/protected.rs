//! The `ProtectedValue` envelope.
//!
//! A `ProtectedValue<T>` only ever holds ciphertext: the serialized `T`
//! encrypted under some key, together with everything needed to decrypt it
//! given that key (IV and algorithm id). Equality is defined over the raw
//! bytes, so the sync engine can tell whether a protected field changed
//! without decrypting it.

use crate::crypto::{asymmetric, cipher, CryptoError, CryptographicKey, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use tracing::warn;
use zeroize::Zeroizing;

/// Algorithm identifier stored with every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "RSA-2048-OAEP")]
    RsaOaep,
}

impl EncryptionAlgorithm {
    /// Required IV length in bytes
    pub fn iv_length(self) -> usize {
        match self {
            Self::Aes256Gcm => cipher::IV_LENGTH,
            Self::RsaOaep => 0,
        }
    }

    /// Required symmetric key length in bytes (`None` for asymmetric)
    pub fn key_length(self) -> Option<usize> {
        match self {
            Self::Aes256Gcm => Some(cipher::KEY_LENGTH),
            Self::RsaOaep => None,
        }
    }
}

/// Envelope-encrypted value of type `T`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct ProtectedValue<T> {
    #[serde(with = "crate::encoding::base64_bytes")]
    initialization_vector: Vec<u8>,
    encryption_algorithm: EncryptionAlgorithm,
    #[serde(with = "crate::encoding::base64_bytes")]
    encrypted_value: Vec<u8>,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProtectedValue<T> {
    /// Rebuild an envelope from stored parts
    pub fn from_parts(
        initialization_vector: Vec<u8>,
        encryption_algorithm: EncryptionAlgorithm,
        encrypted_value: Vec<u8>,
    ) -> Self {
        Self {
            initialization_vector,
            encryption_algorithm,
            encrypted_value,
            _marker: PhantomData,
        }
    }

    pub fn initialization_vector(&self) -> &[u8] {
        &self.initialization_vector
    }

    pub fn encryption_algorithm(&self) -> EncryptionAlgorithm {
        self.encryption_algorithm
    }

    pub fn encrypted_value(&self) -> &[u8] {
        &self.encrypted_value
    }

    fn require_symmetric(&self, key: &CryptographicKey) -> Result<()> {
        if self.encryption_algorithm != EncryptionAlgorithm::Aes256Gcm {
            return Err(CryptoError::InvalidArgument(format!(
                "{:?} envelope cannot be used with a symmetric key",
                self.encryption_algorithm
            )));
        }
        if Some(key.len()) != self.encryption_algorithm.key_length() {
            return Err(CryptoError::InvalidArgument(format!(
                "key length {} does not match {:?}",
                key.len(),
                self.encryption_algorithm
            )));
        }
        self.require_iv_length()
    }

    fn require_iv_length(&self) -> Result<()> {
        let expected = self.encryption_algorithm.iv_length();
        if self.initialization_vector.len() != expected {
            return Err(CryptoError::InvalidArgument(format!(
                "initialization vector length {} does not match {:?} ({})",
                self.initialization_vector.len(),
                self.encryption_algorithm,
                expected
            )));
        }
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned> ProtectedValue<T> {
    /// Encrypt `value` under `key` with a fresh IV
    ///
    /// Failures are logged and returned; an `Err` means "could not protect",
    /// never "protected an empty value".
    pub fn create(
        algorithm: EncryptionAlgorithm,
        key: &CryptographicKey,
        value: &T,
    ) -> Result<Self> {
        if algorithm != EncryptionAlgorithm::Aes256Gcm {
            return Err(CryptoError::InvalidArgument(format!(
                "{:?} is not a symmetric algorithm",
                algorithm
            )));
        }

        let iv = cipher::generate_initialization_vector();
        match Self::seal(&iv, key, value) {
            Ok(ciphertext) => Ok(Self::from_parts(iv, algorithm, ciphertext)),
            Err(e) => {
                warn!("Could not protect value: {}", e);
                Err(e)
            }
        }
    }

    fn seal(iv: &[u8], key: &CryptographicKey, value: &T) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?,
        );
        cipher::encrypt(iv, key.as_bytes(), &plaintext)
    }

    /// Decrypt and deserialize the value
    ///
    /// A wrong key, corrupted ciphertext and a malformed payload all fail
    /// with `DecryptionFailed`.
    pub fn decrypt(&self, key: &CryptographicKey) -> Result<T> {
        self.require_symmetric(key)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        let plaintext = Zeroizing::new(cipher::decrypt(
            &self.initialization_vector,
            key.as_bytes(),
            &self.encrypted_value,
        )?);
        serde_json::from_slice(&plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("malformed payload: {}", e)))
    }

    /// Re-encrypt with `new_value` under a fresh IV
    ///
    /// The IV and ciphertext are replaced together, and only once encryption
    /// has succeeded. On failure the envelope is left untouched.
    pub fn update(&mut self, key: &CryptographicKey, new_value: &T) -> Result<()> {
        if let Err(e) = self.require_symmetric(key) {
            warn!("Could not update protected value: {}", e);
            return Err(CryptoError::EncryptionFailed(e.to_string()));
        }

        let iv = cipher::generate_initialization_vector();
        match Self::seal(&iv, key, new_value) {
            Ok(ciphertext) => {
                self.initialization_vector = iv;
                self.encrypted_value = ciphertext;
                Ok(())
            }
            Err(e) => {
                warn!("Could not update protected value: {}", e);
                Err(e)
            }
        }
    }
}

impl ProtectedValue<CryptographicKey> {
    /// Wrap `key` for the holder of an item-encryption public key
    pub fn seal_key(public_key: &[u8], key: &CryptographicKey) -> Result<Self> {
        let ciphertext = asymmetric::encrypt(public_key, key.as_bytes()).map_err(|e| {
            warn!("Could not wrap key: {}", e);
            e
        })?;
        Ok(Self::from_parts(
            Vec::new(),
            EncryptionAlgorithm::RsaOaep,
            ciphertext,
        ))
    }

    /// Unwrap a key sealed with [`seal_key`](Self::seal_key)
    pub fn open_key(&self, secret_key: &CryptographicKey) -> Result<CryptographicKey> {
        if self.encryption_algorithm != EncryptionAlgorithm::RsaOaep {
            return Err(CryptoError::DecryptionFailed(format!(
                "{:?} envelope cannot be opened with a secret key",
                self.encryption_algorithm
            )));
        }
        self.require_iv_length()
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        let bytes = asymmetric::decrypt(secret_key, &self.encrypted_value)?;
        Ok(CryptographicKey::from_bytes(bytes))
    }
}

impl<T> Clone for ProtectedValue<T> {
    fn clone(&self) -> Self {
        Self::from_parts(
            self.initialization_vector.clone(),
            self.encryption_algorithm,
            self.encrypted_value.clone(),
        )
    }
}

impl<T> PartialEq for ProtectedValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.initialization_vector == other.initialization_vector
            && self.encryption_algorithm == other.encryption_algorithm
            && self.encrypted_value == other.encrypted_value
    }
}

impl<T> Eq for ProtectedValue<T> {}

impl<T> Hash for ProtectedValue<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.initialization_vector.hash(state);
        self.encryption_algorithm.hash(state);
        self.encrypted_value.hash(state);
    }
}

impl<T> fmt::Debug for ProtectedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedValue")
            .field("encryption_algorithm", &self.encryption_algorithm)
            .field("iv_len", &self.initialization_vector.len())
            .field("ciphertext_len", &self.encrypted_value.len())
            .finish()
    }
}
