//! Lockbox Core Library
//!
//! Envelope-encrypted vault with a synchronized key hierarchy: PBKDF2 master
//! key derivation, AES-256-GCM and RSA-OAEP wrapping, a local repository
//! interface and a last-write-wins sync engine against a remote webservice.

pub mod config;
pub mod crypto;
pub mod database;
mod encoding;
pub mod sync;
pub mod vault;

pub use config::VaultConfig;
pub use crypto::{
    CryptoError, CryptoResult, CryptographicKey, EncryptionAlgorithm, ProtectedValue,
};
pub use database::{
    Item, ItemAuthorization, ItemData, LocalRepository, MemoryRepository, RepositoryError, User,
    UserSettings,
};
pub use sync::{SyncReport, Webservice, WebserviceResponse};
pub use vault::{SessionState, VaultItem, VaultSession};

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// General error type for vault operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Master encryption key could not be decrypted")]
    DecryptMasterEncryptionKeyFailed,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Synchronization of {entity} failed: {reason}")]
    SynchronizationFailed { entity: String, reason: String },

    #[error("Request unauthorized")]
    RequestUnauthorized,

    #[error("Request forbidden")]
    RequestForbidden,

    #[error("Request conflicted")]
    RequestConflicted,

    #[error("Vault is locked")]
    VaultLocked,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Repository error: {0}")]
    Repository(#[from] database::RepositoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for the failures a user should see as "wrong master password"
    pub fn is_wrong_password(&self) -> bool {
        matches!(
            self,
            Self::DecryptMasterEncryptionKeyFailed
                | Self::AuthenticationFailed
                | Self::RequestUnauthorized
        )
    }
}
