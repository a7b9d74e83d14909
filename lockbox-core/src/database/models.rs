//! Syncable entities: users, items and item authorizations.
//!
//! Every entity carries a stable id, a `deleted` tombstone flag and a
//! `modified` timestamp that never decreases. Nothing is physically removed.

use crate::crypto::{CryptographicKey, KeyDerivationInformation, ProtectedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Common view over the three synchronized entity types
pub trait Syncable: Clone + PartialEq + Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Ord + Display + Debug + Send + Sync;

    fn id(&self) -> Self::Id;
    fn modified(&self) -> DateTime<Utc>;
    fn is_deleted(&self) -> bool;
}

/// A vault user and their protected key hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub master_password_authentication_hash: String,
    pub master_key_derivation_information: KeyDerivationInformation,
    pub protected_master_encryption_key: ProtectedValue<CryptographicKey>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub item_encryption_public_key: Vec<u8>,
    pub protected_item_encryption_secret_key: ProtectedValue<CryptographicKey>,
    pub protected_settings: ProtectedValue<UserSettings>,
    pub deleted: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modified: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

/// Per-user preferences, stored encrypted under the master encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Seconds of inactivity before the session locks
    pub auto_lock_timeout: u64,
    pub auto_lock_on_screen_off: bool,
    /// Seconds before a copied secret is wiped from the clipboard
    pub clipboard_clear_timeout: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_lock_timeout: 300,
            auto_lock_on_screen_off: true,
            clipboard_clear_timeout: 30,
        }
    }
}

/// A vault entry; its payload is encrypted under a per-item key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub owner_user_id: String,
    pub data: ProtectedValue<ItemData>,
    pub deleted: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modified: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

/// Decrypted item payload. Only ever lives in memory.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
}

impl Debug for ItemData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemData")
            .field("title", &self.title)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .finish()
    }
}

/// Grants one user access to one item by wrapping the item key under that
/// user's item-encryption public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAuthorization {
    pub id: Uuid,
    pub user_id: String,
    pub item_id: Uuid,
    pub item_key: ProtectedValue<CryptographicKey>,
    pub read_only: bool,
    pub deleted: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modified: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

impl Syncable for User {
    type Id = String;

    fn id(&self) -> String {
        self.username.clone()
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl Syncable for Item {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl Syncable for ItemAuthorization {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
