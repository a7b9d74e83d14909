//! Key hierarchy and the unlocked key session.
//!
//! Implements the envelope chain:
//! Master Password → PBKDF2 → Master Key → Master Encryption Key →
//! Item Encryption Secret Key → (per authorization) Item Key → Item Data
//!
//! Only the vault session writes to a `KeySession`. Every decrypted buffer it
//! holds is wiped on [`KeySession::clear`] and on drop.

use crate::crypto::{
    asymmetric, derive_key, derive_local_authentication_hash, derive_server_authentication_hash,
    generate_encryption_key, CryptoError, CryptographicKey, EncryptionAlgorithm,
    KeyDerivationInformation, ProtectedValue, Result,
};
use crate::database::models::{Item, ItemAuthorization, ItemData, User, UserSettings};
use crate::encoding::now_millis;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroize;

/// Decrypted key material of an unlocked session.
pub struct KeySession {
    username: String,
    master_encryption_key: CryptographicKey,
    item_encryption_secret_key: CryptographicKey,
    item_keys: HashMap<Uuid, CryptographicKey>,
    items: HashMap<Uuid, ItemData>,
}

/// Result of unwrapping one item during unlock.
pub struct UnlockedItem {
    pub item_id: Uuid,
    pub item_key: CryptographicKey,
    pub data: ItemData,
}

impl KeySession {
    /// Unwrap the user's key chain with an already derived master key.
    ///
    /// Returns `None` when the master encryption key does not decrypt, which
    /// is the wrong-password signal. Any later failure is a damaged record.
    pub fn open(user: &User, master_key: &CryptographicKey) -> Result<Option<Self>> {
        let master_encryption_key = match user.protected_master_encryption_key.decrypt(master_key) {
            Ok(key) => key,
            Err(e) => {
                debug!("Master encryption key did not decrypt: {}", e);
                return Ok(None);
            }
        };
        let item_encryption_secret_key = user
            .protected_item_encryption_secret_key
            .decrypt(&master_encryption_key)?;

        Ok(Some(Self {
            username: user.username.clone(),
            master_encryption_key,
            item_encryption_secret_key,
            item_keys: HashMap::new(),
            items: HashMap::new(),
        }))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn master_encryption_key(&self) -> &CryptographicKey {
        &self.master_encryption_key
    }

    /// Unwrap an item key through the user's authorization and decrypt the item
    pub fn unwrap_item(
        &self,
        item: &Item,
        authorization: &ItemAuthorization,
    ) -> Result<UnlockedItem> {
        if authorization.item_id != item.id || authorization.user_id != self.username {
            return Err(CryptoError::InvalidArgument(format!(
                "authorization {} does not grant item {} to {}",
                authorization.id, item.id, self.username
            )));
        }
        let item_key = authorization
            .item_key
            .open_key(&self.item_encryption_secret_key)?;
        let data = item.data.decrypt(&item_key)?;

        Ok(UnlockedItem {
            item_id: item.id,
            item_key,
            data,
        })
    }

    /// Install an unwrapped item into the session
    pub fn insert_item(&mut self, unlocked: UnlockedItem) {
        if let Some(mut old) = self.items.insert(unlocked.item_id, unlocked.data) {
            old.zeroize();
        }
        self.item_keys.insert(unlocked.item_id, unlocked.item_key);
    }

    /// Forget a single item (deleted or revoked)
    pub fn remove_item(&mut self, item_id: &Uuid) {
        if let Some(mut data) = self.items.remove(item_id) {
            data.zeroize();
        }
        if let Some(mut key) = self.item_keys.remove(item_id) {
            key.zeroize();
        }
    }

    pub fn item_key(&self, item_id: &Uuid) -> Option<&CryptographicKey> {
        self.item_keys.get(item_id)
    }

    pub fn item(&self, item_id: &Uuid) -> Option<&ItemData> {
        self.items.get(item_id)
    }

    pub fn items(&self) -> impl Iterator<Item = (&Uuid, &ItemData)> {
        self.items.iter()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Unwrap every live item the session's user is authorized for.
    ///
    /// Items that fail to unwrap are logged and skipped.
    pub fn unwrap_items(
        &self,
        items: &[Item],
        authorizations: &[ItemAuthorization],
    ) -> Vec<UnlockedItem> {
        let mut unlocked = Vec::new();
        for item in items.iter().filter(|item| !item.deleted) {
            let Some(authorization) = authorizations.iter().find(|a| {
                a.item_id == item.id && a.user_id == self.username && !a.deleted
            }) else {
                continue;
            };
            match self.unwrap_item(item, authorization) {
                Ok(entry) => unlocked.push(entry),
                Err(e) => warn!("Skipping item {}: {}", item.id, e),
            }
        }
        unlocked
    }

    /// Replace the decrypted item set, wiping whatever was held before
    pub fn replace_items(&mut self, unlocked: Vec<UnlockedItem>) {
        for key in self.item_keys.values_mut() {
            key.zeroize();
        }
        for data in self.items.values_mut() {
            data.zeroize();
        }
        self.item_keys.clear();
        self.items.clear();
        for entry in unlocked {
            self.insert_item(entry);
        }
    }

    /// Wipe every decrypted buffer
    pub fn clear(&mut self) {
        self.master_encryption_key.zeroize();
        self.item_encryption_secret_key.zeroize();
        for key in self.item_keys.values_mut() {
            key.zeroize();
        }
        for data in self.items.values_mut() {
            data.zeroize();
        }
        self.item_keys.clear();
        self.items.clear();
    }

    /// True when neither key material nor decrypted item data is held
    pub fn is_cleared(&self) -> bool {
        self.master_encryption_key.is_cleared()
            && self.item_encryption_secret_key.is_cleared()
            && self.item_keys.is_empty()
            && self.items.is_empty()
    }
}

impl Drop for KeySession {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Parameters for building a new user's key hierarchy
pub struct UserKeyParameters {
    pub key_derivation_iterations: u32,
    pub authentication_iterations: u32,
    pub server_authentication_iterations: u32,
    pub item_encryption_key_bits: usize,
}

/// Build a new user with a fresh key hierarchy.
///
/// Returns the user row together with the already unlocked session.
pub fn create_user(
    username: &str,
    password: &str,
    params: &UserKeyParameters,
) -> Result<(User, KeySession)> {
    if username.trim().is_empty() {
        return Err(CryptoError::InvalidArgument(
            "username must not be blank".to_string(),
        ));
    }

    let derivation = KeyDerivationInformation::generate(params.key_derivation_iterations);
    let master_key = derive_key(password, &derivation)?;

    let master_encryption_key = generate_encryption_key();
    let protected_master_encryption_key = ProtectedValue::create(
        EncryptionAlgorithm::Aes256Gcm,
        &master_key,
        &master_encryption_key,
    )?;

    let key_pair = asymmetric::generate_key_pair(params.item_encryption_key_bits)?;
    let protected_item_encryption_secret_key = ProtectedValue::create(
        EncryptionAlgorithm::Aes256Gcm,
        &master_encryption_key,
        &key_pair.secret_key,
    )?;

    let protected_settings = ProtectedValue::create(
        EncryptionAlgorithm::Aes256Gcm,
        &master_encryption_key,
        &UserSettings::default(),
    )?;

    let local_hash =
        derive_local_authentication_hash(username, password, params.authentication_iterations)?;
    let authentication_hash =
        derive_server_authentication_hash(&local_hash, params.server_authentication_iterations)?;

    let now = now_millis();
    let user = User {
        username: username.to_string(),
        master_password_authentication_hash: authentication_hash,
        master_key_derivation_information: derivation,
        protected_master_encryption_key,
        item_encryption_public_key: key_pair.public_key.clone(),
        protected_item_encryption_secret_key,
        protected_settings,
        deleted: false,
        modified: now,
        created: now,
    };

    let session = KeySession {
        username: user.username.clone(),
        master_encryption_key,
        item_encryption_secret_key: key_pair.secret_key.clone(),
        item_keys: HashMap::new(),
        items: HashMap::new(),
    };

    Ok((user, session))
}

/// Build a new item owned by the session's user, plus the owner authorization.
pub fn create_item(
    session: &KeySession,
    owner: &User,
    data: &ItemData,
) -> Result<(Item, ItemAuthorization, UnlockedItem)> {
    let item_key = generate_encryption_key();
    let protected_data = ProtectedValue::create(EncryptionAlgorithm::Aes256Gcm, &item_key, data)?;

    let now = now_millis();
    let item = Item {
        id: Uuid::new_v4(),
        owner_user_id: session.username.clone(),
        data: protected_data,
        deleted: false,
        modified: now,
        created: now,
    };
    let authorization = authorize(&item, &item_key, owner, false)?;

    Ok((
        item.clone(),
        authorization,
        UnlockedItem {
            item_id: item.id,
            item_key,
            data: data.clone(),
        },
    ))
}

/// Wrap an item key for `grantee` into a new authorization row.
pub fn authorize(
    item: &Item,
    item_key: &CryptographicKey,
    grantee: &User,
    read_only: bool,
) -> Result<ItemAuthorization> {
    let wrapped = ProtectedValue::seal_key(&grantee.item_encryption_public_key, item_key)?;
    let now = now_millis();

    Ok(ItemAuthorization {
        id: Uuid::new_v4(),
        user_id: grantee.username.clone(),
        item_id: item.id,
        item_key: wrapped,
        read_only,
        deleted: false,
        modified: now,
        created: now,
    })
}

/// Re-wrap the master encryption key under a new password.
///
/// Works on a copy of the user; the caller decides when to commit it.
pub fn rewrap_master_encryption_key(
    user: &User,
    master_encryption_key: &CryptographicKey,
    new_password: &str,
    params: &UserKeyParameters,
) -> Result<User> {
    let derivation = KeyDerivationInformation::generate(params.key_derivation_iterations);
    let new_master_key = derive_key(new_password, &derivation)?;

    let mut updated = user.clone();
    updated
        .protected_master_encryption_key
        .update(&new_master_key, master_encryption_key)?;
    updated.master_key_derivation_information = derivation;

    let local_hash = derive_local_authentication_hash(
        &user.username,
        new_password,
        params.authentication_iterations,
    )?;
    updated.master_password_authentication_hash =
        derive_server_authentication_hash(&local_hash, params.server_authentication_iterations)?;

    Ok(updated)
}
