//! Vault session - coordinates the key hierarchy, the local store and sync

pub mod jobs;
#[cfg(test)]
mod tests;

pub use jobs::JobKind;

use crate::{
    config::VaultConfig,
    crypto::keyring::{self, KeySession, UnlockedItem},
    crypto::{derive_key, derive_local_authentication_hash, verify_server_authentication_hash},
    database::{Item, ItemAuthorization, ItemData, LocalRepository, User, UserSettings},
    encoding::next_modified,
    sync::{ConflictResolver, Resolution, SyncEngine, SyncReport, Webservice},
    Error, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use jobs::{blocking, JobRegistry};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Observable lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Locked,
    Unlocked,
}

/// Decrypted view of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultItem {
    pub id: Uuid,
    pub data: ItemData,
    pub read_only: bool,
}

struct Account {
    username: String,
    token: Option<String>,
}

struct SessionInner {
    config: VaultConfig,
    repository: Arc<dyn LocalRepository>,
    webservice: Option<Arc<dyn Webservice>>,
    account: RwLock<Option<Account>>,
    keys: RwLock<Option<KeySession>>,
    /// Held across unlock, lock, logout and the store writes of a sync pass
    transition: Mutex<()>,
    state: watch::Sender<SessionState>,
    jobs: JobRegistry,
}

/// Handle to one user's vault session. Cheap to clone.
#[derive(Clone)]
pub struct VaultSession {
    inner: Arc<SessionInner>,
}

impl VaultSession {
    /// Create a session backed only by the local store
    pub fn new(config: VaultConfig, repository: Arc<dyn LocalRepository>) -> Result<Self> {
        Self::build(config, repository, None)
    }

    /// Create a session that can register, log in and synchronize remotely
    pub fn with_webservice(
        config: VaultConfig,
        repository: Arc<dyn LocalRepository>,
        webservice: Arc<dyn Webservice>,
    ) -> Result<Self> {
        Self::build(config, repository, Some(webservice))
    }

    fn build(
        config: VaultConfig,
        repository: Arc<dyn LocalRepository>,
        webservice: Option<Arc<dyn Webservice>>,
    ) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(SessionState::LoggedOut);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                repository,
                webservice,
                account: RwLock::new(None),
                keys: RwLock::new(None),
                transition: Mutex::new(()),
                state,
                jobs: JobRegistry::default(),
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub async fn username(&self) -> Option<String> {
        self.inner
            .account
            .read()
            .await
            .as_ref()
            .map(|account| account.username.clone())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.inner.keys.read().await.is_some()
    }

    /// Create a new user in the local store and unlock it
    pub async fn create_local_user(&self, username: &str, password: &str) -> Result<()> {
        let inner = self.inner.clone();
        let username = username.to_string();
        let password = Zeroizing::new(password.to_string());
        self.inner
            .jobs
            .run(JobKind::Login, async move {
                inner.create_local_user(username, password).await
            })
            .await
    }

    /// Create a new user, register it with the webservice and unlock it.
    ///
    /// Nothing is stored locally unless the server accepts the registration.
    pub async fn register_remote_user(&self, username: &str, password: &str) -> Result<()> {
        let inner = self.inner.clone();
        let username = username.to_string();
        let password = Zeroizing::new(password.to_string());
        self.inner
            .jobs
            .run(JobKind::Login, async move {
                inner.register_remote_user(username, password).await
            })
            .await
    }

    /// Authenticate against the locally stored user. The vault stays locked.
    pub async fn login_local_user(&self, username: &str, password: &str) -> Result<()> {
        let inner = self.inner.clone();
        let username = username.to_string();
        let password = Zeroizing::new(password.to_string());
        self.inner
            .jobs
            .run(JobKind::Login, async move {
                inner.login_local_user(username, password).await
            })
            .await
    }

    /// Obtain a token and the user row from the webservice. The vault stays locked.
    pub async fn login_remote_user(&self, username: &str, password: &str) -> Result<()> {
        let inner = self.inner.clone();
        let username = username.to_string();
        let password = Zeroizing::new(password.to_string());
        self.inner
            .jobs
            .run(JobKind::Login, async move {
                inner.login_remote_user(username, password).await
            })
            .await
    }

    /// Unlock the key hierarchy with the master password.
    ///
    /// Waits for a running synchronization pass, so the decrypted view is
    /// built from the store as that pass left it.
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let inner = self.inner.clone();
        let password = Zeroizing::new(password.to_string());
        self.inner
            .jobs
            .run(JobKind::Unlock, async move { inner.unlock(password).await })
            .await
    }

    /// Cancel any running unlock and wipe all decrypted key material
    pub async fn lock(&self) {
        self.inner.jobs.abort(JobKind::Unlock).await;
        let _transition = self.inner.transition.lock().await;
        self.inner.clear_keys().await;
        if self.inner.account.read().await.is_some() {
            self.inner.state.send_replace(SessionState::Locked);
        }
        info!("Vault locked");
    }

    /// Lock, forget the account and reset the local store
    pub async fn logout(&self) -> Result<()> {
        self.inner.jobs.abort_all().await;
        let _transition = self.inner.transition.lock().await;
        self.inner.clear_keys().await;
        *self.inner.account.write().await = None;
        self.inner.repository.reset().await?;
        self.inner.state.send_replace(SessionState::LoggedOut);
        info!("Logged out");
        Ok(())
    }

    /// Re-wrap the master encryption key under a new master password.
    ///
    /// A server-backed session commits the new user row locally only after
    /// the webservice accepted it.
    pub async fn change_master_password(&self, current: &str, new: &str) -> Result<()> {
        let inner = &self.inner;
        let username = inner.current_username().await?;
        let master_encryption_key = inner
            .keys
            .read()
            .await
            .as_ref()
            .map(|keys| keys.master_encryption_key().clone())
            .ok_or(Error::VaultLocked)?;
        let user = inner.find_user(&username).await?;

        inner
            .verify_password(&user, Zeroizing::new(current.to_string()))
            .await?;

        let params = inner.config.key_parameters();
        let previous = user.clone();
        let new = Zeroizing::new(new.to_string());
        let mut updated = blocking(move || {
            Ok(keyring::rewrap_master_encryption_key(
                &previous,
                &master_encryption_key,
                &new,
                &params,
            )?)
        })
        .await?;
        updated.modified = next_modified(user.modified);

        if let (Some(webservice), Some(token)) = (inner.webservice.clone(), inner.token().await) {
            webservice
                .update_users(&token, std::slice::from_ref(&updated))
                .await
                .into_request_result("user")?;
        }
        inner.repository.update_user(&updated).await?;

        info!("Master password changed for {}", username);
        Ok(())
    }

    /// Run one synchronization pass and refresh the decrypted view
    pub async fn synchronize(&self) -> Result<SyncReport> {
        let inner = self.inner.clone();
        self.inner
            .jobs
            .run(JobKind::Synchronization, async move {
                inner.synchronize().await
            })
            .await
    }

    /// Store a new item owned by the current user
    pub async fn create_item(&self, data: ItemData) -> Result<Uuid> {
        let inner = &self.inner;
        let username = inner.current_username().await?;
        let owner = inner.find_user(&username).await?;

        let mut guard = inner.keys.write().await;
        let keys = guard.as_mut().ok_or(Error::VaultLocked)?;

        let (item, authorization, unlocked) = keyring::create_item(keys, &owner, &data)?;
        inner.repository.insert_item(&item).await?;
        inner
            .repository
            .insert_item_authorization(&authorization)
            .await?;
        keys.insert_item(unlocked);

        Ok(item.id)
    }

    /// Replace the payload of an item the current user may write
    pub async fn update_item(&self, item_id: Uuid, data: ItemData) -> Result<()> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let mut guard = inner.keys.write().await;
        let keys = guard.as_mut().ok_or(Error::VaultLocked)?;

        let mut item = inner.find_live_item(&item_id).await?;
        match inner.own_authorization(&item, &username).await? {
            Some(authorization) if !authorization.read_only => {}
            _ => {
                return Err(Error::PermissionDenied(format!(
                    "{} cannot modify item {}",
                    username, item_id
                )))
            }
        }
        let item_key = keys
            .item_key(&item_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("key for item {}", item_id)))?;

        item.data.update(&item_key, &data)?;
        item.modified = next_modified(item.modified);
        inner.repository.update_item(&item).await?;
        keys.insert_item(UnlockedItem {
            item_id,
            item_key,
            data,
        });

        Ok(())
    }

    /// Tombstone an owned item together with all of its authorizations
    pub async fn delete_item(&self, item_id: Uuid) -> Result<()> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let mut guard = inner.keys.write().await;
        let keys = guard.as_mut().ok_or(Error::VaultLocked)?;

        let mut item = inner.find_live_item(&item_id).await?;
        if item.owner_user_id != username {
            return Err(Error::PermissionDenied(format!(
                "only the owner can delete item {}",
                item_id
            )));
        }

        item.deleted = true;
        item.modified = next_modified(item.modified);
        inner.repository.update_item(&item).await?;

        for mut authorization in inner
            .repository
            .find_item_authorizations_for_item(&item)
            .await?
            .into_iter()
            .filter(|a| !a.deleted)
        {
            authorization.deleted = true;
            authorization.modified = next_modified(authorization.modified);
            inner
                .repository
                .update_item_authorization(&authorization)
                .await?;
        }
        keys.remove_item(&item_id);

        info!("Deleted item {}", item_id);
        Ok(())
    }

    /// Grant `grantee` access to an item. Returns the new authorization id.
    pub async fn share_item(&self, item_id: Uuid, grantee: &str, read_only: bool) -> Result<Uuid> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let guard = inner.keys.read().await;
        let keys = guard.as_ref().ok_or(Error::VaultLocked)?;

        let item = inner.find_live_item(&item_id).await?;
        let authorizations = inner
            .repository
            .find_item_authorizations_for_item(&item)
            .await?;

        let writable = authorizations
            .iter()
            .any(|a| a.user_id == username && !a.deleted && !a.read_only);
        if !writable {
            return Err(Error::PermissionDenied(format!(
                "{} cannot share item {}",
                username, item_id
            )));
        }
        if authorizations
            .iter()
            .any(|a| a.user_id == grantee && !a.deleted)
        {
            return Err(Error::InvalidInput(format!(
                "item {} is already shared with {}",
                item_id, grantee
            )));
        }

        let grantee_user = inner.resolve_user(grantee).await?;
        let item_key = keys
            .item_key(&item_id)
            .ok_or_else(|| Error::NotFound(format!("key for item {}", item_id)))?;
        let authorization = keyring::authorize(&item, item_key, &grantee_user, read_only)?;
        inner
            .repository
            .insert_item_authorization(&authorization)
            .await?;

        info!("Shared item {} with {}", item_id, grantee);
        Ok(authorization.id)
    }

    /// Tombstone an authorization of an item the current user owns
    pub async fn revoke_item_authorization(&self, authorization_id: Uuid) -> Result<()> {
        let inner = &self.inner;
        let username = inner.current_username().await?;
        if !self.is_unlocked().await {
            return Err(Error::VaultLocked);
        }

        let mut authorization = inner
            .repository
            .find_all_item_authorizations()
            .await?
            .into_iter()
            .find(|a| a.id == authorization_id && !a.deleted)
            .ok_or_else(|| Error::NotFound(format!("item authorization {}", authorization_id)))?;
        let item = inner
            .repository
            .find_item(&authorization.item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {}", authorization.item_id)))?;

        if item.owner_user_id != username {
            return Err(Error::PermissionDenied(format!(
                "only the owner can revoke access to item {}",
                item.id
            )));
        }
        if authorization.user_id == item.owner_user_id {
            return Err(Error::InvalidInput(
                "the owner's own authorization cannot be revoked".to_string(),
            ));
        }

        authorization.deleted = true;
        authorization.modified = next_modified(authorization.modified);
        inner
            .repository
            .update_item_authorization(&authorization)
            .await?;

        info!("Revoked {} from item {}", authorization.user_id, item.id);
        Ok(())
    }

    /// Decrypted items of the unlocked session, ordered by title
    pub async fn items(&self) -> Result<Vec<VaultItem>> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let guard = inner.keys.read().await;
        let keys = guard.as_ref().ok_or(Error::VaultLocked)?;
        let authorizations = inner.repository.find_all_item_authorizations().await?;

        let mut items: Vec<VaultItem> = keys
            .items()
            .map(|(id, data)| VaultItem {
                id: *id,
                data: data.clone(),
                read_only: authorizations
                    .iter()
                    .find(|a| a.item_id == *id && a.user_id == username && !a.deleted)
                    .is_some_and(|a| a.read_only),
            })
            .collect();
        items.sort_by(|a, b| a.data.title.cmp(&b.data.title).then(a.id.cmp(&b.id)));

        Ok(items)
    }

    pub async fn settings(&self) -> Result<UserSettings> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let guard = inner.keys.read().await;
        let keys = guard.as_ref().ok_or(Error::VaultLocked)?;
        let user = inner.find_user(&username).await?;

        Ok(user.protected_settings.decrypt(keys.master_encryption_key())?)
    }

    pub async fn update_settings(&self, settings: UserSettings) -> Result<()> {
        let inner = &self.inner;
        let username = inner.current_username().await?;

        let guard = inner.keys.read().await;
        let keys = guard.as_ref().ok_or(Error::VaultLocked)?;
        let mut user = inner.find_user(&username).await?;

        user.protected_settings
            .update(keys.master_encryption_key(), &settings)?;
        user.modified = next_modified(user.modified);
        inner.repository.update_user(&user).await?;

        Ok(())
    }
}

impl SessionInner {
    fn webservice(&self) -> Result<Arc<dyn Webservice>> {
        self.webservice
            .clone()
            .ok_or_else(|| Error::InvalidInput("no webservice configured".to_string()))
    }

    async fn current_username(&self) -> Result<String> {
        self.account
            .read()
            .await
            .as_ref()
            .map(|account| account.username.clone())
            .ok_or(Error::NotLoggedIn)
    }

    async fn token(&self) -> Option<String> {
        self.account
            .read()
            .await
            .as_ref()
            .and_then(|account| account.token.clone())
    }

    async fn find_user(&self, username: &str) -> Result<User> {
        self.repository
            .find_user(username)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", username)))
    }

    async fn find_live_item(&self, item_id: &Uuid) -> Result<Item> {
        self.repository
            .find_item(item_id)
            .await?
            .filter(|item| !item.deleted)
            .ok_or_else(|| Error::NotFound(format!("item {}", item_id)))
    }

    async fn own_authorization(
        &self,
        item: &Item,
        username: &str,
    ) -> Result<Option<ItemAuthorization>> {
        Ok(self
            .repository
            .find_item_authorizations_for_item(item)
            .await?
            .into_iter()
            .find(|a| a.user_id == username && !a.deleted))
    }

    /// Local user row, fetched from the webservice when not known yet
    async fn resolve_user(&self, username: &str) -> Result<User> {
        if let Some(user) = self.repository.find_user(username).await? {
            return if user.deleted {
                Err(Error::NotFound(format!("user {}", username)))
            } else {
                Ok(user)
            };
        }

        let (Some(webservice), Some(token)) = (self.webservice.clone(), self.token().await) else {
            return Err(Error::NotFound(format!("user {}", username)));
        };
        let user = match webservice.get_user_details(&token, username).await {
            response if response.status == 404 => {
                return Err(Error::NotFound(format!("user {}", username)))
            }
            response => response.into_request_result("user")?,
        };
        if user.deleted {
            return Err(Error::NotFound(format!("user {}", username)));
        }
        self.repository.insert_user(&user).await?;
        Ok(user)
    }

    async fn local_authentication_hash(
        &self,
        username: &str,
        password: Zeroizing<String>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let iterations = self.config.authentication_iterations;
        let username = username.to_string();
        blocking(move || {
            Ok(derive_local_authentication_hash(
                &username, &password, iterations,
            )?)
        })
        .await
    }

    /// Check a password against the user's stored authentication hash
    async fn verify_password(&self, user: &User, password: Zeroizing<String>) -> Result<()> {
        let iterations = self.config.authentication_iterations;
        let username = user.username.clone();
        let stored = user.master_password_authentication_hash.clone();

        let matches = blocking(move || {
            let hash = derive_local_authentication_hash(&username, &password, iterations)?;
            Ok(verify_server_authentication_hash(&hash, &stored)?)
        })
        .await?;

        if matches {
            Ok(())
        } else {
            warn!("Authentication failed for {}", user.username);
            Err(Error::AuthenticationFailed)
        }
    }

    async fn request_token(
        &self,
        webservice: &dyn Webservice,
        username: &str,
        password: Zeroizing<String>,
    ) -> Result<String> {
        let hash = self.local_authentication_hash(username, password).await?;
        let encoded = Zeroizing::new(STANDARD.encode(hash.as_slice()));
        webservice
            .get_token(username, &encoded)
            .await
            .into_request_result("token")
    }

    async fn build_user(
        &self,
        username: String,
        password: Zeroizing<String>,
    ) -> Result<(User, KeySession)> {
        let params = self.config.key_parameters();
        blocking(move || Ok(keyring::create_user(&username, &password, &params)?)).await
    }

    async fn ensure_new_user(&self, username: &str) -> Result<()> {
        if self.repository.find_user(username).await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "user {} already exists",
                username
            )));
        }
        Ok(())
    }

    async fn sign_in(&self, username: String, token: Option<String>, keys: Option<KeySession>) {
        let _transition = self.transition.lock().await;
        let state = if keys.is_some() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        };
        *self.account.write().await = Some(Account { username, token });
        self.install_keys(keys).await;
        self.state.send_replace(state);
    }

    /// Swap in a new key session; the old one is wiped on drop
    async fn install_keys(&self, keys: Option<KeySession>) {
        let previous = std::mem::replace(&mut *self.keys.write().await, keys);
        drop(previous);
    }

    async fn clear_keys(&self) {
        if let Some(mut keys) = self.keys.write().await.take() {
            keys.clear();
        }
    }

    async fn create_local_user(&self, username: String, password: Zeroizing<String>) -> Result<()> {
        self.ensure_new_user(&username).await?;
        let (user, keys) = self.build_user(username.clone(), password).await?;
        self.repository.insert_user(&user).await?;

        self.sign_in(username, None, Some(keys)).await;
        info!("Created local user {}", user.username);
        Ok(())
    }

    async fn register_remote_user(
        &self,
        username: String,
        password: Zeroizing<String>,
    ) -> Result<()> {
        let webservice = self.webservice()?;
        self.ensure_new_user(&username).await?;

        let (user, keys) = self.build_user(username.clone(), password.clone()).await?;
        webservice
            .register_user(&user)
            .await
            .into_request_result("user")?;
        let token = self
            .request_token(webservice.as_ref(), &username, password)
            .await?;
        self.repository.insert_user(&user).await?;

        self.sign_in(username, Some(token), Some(keys)).await;
        info!("Registered user {}", user.username);
        Ok(())
    }

    async fn login_local_user(&self, username: String, password: Zeroizing<String>) -> Result<()> {
        let user = self.find_user(&username).await?;
        if user.deleted {
            return Err(Error::NotFound(format!("user {}", username)));
        }
        self.verify_password(&user, password).await?;

        self.clear_keys().await;
        self.sign_in(username, None, None).await;
        info!("Logged in locally as {}", user.username);
        Ok(())
    }

    async fn login_remote_user(&self, username: String, password: Zeroizing<String>) -> Result<()> {
        let webservice = self.webservice()?;
        let token = self
            .request_token(webservice.as_ref(), &username, password)
            .await?;
        let remote = webservice
            .get_user_details(&token, &username)
            .await
            .into_request_result("user")?;

        match self.repository.find_user(&username).await? {
            None => self.repository.insert_user(&remote).await?,
            Some(local)
                if local != remote
                    && ConflictResolver::resolve(local.modified, remote.modified)
                        == Resolution::AcceptRemote =>
            {
                self.repository.update_user(&remote).await?
            }
            Some(_) => {}
        }

        self.clear_keys().await;
        self.sign_in(username, Some(token), None).await;
        info!("Logged in remotely as {}", remote.username);
        Ok(())
    }

    async fn unlock(&self, password: Zeroizing<String>) -> Result<()> {
        let username = self.current_username().await?;
        let _transition = self.transition.lock().await;
        self.clear_keys().await;
        self.state.send_replace(SessionState::Locked);

        let user = self.find_user(&username).await?;
        let (items, authorizations) = tokio::try_join!(
            self.repository.find_all_items(),
            self.repository.find_all_item_authorizations()
        )?;

        let keys = blocking(move || {
            let master_key = derive_key(&password, &user.master_key_derivation_information)?;
            let mut keys = KeySession::open(&user, &master_key)?
                .ok_or(Error::DecryptMasterEncryptionKeyFailed)?;
            let unlocked = keys.unwrap_items(&items, &authorizations);
            keys.replace_items(unlocked);
            Ok(keys)
        })
        .await
        .map_err(|e| {
            if e.is_wrong_password() {
                warn!("Unlock failed for {}: wrong master password", username);
            }
            e
        })?;

        let count = keys.item_count();
        self.install_keys(Some(keys)).await;
        self.state.send_replace(SessionState::Unlocked);
        info!("Vault unlocked for {} with {} items", username, count);
        Ok(())
    }

    async fn synchronize(&self) -> Result<SyncReport> {
        let webservice = self.webservice()?;
        self.current_username().await?;
        let token = self.token().await.ok_or(Error::NotLoggedIn)?;

        let engine = SyncEngine::new(self.repository.clone(), webservice);
        let _transition = self.transition.lock().await;
        let report = engine.synchronize(&token).await?;

        if report.changed_local() {
            self.refresh_items().await?;
        }
        Ok(report)
    }

    /// Re-derive the decrypted item set from the store, if unlocked
    async fn refresh_items(&self) -> Result<()> {
        let (items, authorizations) = tokio::try_join!(
            self.repository.find_all_items(),
            self.repository.find_all_item_authorizations()
        )?;

        let mut guard = self.keys.write().await;
        if let Some(keys) = guard.as_mut() {
            let unlocked = keys.unwrap_items(&items, &authorizations);
            keys.replace_items(unlocked);
        }
        Ok(())
    }
}
