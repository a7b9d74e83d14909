//! Shared test helpers: an in-memory webservice and low-cost configs.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lockbox_core::crypto::verify_server_authentication_hash;
use lockbox_core::{
    Item, ItemAuthorization, ItemData, MemoryRepository, User, VaultConfig, VaultSession,
    Webservice, WebserviceResponse,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Cheap key derivation and small RSA keys so tests run quickly in debug builds.
pub fn test_config() -> VaultConfig {
    VaultConfig {
        key_derivation_iterations: 1_000,
        authentication_iterations: 1_000,
        server_authentication_iterations: 1_000,
        item_encryption_key_bits: 1024,
    }
}

/// Log to the test writer; `RUST_LOG=lockbox_core=debug` shows sync diffs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn demo_item(password: &str) -> ItemData {
    ItemData {
        title: "demo".to_string(),
        username: "alice@example.com".to_string(),
        password: password.to_string(),
        url: "https://example.com".to_string(),
        notes: String::new(),
    }
}

/// A device: its own local store and a session talking to `server`.
pub fn device(server: &Arc<FakeWebservice>) -> (VaultSession, Arc<MemoryRepository>) {
    device_with(server, test_config())
}

pub fn device_with(
    server: &Arc<FakeWebservice>,
    config: VaultConfig,
) -> (VaultSession, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::new());
    let session = VaultSession::with_webservice(config, repository.clone(), server.clone())
        .expect("test config is valid");
    (session, repository)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetToken,
    RegisterUser,
    GetUserDetails,
    GetUsers,
    AddUsers,
    UpdateUsers,
    GetItems,
    AddItems,
    UpdateItems,
    GetItemAuthorizations,
    AddItemAuthorizations,
    UpdateItemAuthorizations,
}

#[derive(Default)]
struct ServerState {
    users: BTreeMap<String, User>,
    items: BTreeMap<Uuid, Item>,
    item_authorizations: BTreeMap<Uuid, ItemAuthorization>,
    tokens: HashMap<String, String>,
    failures: HashMap<Endpoint, u16>,
    calls: HashMap<Endpoint, usize>,
}

/// In-memory webservice with per-endpoint failure injection.
#[derive(Default)]
pub struct FakeWebservice {
    state: Mutex<ServerState>,
}

impl FakeWebservice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call to `endpoint` answer with `status` and no body
    pub fn fail(&self, endpoint: Endpoint, status: u16) {
        self.state.lock().unwrap().failures.insert(endpoint, status);
    }

    pub fn heal(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failures.remove(&endpoint);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Hand out a token without checking credentials
    pub fn issue_token(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert(token.clone(), username.to_string());
        token
    }

    pub fn user(&self, username: &str) -> Option<User> {
        self.state.lock().unwrap().users.get(username).cloned()
    }

    pub fn users(&self) -> Vec<User> {
        self.state.lock().unwrap().users.values().cloned().collect()
    }

    pub fn item(&self, id: &Uuid) -> Option<Item> {
        self.state.lock().unwrap().items.get(id).cloned()
    }

    pub fn items(&self) -> Vec<Item> {
        self.state.lock().unwrap().items.values().cloned().collect()
    }

    pub fn item_authorizations(&self) -> Vec<ItemAuthorization> {
        self.state
            .lock()
            .unwrap()
            .item_authorizations
            .values()
            .cloned()
            .collect()
    }

    pub fn put_user(&self, user: User) {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.username.clone(), user);
    }

    pub fn put_item(&self, item: Item) {
        self.state.lock().unwrap().items.insert(item.id, item);
    }

    pub fn put_item_authorization(&self, authorization: ItemAuthorization) {
        self.state
            .lock()
            .unwrap()
            .item_authorizations
            .insert(authorization.id, authorization);
    }

    /// Count the call and return the injected failure, if any
    fn enter(&self, endpoint: Endpoint) -> Option<u16> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint).or_default() += 1;
        state.failures.get(&endpoint).copied()
    }

    fn authorized(&self, token: &str) -> bool {
        self.state.lock().unwrap().tokens.contains_key(token)
    }

    fn guarded<T>(
        &self,
        endpoint: Endpoint,
        token: &str,
        handler: impl FnOnce(&mut ServerState) -> WebserviceResponse<T>,
    ) -> WebserviceResponse<T> {
        if let Some(status) = self.enter(endpoint) {
            return WebserviceResponse::status(status);
        }
        if !self.authorized(token) {
            return WebserviceResponse::status(401);
        }
        handler(&mut self.state.lock().unwrap())
    }
}

fn upsert<K: Ord, V: Clone>(
    table: &mut BTreeMap<K, V>,
    entries: &[V],
    key: impl Fn(&V) -> K,
) -> WebserviceResponse<Vec<V>> {
    for entry in entries {
        table.insert(key(entry), entry.clone());
    }
    WebserviceResponse::ok(entries.to_vec())
}

fn update_existing<K: Ord, V: Clone>(
    table: &mut BTreeMap<K, V>,
    entries: &[V],
    key: impl Fn(&V) -> K,
) -> WebserviceResponse<Vec<V>> {
    if entries.iter().any(|entry| !table.contains_key(&key(entry))) {
        return WebserviceResponse::status(404);
    }
    upsert(table, entries, key)
}

#[async_trait]
impl Webservice for FakeWebservice {
    async fn get_token(
        &self,
        username: &str,
        authentication_hash: &str,
    ) -> WebserviceResponse<String> {
        if let Some(status) = self.enter(Endpoint::GetToken) {
            return WebserviceResponse::status(status);
        }
        let Some(user) = self.user(username) else {
            return WebserviceResponse::status(401);
        };
        let Ok(hash) = STANDARD.decode(authentication_hash) else {
            return WebserviceResponse::status(400);
        };
        match verify_server_authentication_hash(&hash, &user.master_password_authentication_hash)
        {
            Ok(true) => WebserviceResponse::ok(self.issue_token(username)),
            _ => WebserviceResponse::status(401),
        }
    }

    async fn register_user(&self, user: &User) -> WebserviceResponse<User> {
        if let Some(status) = self.enter(Endpoint::RegisterUser) {
            return WebserviceResponse::status(status);
        }
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&user.username) {
            return WebserviceResponse::status(409);
        }
        state.users.insert(user.username.clone(), user.clone());
        WebserviceResponse::ok(user.clone())
    }

    async fn get_user_details(&self, token: &str, username: &str) -> WebserviceResponse<User> {
        self.guarded(Endpoint::GetUserDetails, token, |state| {
            match state.users.get(username) {
                Some(user) => WebserviceResponse::ok(user.clone()),
                None => WebserviceResponse::status(404),
            }
        })
    }

    async fn get_users(&self, token: &str) -> WebserviceResponse<Vec<User>> {
        self.guarded(Endpoint::GetUsers, token, |state| {
            WebserviceResponse::ok(state.users.values().cloned().collect())
        })
    }

    async fn add_users(&self, token: &str, users: &[User]) -> WebserviceResponse<Vec<User>> {
        self.guarded(Endpoint::AddUsers, token, |state| {
            upsert(&mut state.users, users, |u| u.username.clone())
        })
    }

    async fn update_users(&self, token: &str, users: &[User]) -> WebserviceResponse<Vec<User>> {
        self.guarded(Endpoint::UpdateUsers, token, |state| {
            update_existing(&mut state.users, users, |u| u.username.clone())
        })
    }

    async fn get_items(&self, token: &str) -> WebserviceResponse<Vec<Item>> {
        self.guarded(Endpoint::GetItems, token, |state| {
            WebserviceResponse::ok(state.items.values().cloned().collect())
        })
    }

    async fn add_items(&self, token: &str, items: &[Item]) -> WebserviceResponse<Vec<Item>> {
        self.guarded(Endpoint::AddItems, token, |state| {
            upsert(&mut state.items, items, |i| i.id)
        })
    }

    async fn update_items(&self, token: &str, items: &[Item]) -> WebserviceResponse<Vec<Item>> {
        self.guarded(Endpoint::UpdateItems, token, |state| {
            update_existing(&mut state.items, items, |i| i.id)
        })
    }

    async fn get_item_authorizations(
        &self,
        token: &str,
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        self.guarded(Endpoint::GetItemAuthorizations, token, |state| {
            WebserviceResponse::ok(state.item_authorizations.values().cloned().collect())
        })
    }

    async fn add_item_authorizations(
        &self,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        self.guarded(Endpoint::AddItemAuthorizations, token, |state| {
            upsert(&mut state.item_authorizations, authorizations, |a| a.id)
        })
    }

    async fn update_item_authorizations(
        &self,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        self.guarded(Endpoint::UpdateItemAuthorizations, token, |state| {
            update_existing(&mut state.item_authorizations, authorizations, |a| a.id)
        })
    }
}
