//! In-memory repository.

use crate::database::{
    Item, ItemAuthorization, LocalRepository, RepositoryError, RepositoryResult, User,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    items: BTreeMap<Uuid, Item>,
    item_authorizations: BTreeMap<Uuid, ItemAuthorization>,
}

/// Repository backed by ordered maps behind an async lock
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert<K: Ord + ToString, V: Clone>(
    table: &mut BTreeMap<K, V>,
    entity: &'static str,
    id: K,
    value: &V,
) -> RepositoryResult<()> {
    if table.contains_key(&id) {
        return Err(RepositoryError::Duplicate {
            entity,
            id: id.to_string(),
        });
    }
    table.insert(id, value.clone());
    Ok(())
}

fn update<K: Ord + ToString, V: Clone>(
    table: &mut BTreeMap<K, V>,
    entity: &'static str,
    id: K,
    value: &V,
) -> RepositoryResult<()> {
    match table.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(RepositoryError::Missing {
            entity,
            id: id.to_string(),
        }),
    }
}

#[async_trait]
impl LocalRepository for MemoryRepository {
    async fn insert_user(&self, user: &User) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        insert(&mut tables.users, "user", user.username.clone(), user)
    }

    async fn update_user(&self, user: &User) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        update(&mut tables.users, "user", user.username.clone(), user)
    }

    async fn find_user(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self.tables.read().await.users.get(username).cloned())
    }

    async fn find_all_users(&self) -> RepositoryResult<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn insert_item(&self, item: &Item) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        insert(&mut tables.items, "item", item.id, item)
    }

    async fn update_item(&self, item: &Item) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        update(&mut tables.items, "item", item.id, item)
    }

    async fn find_item(&self, id: &Uuid) -> RepositoryResult<Option<Item>> {
        Ok(self.tables.read().await.items.get(id).cloned())
    }

    async fn find_all_items(&self) -> RepositoryResult<Vec<Item>> {
        Ok(self.tables.read().await.items.values().cloned().collect())
    }

    async fn insert_item_authorization(
        &self,
        authorization: &ItemAuthorization,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        insert(
            &mut tables.item_authorizations,
            "item authorization",
            authorization.id,
            authorization,
        )
    }

    async fn update_item_authorization(
        &self,
        authorization: &ItemAuthorization,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        update(
            &mut tables.item_authorizations,
            "item authorization",
            authorization.id,
            authorization,
        )
    }

    async fn find_item_authorizations_for_item(
        &self,
        item: &Item,
    ) -> RepositoryResult<Vec<ItemAuthorization>> {
        Ok(self
            .tables
            .read()
            .await
            .item_authorizations
            .values()
            .filter(|a| a.item_id == item.id)
            .cloned()
            .collect())
    }

    async fn find_all_item_authorizations(&self) -> RepositoryResult<Vec<ItemAuthorization>> {
        Ok(self
            .tables
            .read()
            .await
            .item_authorizations
            .values()
            .cloned()
            .collect())
    }

    async fn reset(&self) -> RepositoryResult<()> {
        *self.tables.write().await = Tables::default();
        Ok(())
    }
}
