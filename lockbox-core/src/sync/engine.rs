//! Sync engine: runs the fetch/diff/apply cycle for each entity kind.

use crate::database::{Item, ItemAuthorization, LocalRepository, Syncable, User};
use crate::sync::client::{Webservice, WebserviceResponse};
use crate::sync::diff::SyncDiff;
use crate::sync::models::{EntityKind, EntitySyncCounts, SyncReport};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Binds one entity type to its local and remote collection calls.
#[async_trait]
trait EntityChannel: Send + Sync {
    type Entity: Syncable;

    fn kind(&self) -> EntityKind;

    async fn fetch_local(&self, repository: &dyn LocalRepository) -> Result<Vec<Self::Entity>>;
    async fn insert_local(
        &self,
        repository: &dyn LocalRepository,
        entity: &Self::Entity,
    ) -> Result<()>;
    async fn update_local(
        &self,
        repository: &dyn LocalRepository,
        entity: &Self::Entity,
    ) -> Result<()>;

    async fn fetch_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
    ) -> WebserviceResponse<Vec<Self::Entity>>;
    async fn add_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        entities: &[Self::Entity],
    ) -> WebserviceResponse<Vec<Self::Entity>>;
    async fn update_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        entities: &[Self::Entity],
    ) -> WebserviceResponse<Vec<Self::Entity>>;
}

struct Users;
struct Items;
struct ItemAuthorizations;

#[async_trait]
impl EntityChannel for Users {
    type Entity = User;

    fn kind(&self) -> EntityKind {
        EntityKind::Users
    }

    async fn fetch_local(&self, repository: &dyn LocalRepository) -> Result<Vec<User>> {
        Ok(repository.find_all_users().await?)
    }

    async fn insert_local(&self, repository: &dyn LocalRepository, user: &User) -> Result<()> {
        Ok(repository.insert_user(user).await?)
    }

    async fn update_local(&self, repository: &dyn LocalRepository, user: &User) -> Result<()> {
        Ok(repository.update_user(user).await?)
    }

    async fn fetch_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
    ) -> WebserviceResponse<Vec<User>> {
        webservice.get_users(token).await
    }

    async fn add_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        users: &[User],
    ) -> WebserviceResponse<Vec<User>> {
        webservice.add_users(token, users).await
    }

    async fn update_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        users: &[User],
    ) -> WebserviceResponse<Vec<User>> {
        webservice.update_users(token, users).await
    }
}

#[async_trait]
impl EntityChannel for Items {
    type Entity = Item;

    fn kind(&self) -> EntityKind {
        EntityKind::Items
    }

    async fn fetch_local(&self, repository: &dyn LocalRepository) -> Result<Vec<Item>> {
        Ok(repository.find_all_items().await?)
    }

    async fn insert_local(&self, repository: &dyn LocalRepository, item: &Item) -> Result<()> {
        Ok(repository.insert_item(item).await?)
    }

    async fn update_local(&self, repository: &dyn LocalRepository, item: &Item) -> Result<()> {
        Ok(repository.update_item(item).await?)
    }

    async fn fetch_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
    ) -> WebserviceResponse<Vec<Item>> {
        webservice.get_items(token).await
    }

    async fn add_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        items: &[Item],
    ) -> WebserviceResponse<Vec<Item>> {
        webservice.add_items(token, items).await
    }

    async fn update_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        items: &[Item],
    ) -> WebserviceResponse<Vec<Item>> {
        webservice.update_items(token, items).await
    }
}

#[async_trait]
impl EntityChannel for ItemAuthorizations {
    type Entity = ItemAuthorization;

    fn kind(&self) -> EntityKind {
        EntityKind::ItemAuthorizations
    }

    async fn fetch_local(
        &self,
        repository: &dyn LocalRepository,
    ) -> Result<Vec<ItemAuthorization>> {
        Ok(repository.find_all_item_authorizations().await?)
    }

    async fn insert_local(
        &self,
        repository: &dyn LocalRepository,
        authorization: &ItemAuthorization,
    ) -> Result<()> {
        Ok(repository.insert_item_authorization(authorization).await?)
    }

    async fn update_local(
        &self,
        repository: &dyn LocalRepository,
        authorization: &ItemAuthorization,
    ) -> Result<()> {
        Ok(repository.update_item_authorization(authorization).await?)
    }

    async fn fetch_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        webservice.get_item_authorizations(token).await
    }

    async fn add_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        webservice.add_item_authorizations(token, authorizations).await
    }

    async fn update_remote(
        &self,
        webservice: &dyn Webservice,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>> {
        webservice
            .update_item_authorizations(token, authorizations)
            .await
    }
}

/// Orchestrates a full synchronization pass between the local store and the webservice.
pub struct SyncEngine {
    repository: Arc<dyn LocalRepository>,
    webservice: Arc<dyn Webservice>,
}

impl SyncEngine {
    pub fn new(repository: Arc<dyn LocalRepository>, webservice: Arc<dyn Webservice>) -> Self {
        Self {
            repository,
            webservice,
        }
    }

    /// Synchronize users, then items, then item authorizations.
    ///
    /// The first failing kind aborts the pass. Kinds already applied stay applied.
    pub async fn synchronize(&self, token: &str) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        *report.counts_mut(EntityKind::Users) = self.synchronize_kind(&Users, token).await?;
        *report.counts_mut(EntityKind::Items) = self.synchronize_kind(&Items, token).await?;
        *report.counts_mut(EntityKind::ItemAuthorizations) =
            self.synchronize_kind(&ItemAuthorizations, token).await?;

        info!(
            "Synchronization complete: users {}, items {}, item authorizations {}",
            report.users.total(),
            report.items.total(),
            report.item_authorizations.total()
        );
        Ok(report)
    }

    async fn synchronize_kind<C: EntityChannel>(
        &self,
        channel: &C,
        token: &str,
    ) -> Result<EntitySyncCounts> {
        let kind = channel.kind();
        let repository = self.repository.as_ref();
        let webservice = self.webservice.as_ref();

        let remote = async {
            channel
                .fetch_remote(webservice, token)
                .await
                .into_sync_result(kind.as_str())
        };
        let (local, remote) = tokio::try_join!(channel.fetch_local(repository), remote)?;

        let diff = SyncDiff::compute(local, remote);
        let counts = diff.counts();
        debug!("Diff for {}: {:?}", kind, counts);

        for entity in &diff.new_to_local {
            channel.insert_local(repository, entity).await?;
        }
        if !diff.new_to_remote.is_empty() {
            channel
                .add_remote(webservice, token, &diff.new_to_remote)
                .await
                .into_sync_result(kind.as_str())?;
        }
        for entity in &diff.modified_to_local {
            channel.update_local(repository, entity).await?;
        }
        if !diff.modified_to_remote.is_empty() {
            channel
                .update_remote(webservice, token, &diff.modified_to_remote)
                .await
                .into_sync_result(kind.as_str())?;
        }

        Ok(counts)
    }
}
