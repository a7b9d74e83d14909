//! Local persistence interface.
//!
//! The concrete storage engine lives outside this crate; the vault and the
//! sync engine only talk to a [`LocalRepository`]. [`MemoryRepository`] is the
//! bundled in-process implementation.

pub mod memory;
pub mod models;

pub use memory::MemoryRepository;
pub use models::{Item, ItemAuthorization, ItemData, Syncable, User, UserSettings};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a repository implementation
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("Missing {entity}: {id}")]
    Missing { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Local store for users, items and item authorizations.
///
/// Inserts fail on an existing id, updates fail on a missing id. Rows are
/// never removed except by [`reset`](LocalRepository::reset).
#[async_trait]
pub trait LocalRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> RepositoryResult<()>;
    async fn update_user(&self, user: &User) -> RepositoryResult<()>;
    async fn find_user(&self, username: &str) -> RepositoryResult<Option<User>>;
    async fn find_all_users(&self) -> RepositoryResult<Vec<User>>;

    async fn insert_item(&self, item: &Item) -> RepositoryResult<()>;
    async fn update_item(&self, item: &Item) -> RepositoryResult<()>;
    async fn find_item(&self, id: &Uuid) -> RepositoryResult<Option<Item>>;
    async fn find_all_items(&self) -> RepositoryResult<Vec<Item>>;

    async fn insert_item_authorization(
        &self,
        authorization: &ItemAuthorization,
    ) -> RepositoryResult<()>;
    async fn update_item_authorization(
        &self,
        authorization: &ItemAuthorization,
    ) -> RepositoryResult<()>;
    async fn find_item_authorizations_for_item(
        &self,
        item: &Item,
    ) -> RepositoryResult<Vec<ItemAuthorization>>;
    async fn find_all_item_authorizations(&self) -> RepositoryResult<Vec<ItemAuthorization>>;

    /// Drop every stored row (logout)
    async fn reset(&self) -> RepositoryResult<()>;
}
