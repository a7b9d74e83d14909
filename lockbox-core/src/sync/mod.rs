//! Synchronization of the local store with the vault webservice
//!
//! Implements:
//! - Per-entity-kind fetch, four-way diff and apply (users, items, item authorizations)
//! - Last-write-wins conflict resolution on `modified`
//! - Tombstone-based soft deletes that travel like any other change

pub mod client;
pub mod conflict;
pub mod diff;
pub mod engine;
pub mod models;

pub use client::{Webservice, WebserviceResponse};
pub use conflict::{ConflictResolver, Resolution};
pub use diff::SyncDiff;
pub use engine::SyncEngine;
pub use models::{EntityKind, EntitySyncCounts, SyncReport};
