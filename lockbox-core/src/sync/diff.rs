//! Four-way diff between a local and a remote collection.

use crate::database::Syncable;
use crate::sync::conflict::{ConflictResolver, Resolution};
use crate::sync::models::EntitySyncCounts;
use std::collections::BTreeMap;

/// What has to move in which direction to make both sides equal.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDiff<T> {
    /// Remote ids absent locally
    pub new_to_local: Vec<T>,
    /// Local ids absent remotely
    pub new_to_remote: Vec<T>,
    /// Ids on both sides whose remote version wins
    pub modified_to_local: Vec<T>,
    /// Ids on both sides whose local version wins
    pub modified_to_remote: Vec<T>,
}

impl<T> Default for SyncDiff<T> {
    fn default() -> Self {
        Self {
            new_to_local: Vec::new(),
            new_to_remote: Vec::new(),
            modified_to_local: Vec::new(),
            modified_to_remote: Vec::new(),
        }
    }
}

impl<T: Syncable> SyncDiff<T> {
    /// Compute the diff over the union of both collections.
    ///
    /// Entities with identical content are left alone. Output is ordered by id.
    pub fn compute(local: Vec<T>, remote: Vec<T>) -> Self {
        let mut by_id: BTreeMap<T::Id, T> = local.into_iter().map(|e| (e.id(), e)).collect();
        let mut diff = Self::default();

        for theirs in remote {
            match by_id.remove(&theirs.id()) {
                None => diff.new_to_local.push(theirs),
                Some(ours) if ours == theirs => {}
                Some(ours) => match ConflictResolver::resolve(ours.modified(), theirs.modified()) {
                    Resolution::AcceptRemote => diff.modified_to_local.push(theirs),
                    Resolution::KeepLocal => diff.modified_to_remote.push(ours),
                },
            }
        }
        diff.new_to_remote.extend(by_id.into_values());

        diff.new_to_local.sort_by_key(|e| e.id());
        diff.modified_to_local.sort_by_key(|e| e.id());
        diff.modified_to_remote.sort_by_key(|e| e.id());
        diff
    }

    pub fn counts(&self) -> EntitySyncCounts {
        EntitySyncCounts {
            new_to_local: self.new_to_local.len(),
            new_to_remote: self.new_to_remote.len(),
            modified_to_local: self.modified_to_local.len(),
            modified_to_remote: self.modified_to_remote.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }
}
