//! Sync bookkeeping: entity kinds and per-pass reports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three synchronized collections, in synchronization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Users,
    Items,
    ItemAuthorizations,
}

impl EntityKind {
    pub const ORDER: [EntityKind; 3] = [Self::Users, Self::Items, Self::ItemAuthorizations];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Items => "items",
            Self::ItemAuthorizations => "item_authorizations",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizes of the four diff sets applied for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySyncCounts {
    pub new_to_local: usize,
    pub new_to_remote: usize,
    pub modified_to_local: usize,
    pub modified_to_remote: usize,
}

impl EntitySyncCounts {
    pub fn total(&self) -> usize {
        self.new_to_local + self.new_to_remote + self.modified_to_local + self.modified_to_remote
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Outcome of a complete synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub users: EntitySyncCounts,
    pub items: EntitySyncCounts,
    pub item_authorizations: EntitySyncCounts,
}

impl SyncReport {
    pub fn counts(&self, kind: EntityKind) -> &EntitySyncCounts {
        match kind {
            EntityKind::Users => &self.users,
            EntityKind::Items => &self.items,
            EntityKind::ItemAuthorizations => &self.item_authorizations,
        }
    }

    pub(crate) fn counts_mut(&mut self, kind: EntityKind) -> &mut EntitySyncCounts {
        match kind {
            EntityKind::Users => &mut self.users,
            EntityKind::Items => &mut self.items,
            EntityKind::ItemAuthorizations => &mut self.item_authorizations,
        }
    }

    /// True when the pass changed nothing on either side
    pub fn is_empty(&self) -> bool {
        EntityKind::ORDER.iter().all(|kind| self.counts(*kind).is_empty())
    }

    /// True when the pass pulled anything into the local store
    pub fn changed_local(&self) -> bool {
        EntityKind::ORDER.iter().any(|kind| {
            let counts = self.counts(*kind);
            counts.new_to_local + counts.modified_to_local > 0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_emptiness() {
        let mut report = SyncReport::default();
        assert!(report.is_empty());
        assert!(!report.changed_local());

        report.counts_mut(EntityKind::Items).new_to_remote = 2;
        assert!(!report.is_empty());
        assert!(!report.changed_local());
        assert_eq!(report.items.total(), 2);

        let authorizations = report.counts_mut(EntityKind::ItemAuthorizations);
        authorizations.modified_to_local = 1;
        assert!(report.changed_local());
    }

    #[test]
    fn test_entity_kind_order_and_names() {
        let names: Vec<String> = EntityKind::ORDER.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["users", "items", "item_authorizations"]);
    }
}
