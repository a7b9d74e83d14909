//! Last-Write-Wins conflict resolution.

use chrono::{DateTime, Utc};

/// Conflict resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Accept the remote entity (remote is newer or tied).
    AcceptRemote,
    /// Keep the local entity and push it (local is strictly newer).
    KeepLocal,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a conflict between differing local and remote versions of an entity.
    ///
    /// LWW rules:
    /// 1. Strictly greater `modified` wins.
    /// 2. If both are equal, the remote side wins, so every device settles a
    ///    tie the same way.
    pub fn resolve(local_modified: DateTime<Utc>, remote_modified: DateTime<Utc>) -> Resolution {
        if local_modified > remote_modified {
            Resolution::KeepLocal
        } else {
            Resolution::AcceptRemote
        }
    }
}
