//! Durable credential persistence
//!
//! Single responsibility: store the one record that survives process
//! restarts — the backend session token, the provider identity token, and
//! the last-known profile snapshot.
//!
//! The three fields are written and cleared as a unit. A reader observes
//! either the previous record or the new one, never a mix; a record missing
//! either token is corrupt and forces a full re-authentication upstream.
//!
//! All writers go through the session manager. No retries, no network
//! calls, no side effects beyond the storage medium.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

/// Last-known profile payload persisted alongside the tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub identity_id: String,
    pub email: String,
    pub display_name: String,
}

/// The single record this system persists across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentialSet {
    /// Backend-issued bearer credential.
    pub session_token: String,
    /// Raw token from the identity provider, retained for refresh.
    pub identity_token: String,
    pub user_snapshot: UserSnapshot,
}

impl StoredCredentialSet {
    /// A set missing either token is treated as corrupt by the caller.
    pub fn is_complete(&self) -> bool {
        !self.session_token.is_empty() && !self.identity_token.is_empty()
    }
}

/// Storage medium for the credential record.
///
/// Reads and writes are synchronous; none of these operations is a
/// suspension point.
pub trait CredentialStore: Send + Sync {
    /// Persist all fields together. A concurrent reader must observe either
    /// the previous record or this one.
    fn write(&self, set: &StoredCredentialSet) -> Result<(), StorageError>;

    /// Returns `None` when nothing was ever written or a prior `clear` ran.
    /// Errors only on genuine I/O failure; validating a present record is
    /// the caller's concern.
    fn read(&self) -> Result<Option<StoredCredentialSet>, StorageError>;

    /// Removes the record. Clearing an already-empty store succeeds.
    fn clear(&self) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_set() -> StoredCredentialSet {
        StoredCredentialSet {
            session_token: "sess-token".into(),
            identity_token: "id-token".into(),
            user_snapshot: UserSnapshot {
                identity_id: "user-1".into(),
                email: "opener@example.com".into(),
                display_name: "Opening Bat".into(),
            },
        }
    }

    #[test]
    fn test_completeness() {
        let mut set = sample_set();
        assert!(set.is_complete());

        set.identity_token.clear();
        assert!(!set.is_complete());

        let mut set = sample_set();
        set.session_token.clear();
        assert!(!set.is_complete());
    }
}
