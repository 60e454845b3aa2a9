//! In-memory credential store
//!
//! Process-local stand-in for tests and dev tooling. Same atomicity
//! contract as the file store: the record is swapped as a whole.

use std::sync::{Mutex, MutexGuard};

use super::{CredentialStore, StoredCredentialSet};
use crate::error::StorageError;

#[derive(Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<StoredCredentialSet>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Option<StoredCredentialSet>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn write(&self, set: &StoredCredentialSet) -> Result<(), StorageError> {
        *self.locked() = Some(set.clone());
        Ok(())
    }

    fn read(&self) -> Result<Option<StoredCredentialSet>, StorageError> {
        Ok(self.locked().clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.locked() = None;
        Ok(())
    }
}
