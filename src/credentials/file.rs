//! File-backed credential store
//!
//! The record is one JSON file. Writes go to a sibling temp file first and
//! are renamed over the target, so a crash mid-write leaves either the old
//! record or the new one on disk — never a partial set.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{CredentialStore, StoredCredentialSet};
use crate::error::StorageError;

/// Durable credential store backed by a single JSON record on disk.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store the record at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the record under the platform data directory.
    pub fn with_default_path() -> Result<Self, StorageError> {
        let base = dirs::data_dir()
            .ok_or_else(|| StorageError("no platform data directory available".into()))?;
        Ok(Self::new(base.join("pavilion").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl CredentialStore for FileCredentialStore {
    fn write(&self, set: &StoredCredentialSet) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(set)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), "credential record written");
        Ok(())
    }

    fn read(&self) -> Result<Option<StoredCredentialSet>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(set) => Ok(Some(set)),
            Err(err) => {
                // Unparseable record: same end state as a partial set —
                // the caller re-authenticates from scratch.
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "credential record unparseable, treating as absent"
                );
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "credential record cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
