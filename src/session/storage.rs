//! Credential persistence
//!
//! Credentials live in one place per process and survive restarts through a
//! [`CredentialStore`]. The file-backed store keeps the token file private to
//! the user; the in-memory store exists for tests.

use std::path::PathBuf;
use std::sync::Mutex;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::StorageConfig;

/// Bearer credentials for the travel backend
///
/// Created at login, replaced atomically on refresh, cleared on logout or
/// irrecoverable refresh failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Errors from credential storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process-scoped get/set/clear for credentials
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>, StoreError>;
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// File-backed store under the user config directory
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the path from config, falling back to
    /// `~/.config/tripagent/credentials.json`
    pub fn from_config(config: &StorageConfig) -> Self {
        let path = config.credentials_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tripagent")
                .join("credentials.json")
        });
        Self::new(path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "load: no credential file");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let credentials = serde_json::from_str(&content)?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(credentials)?)?;

        // Token file must not be world-readable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), "save: credentials written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory store for tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credentials>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, StoreError> {
        Ok(self.inner.lock().expect("credential store lock poisoned").clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.inner.lock().expect("credential store lock poisoned") = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.inner.lock().expect("credential store lock poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        assert!(store.load().unwrap().is_none());

        store.save(&credentials()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credentials()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(&path);
        store.save(&credentials()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::default();
        assert!(store.load().unwrap().is_none());

        store.save(&credentials()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credentials()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_missing_file_is_ok() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("missing.json"));
        assert!(store.clear().is_ok());
    }
}
