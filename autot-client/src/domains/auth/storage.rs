//! Durable key/value storage for the session tokens
//!
//! The session is persisted as two string entries, [`ACCESS_TOKEN_KEY`] and
//! [`REFRESH_TOKEN_KEY`]. Absence of either entry means "logged out".

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use directories::ProjectDirs;
use log::warn;
use parking_lot::Mutex;

use crate::domains::auth::errors::StorageError;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub(crate) const SESSION_FILE: &str = "session.json";

/// String key/value storage that survives restarts.
#[async_trait]
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Write several entries. Implementations that can should do this in one
    /// durable step.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Process-local storage; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut guard = self.entries.lock();
        for (key, value) in entries {
            guard.insert((*key).to_owned(), (*value).to_owned());
        }
        Ok(())
    }
}

/// JSON document on disk holding all entries.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// crash never leaves a half-written document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    /// Storage in the platform data directory
    pub fn new() -> Result<Self, StorageError> {
        let proj_dirs = ProjectDirs::from("", "autot", "autot-client").ok_or_else(|| {
            StorageError::InitFailed("Unable to determine data directory".to_string())
        })?;
        Ok(Self::with_path(proj_dirs.data_dir().join(SESSION_FILE)))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::CorruptedData),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::ReadFailed(e)),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::WriteFailed)?;
        }

        let json = serde_json::to_vec_pretty(entries).map_err(StorageError::CorruptedData)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(StorageError::WriteFailed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(StorageError::WriteFailed)?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(StorageError::WriteFailed)
    }

    async fn modify<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = match self.read_all().await {
            Ok(entries) => entries,
            Err(StorageError::CorruptedData(e)) => {
                warn!(
                    "[FileStorage] Replacing unreadable {}: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        f(&mut entries);
        self.write_all(&entries).await
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key]).await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        self.modify(|stored| {
            for (key, value) in entries {
                stored.insert((*key).to_owned(), (*value).to_owned());
            }
        })
        .await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.modify(|stored| {
            for key in keys {
                stored.remove(*key);
            }
        })
        .await
    }
}
