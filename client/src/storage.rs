//! Durable scalar key-value storage.
//!
//! Only two keys are ever written by the client: the session token and the
//! theme preference. Each is a single value, so every operation is a plain
//! single-key read or write with no transactions.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::ApiError;

pub const SESSION_TOKEN_KEY: &str = "sessionToken";
pub const THEME_KEY: &str = "user_theme_preference";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;
    async fn remove(&self, key: &str) -> Result<(), ApiError>;
}

/// One file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ApiError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ApiError::Storage(format!("invalid storage key {key:?}").into()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write-then-rename so readers never see a half-written value.
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, "stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ApiError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ApiError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// The single persisted session token.
///
/// Keeps the last value it read or wrote in memory, so a token whose
/// persistence failed is still attached to requests for the rest of the
/// process lifetime.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    cached: RwLock<Option<Option<String>>>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    /// Current token. Read failures are treated as "no credential".
    pub async fn get(&self) -> Option<String> {
        let cached = self.cached.read().clone();
        if let Some(cached) = cached {
            return cached;
        }
        match self.store.get(SESSION_TOKEN_KEY).await {
            Ok(token) => {
                let token = token.filter(|t| !t.is_empty());
                *self.cached.write() = Some(token.clone());
                token
            }
            Err(e) => {
                warn!(error = %e, "could not read session token, continuing signed out");
                None
            }
        }
    }

    pub async fn set(&self, token: &str) -> Result<(), ApiError> {
        *self.cached.write() = Some(Some(token.to_string()));
        self.store.set(SESSION_TOKEN_KEY, token).await
    }

    pub async fn clear(&self) -> Result<(), ApiError> {
        *self.cached.write() = Some(None);
        self.store.remove(SESSION_TOKEN_KEY).await
    }
}
