//! State storage backends.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::error::StateError;
use crate::state::AutomationState;

/// State storage trait: one full record per storage key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist the whole state under `key`, replacing any previous record.
    async fn persist(&self, key: &str, state: &AutomationState) -> Result<(), StateError>;

    /// Load the state stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<AutomationState>, StateError>;

    /// Remove the record under `key`.
    async fn remove(&self, key: &str) -> Result<(), StateError>;
}

/// In-memory state store for testing.
pub struct MemoryStateStore {
    records: tokio::sync::RwLock<HashMap<String, AutomationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            records: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn persist(&self, key: &str, state: &AutomationState) -> Result<(), StateError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<AutomationState>, StateError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

/// File-system state store: one JSON document per storage key.
///
/// ```text
/// {storage_path}/
/// └── state/
///     ├── {key}.json
///     └── ...
/// ```
pub struct FileStateStore {
    storage_path: PathBuf,
}

impl FileStateStore {
    /// Create a file-backed store rooted at `storage_path`.
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let storage_path = storage_path.into();
        fs::create_dir_all(storage_path.join("state")).await?;

        debug!("FileStateStore initialized at {:?}", storage_path);
        Ok(Self { storage_path })
    }

    /// Default store location under the user's home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tabpilot")
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.storage_path.join("state").join(format!("{}.json", sanitized))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn persist(&self, key: &str, state: &AutomationState) -> Result<(), StateError> {
        let path = self.record_path(key);
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        fs::write(&path, content).await?;
        debug!("Persisted state '{}' to {:?}", key, path);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<AutomationState>, StateError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let state: AutomationState = serde_json::from_str(&content)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        Ok(Some(state))
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        let path = self.record_path(key);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
