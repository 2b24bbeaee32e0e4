//! Settings store for the persisted exclusions document.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::exclusion::PersistedExclusions;

/// Persists both modes' exclusions and the inversion flag.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the stored document, `None` when nothing was stored yet.
    async fn get_exclusions(&self) -> Result<Option<PersistedExclusions>>;

    /// Replace the stored document.
    async fn set_exclusions(&self, state: &PersistedExclusions) -> Result<()>;
}

/// Settings kept in memory.
#[derive(Default)]
pub struct MemorySettingsStore {
    state: Mutex<Option<PersistedExclusions>>,
    fail_writes: AtomicBool,
}

impl MemorySettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a document.
    pub fn with_state(state: PersistedExclusions) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Reject every following write while set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last stored document.
    pub fn snapshot(&self) -> Option<PersistedExclusions> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_exclusions(&self) -> Result<Option<PersistedExclusions>> {
        Ok(self.state.lock().clone())
    }

    async fn set_exclusions(&self, state: &PersistedExclusions) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Settings("writes are disabled".to_string()));
        }
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}

/// Settings kept in a JSON file.
///
/// Writes go to a temporary sibling first and are renamed into place.
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    /// Create a store for the given file. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn get_exclusions(&self) -> Result<Option<PersistedExclusions>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn set_exclusions(&self, state: &PersistedExclusions) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Settings(format!("{}: {}", parent.display(), e)))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| Error::Settings(format!("{}: {}", temp.display(), e)))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Error::Settings(format!("{}: {}", self.path.display(), e)))?;

        log::debug!("Saved exclusions to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::Exclusion;
    use tempfile::tempdir;

    fn sample() -> PersistedExclusions {
        let mut state = PersistedExclusions::default();
        state.inverted = true;
        state.selective.excluded_ips.push(Exclusion::new("10.0.0.1", true));
        state
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySettingsStore::new();
        assert!(store.get_exclusions().await.unwrap().is_none());

        let state = sample();
        store.set_exclusions(&state).await.unwrap();
        assert_eq!(store.get_exclusions().await.unwrap(), Some(state));

        store.set_fail_writes(true);
        let err = store.set_exclusions(&PersistedExclusions::default()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.snapshot().unwrap().inverted);
    }

    #[tokio::test]
    async fn test_file_store_save_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path().join("nested").join("exclusions.json"));
        assert!(store.get_exclusions().await.unwrap().is_none());

        let state = sample();
        store.set_exclusions(&state).await.unwrap();
        assert_eq!(store.get_exclusions().await.unwrap(), Some(state));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_store_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exclusions.json");
        std::fs::write(&path, "{broken").unwrap();

        let store = JsonFileSettingsStore::new(&path);
        assert!(matches!(store.get_exclusions().await, Err(Error::Json(_))));
    }
}
