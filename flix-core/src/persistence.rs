use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Durable key -> string storage. May be absent entirely, in which case every
/// call fails with [`StorageError::Unavailable`].
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Option<Arc<RwLock<HashMap<String, String>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Some(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert(key.into(), value.into());
        Self {
            inner: Some(Arc::new(RwLock::new(map))),
        }
    }

    /// A store with no backing at all, like a host without local storage.
    pub fn unavailable() -> Self {
        Self { inner: None }
    }

    fn map(&self) -> Result<&Arc<RwLock<HashMap<String, String>>>, StorageError> {
        self.inner
            .as_ref()
            .ok_or_else(|| StorageError::Unavailable("no backing storage".to_owned()))
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map()?.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map()?
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// One `<key>.json` file per key inside `dir`.
///
/// Writes land in `<key>.json.tmp` first and are renamed into place; reads
/// fall back to the tmp file when the main file is missing or corrupted.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }

    async fn read_valid(path: &Path) -> Option<String> {
        let content = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(_) => Some(content),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "stored value is not valid JSON");
                None
            }
        }
    }
}

#[async_trait]
impl PersistenceAdapter for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if let Some(content) = Self::read_valid(&path).await {
            return Ok(Some(content));
        }
        let tmp = path.with_extension("json.tmp");
        let fallback = Self::read_valid(&tmp).await;
        if fallback.is_some() {
            debug!(path = %tmp.display(), "recovered value from tmp file");
        }
        Ok(fallback)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_round_trips_values() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.set("k", "[1]").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn unavailable_storage_errors_on_every_call() {
        let storage = MemoryStorage::unavailable();
        assert!(matches!(storage.get("k").await, Err(StorageError::Unavailable(_))));
        assert!(matches!(storage.set("k", "v").await, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn file_storage_falls_back_to_tmp_on_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        tokio::fs::write(dir.path().join("my-movies.json"), b"{ broken").await.unwrap();
        tokio::fs::write(dir.path().join("my-movies.json.tmp"), br#"[{"id":1}]"#)
            .await
            .unwrap();

        let value = storage.get("my-movies").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"[{"id":1}]"#));
    }

    #[tokio::test]
    async fn file_storage_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("store"));
        storage.set("my-movies", "[]").await.unwrap();

        assert!(dir.path().join("store/my-movies.json").exists());
        assert!(!dir.path().join("store/my-movies.json.tmp").exists());
        assert_eq!(storage.get("my-movies").await.unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn keys_are_sanitised_into_file_names() {
        let storage = FileStorage::new("/tmp/x");
        assert_eq!(storage.path_for("../evil key"), PathBuf::from("/tmp/x/___evil_key.json"));
    }
}
