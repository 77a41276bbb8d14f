//! Key-value device storage
//!
//! Small JSON values (settings, the notification list, the onboarding flag)
//! kept as one file per key under the app data directory.
//!
//! Example: key "notifications" is stored at "local/notifications.json"

use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// JSON file store keyed by name
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize the store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Local store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Read a value, or `None` if the key was never written
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.get_path(key)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse stored '{}': {}", key, e)))?;
        Ok(Some(value))
    }

    /// Write a value, replacing any previous one
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.get_path(key)?;
        let content = serde_json::to_vec_pretty(value)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first so readers never see a partial value
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        fs::rename(temp_path, &path).await?;

        tracing::debug!("Stored '{}' ({} bytes)", key, content.len());
        Ok(())
    }

    /// Remove a key; removing a missing key is not an error
    pub async fn remove(&self, key: &str) -> Result<()> {
        let path = self.get_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Validation(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
        label: String,
    }

    async fn create_test_store() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().join("local"));
        store.initialize().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let (store, _temp) = create_test_store().await;

        assert_eq!(store.get::<Sample>("sample").await.unwrap(), None);

        let sample = Sample {
            count: 3,
            label: "three".to_string(),
        };
        store.set("sample", &sample).await.unwrap();
        assert_eq!(store.get::<Sample>("sample").await.unwrap(), Some(sample));

        store.remove("sample").await.unwrap();
        store.remove("sample").await.unwrap();
        assert_eq!(store.get::<Sample>("sample").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let (store, _temp) = create_test_store().await;

        assert!(store.set("../escape", &1).await.is_err());
        assert!(store.get::<u32>("a/b").await.is_err());
        assert!(store.get::<u32>("").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let (store, _temp) = create_test_store().await;
        tokio::fs::write(store.root().join("broken.json"), "{not json")
            .await
            .unwrap();

        assert!(store.get::<Sample>("broken").await.is_err());
    }
}
