//! In-memory storage provider for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use gallerystore_common::{Error, Result};

use crate::provider::{MovableProvider, StorageObject, StorageProvider, UploadOptions};

/// In-memory storage entry.
#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    object: StorageObject,
}

/// In-memory storage provider.
///
/// Useful for testing and dry runs. All data is stored in memory
/// and lost on drop. Listing is ordered by key.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    storage: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a key is stored.
    pub async fn contains(&self, key: &str) -> bool {
        self.storage.read().await.contains_key(key)
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Check if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    fn entry_for(key: &str, data: Bytes) -> Entry {
        let object = StorageObject {
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: Utc::now(),
            etag: Some(Uuid::new_v4().simple().to_string()),
        };
        Entry { data, object }
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.storage.read().await.get(key).map(|e| e.data.clone()))
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        Ok(self
            .storage
            .read()
            .await
            .values()
            .map(|e| e.object.clone())
            .collect())
    }

    async fn stat_file(&self, key: &str) -> Result<Option<StorageObject>> {
        Ok(self.storage.read().await.get(key).map(|e| e.object.clone()))
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://{}", key))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        match self.storage.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("File not found: {}", key))),
        }
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        if key.is_empty() {
            return Err(Error::InvalidInput("Key cannot be empty".to_string()));
        }

        let entry = Self::entry_for(key, data);
        let object = entry.object.clone();
        self.storage.write().await.insert(key.to_string(), entry);

        Ok(object)
    }

    fn as_movable(&self) -> Option<&dyn MovableProvider> {
        Some(self)
    }
}

#[async_trait]
impl MovableProvider for MemoryProvider {
    async fn move_file(
        &self,
        source: &str,
        target: &str,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        let mut storage = self.storage.write().await;

        let entry = storage
            .remove(source)
            .ok_or_else(|| Error::NotFound(format!("Source not found: {}", source)))?;

        let moved = Self::entry_for(target, entry.data);
        let object = moved.object.clone();
        storage.insert(target.to_string(), moved);

        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_get() {
        let provider = MemoryProvider::new();
        let data = Bytes::from_static(b"Hello, World!");

        let object = provider
            .upload_file("test.txt", data.clone(), &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(object.size, 13);

        let downloaded = provider.get_file("test.txt").await.unwrap();
        assert_eq!(downloaded, Some(data));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let provider = MemoryProvider::new();
        assert_eq!(provider.get_file("missing.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = MemoryProvider::new();
        provider
            .upload_file("a.jpg", Bytes::from_static(&[1, 2, 3]), &UploadOptions::default())
            .await
            .unwrap();

        provider.delete_file("a.jpg").await.unwrap();
        assert!(!provider.contains("a.jpg").await);
        assert!(provider.delete_file("a.jpg").await.is_err());
    }

    #[tokio::test]
    async fn test_list_images_filters_extensions() {
        let provider = MemoryProvider::new();
        for key in ["b.jpg", "a.png", "c.mov", "manifest.json"] {
            provider
                .upload_file(key, Bytes::from_static(&[0]), &UploadOptions::default())
                .await
                .unwrap();
        }

        let all = provider.list_all_files().await.unwrap();
        assert_eq!(all.len(), 4);

        let images: Vec<String> = provider
            .list_images()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(images, vec!["a.png", "b.jpg"]);
    }

    #[tokio::test]
    async fn test_native_move() {
        let provider = MemoryProvider::new();
        provider
            .upload_file("old.jpg", Bytes::from_static(&[1, 2, 3]), &UploadOptions::default())
            .await
            .unwrap();

        let movable = provider.as_movable().unwrap();
        let object = movable
            .move_file("old.jpg", "new.jpg", &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(object.key, "new.jpg");
        assert_eq!(object.size, 3);
        assert!(!provider.contains("old.jpg").await);
        assert!(provider.contains("new.jpg").await);
    }
}
