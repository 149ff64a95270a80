//! Eagle asset-manager library provider.
//!
//! Reads an Eagle `*.library` directory in place. Every asset lives in its
//! own `images/<ID>.info/` folder next to a `metadata.json` describing it.
//! The library is owned by the Eagle app, so this provider is read-only.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

use gallerystore_common::{types, Error, Result};

use crate::config::EagleConfig;
use crate::live_photo::VIDEO_EXTENSIONS;
use crate::local::{file_url, resolve_key_path};
use crate::provider::{is_image_key, StorageObject, StorageProvider, UploadOptions};
use crate::urls;

/// Directory of the library holding asset folders.
const IMAGES_DIR: &str = "images";

/// Subset of Eagle's per-asset `metadata.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EagleItem {
    id: String,
    name: String,
    ext: String,
    #[serde(default)]
    size: Option<u64>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    modification_time: Option<i64>,
    #[serde(default)]
    is_deleted: bool,
}

impl EagleItem {
    fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.ext)
    }

    fn key(&self) -> String {
        format!("{}/{}.info/{}", IMAGES_DIR, self.id, self.file_name())
    }
}

/// Eagle library storage provider.
pub struct EagleProvider {
    library: PathBuf,
    base_url: Option<String>,
    include_deleted: bool,
}

impl EagleProvider {
    /// Open an Eagle library.
    ///
    /// # Errors
    /// - Library directory or its `images` folder does not exist
    pub fn new(config: EagleConfig) -> Result<Self> {
        let library = PathBuf::from(&config.library_path);
        if !library.join(IMAGES_DIR).is_dir() {
            return Err(Error::NotFound(format!(
                "Eagle library not found: {}",
                library.display()
            )));
        }

        Ok(Self {
            library,
            base_url: config.base_url,
            include_deleted: config.include_deleted,
        })
    }

    async fn read_item(&self, info_dir: &std::path::Path) -> Result<Option<EagleItem>> {
        let metadata_path = info_dir.join("metadata.json");
        let raw = match fs::read(&metadata_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        match serde_json::from_slice::<EagleItem>(&raw) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                tracing::warn!(
                    path = %metadata_path.display(),
                    error = %e,
                    "Skipping unreadable Eagle metadata"
                );
                Ok(None)
            }
        }
    }

    fn to_object(item: &EagleItem, fs_meta: &std::fs::Metadata) -> StorageObject {
        let last_modified = item
            .modification_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .or_else(|| fs_meta.modified().ok().map(Into::into))
            .unwrap_or_else(Utc::now);

        StorageObject {
            key: item.key(),
            size: item.size.unwrap_or_else(|| fs_meta.len()),
            last_modified,
            etag: Some(item.id.clone()),
        }
    }

    fn read_only(op: &str) -> Error {
        Error::Unsupported(format!("Eagle library is read-only ({})", op))
    }
}

#[async_trait]
impl StorageProvider for EagleProvider {
    fn name(&self) -> &str {
        "eagle"
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let path = resolve_key_path(&self.library, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(self.library.join(IMAGES_DIR)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let info_dir = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let Some(item) = self.read_item(&info_dir).await? else {
                continue;
            };
            if item.is_deleted && !self.include_deleted {
                continue;
            }

            match fs::metadata(info_dir.join(item.file_name())).await {
                Ok(fs_meta) => results.push(Self::to_object(&item, &fs_meta)),
                Err(e) => {
                    tracing::debug!(id = %item.id, error = %e, "Eagle asset file missing");
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        match &self.base_url {
            Some(base) => Ok(urls::join_url(base, &types::normalize_key(key))),
            None => file_url(&resolve_key_path(&self.library, key)?),
        }
    }

    /// Eagle stores each asset in its own folder, so a Live Photo pair
    /// shares a file stem rather than a directory.
    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        let mut videos: HashMap<String, &StorageObject> = HashMap::new();
        for object in objects {
            let is_video = types::extension(&object.key)
                .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false);
            if is_video {
                videos
                    .entry(types::base_key(types::file_name(&object.key)).to_lowercase())
                    .or_insert(object);
            }
        }

        objects
            .iter()
            .filter(|o| is_image_key(&o.key))
            .filter_map(|image| {
                let stem = types::base_key(types::file_name(&image.key)).to_lowercase();
                videos
                    .get(&stem)
                    .map(|video| (image.key.clone(), (*video).clone()))
            })
            .collect()
    }

    async fn delete_file(&self, _key: &str) -> Result<()> {
        Err(Self::read_only("delete"))
    }

    async fn upload_file(
        &self,
        _key: &str,
        _data: Bytes,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        Err(Self::read_only("upload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_item(library: &std::path::Path, id: &str, name: &str, ext: &str, deleted: bool) {
        let info = library.join(IMAGES_DIR).join(format!("{}.info", id));
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(info.join(format!("{}.{}", name, ext)), b"asset").unwrap();
        let metadata = json!({
            "id": id,
            "name": name,
            "ext": ext,
            "size": 5,
            "modificationTime": 1_714_557_600_000i64,
            "isDeleted": deleted,
            "tags": ["travel"]
        });
        std::fs::write(info.join("metadata.json"), metadata.to_string()).unwrap();
    }

    fn provider(temp: &TempDir, include_deleted: bool) -> EagleProvider {
        EagleProvider::new(EagleConfig {
            library_path: temp.path().to_string_lossy().into_owned(),
            base_url: None,
            include_deleted,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lists_items_and_hides_deleted() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "K1", "IMG_1", "jpg", false);
        write_item(temp.path(), "K2", "IMG_2", "png", true);

        let objects = provider(&temp, false).list_all_files().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "images/K1.info/IMG_1.jpg");
        assert_eq!(objects[0].size, 5);
        assert_eq!(objects[0].last_modified.timestamp_millis(), 1_714_557_600_000);

        let all = provider(&temp, true).list_all_files().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_get_file_reads_asset() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "K1", "IMG_1", "jpg", false);

        let provider = provider(&temp, false);
        let data = provider.get_file("images/K1.info/IMG_1.jpg").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"asset"[..]));
        assert_eq!(provider.get_file("images/K9.info/x.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_writes_are_unsupported() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(IMAGES_DIR)).unwrap();
        let provider = provider(&temp, false);

        let upload = provider
            .upload_file("a.jpg", Bytes::from_static(b"x"), &UploadOptions::default())
            .await;
        assert!(matches!(upload, Err(Error::Unsupported(_))));
        assert!(matches!(provider.delete_file("a.jpg").await, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_live_photos_pair_across_folders() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "K1", "IMG_7", "heic", false);
        write_item(temp.path(), "K2", "IMG_7", "mov", false);
        write_item(temp.path(), "K3", "IMG_8", "jpg", false);

        let provider = provider(&temp, false);
        let objects = provider.list_all_files().await.unwrap();
        let pairs = provider.detect_live_photos(&objects);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs["images/K1.info/IMG_7.heic"].key, "images/K2.info/IMG_7.mov");
    }

    #[test]
    fn test_missing_library_fails() {
        let temp = TempDir::new().unwrap();
        let result = EagleProvider::new(EagleConfig {
            library_path: temp.path().join("nope").to_string_lossy().into_owned(),
            base_url: None,
            include_deleted: false,
        });
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
