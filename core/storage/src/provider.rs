//! Storage provider trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use gallerystore_common::{types, Result};

use crate::live_photo;

/// File extensions treated as photos by `list_images`.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif", "hif", "avif",
];

/// Check whether a key names a supported image file.
pub fn is_image_key(key: &str) -> bool {
    types::extension(key)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Descriptor of a stored object.
///
/// A snapshot: every write produces a new descriptor instead of mutating
/// an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Provider-defined key of the object.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// ETag or equivalent content fingerprint.
    pub etag: Option<String>,
}

impl StorageObject {
    /// Build a descriptor for bytes that are known locally but not yet
    /// confirmed by a backend.
    pub fn placeholder(key: impl Into<String>, size: usize) -> Self {
        Self {
            key: key.into(),
            size: size as u64,
            last_modified: Utc::now(),
            etag: None,
        }
    }
}

/// Options passed along with an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// MIME type of the payload.
    pub content_type: Option<String>,
}

impl UploadOptions {
    /// Options with an explicit content type.
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// Storage provider trait for different backends.
///
/// Implementations must handle their own authentication and rate limiting.
/// Listing order is provider-defined.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider kind (e.g., "s3", "github", "local").
    fn name(&self) -> &str;

    /// Read an object.
    ///
    /// Returns `Ok(None)` when the key does not exist; absence is not an error.
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>>;

    /// List every stored object.
    async fn list_all_files(&self) -> Result<Vec<StorageObject>>;

    /// Get the stored descriptor of one object, or `None` if absent.
    ///
    /// The default scans `list_all_files`; backends with a cheap
    /// metadata lookup override it.
    async fn stat_file(&self, key: &str) -> Result<Option<StorageObject>> {
        let key = types::normalize_key(key);
        let files = self.list_all_files().await?;
        Ok(files.into_iter().find(|o| o.key == key))
    }

    /// List stored photos.
    ///
    /// The default filters `list_all_files` by image extension.
    async fn list_images(&self) -> Result<Vec<StorageObject>> {
        let files = self.list_all_files().await?;
        Ok(files.into_iter().filter(|o| is_image_key(&o.key)).collect())
    }

    /// Build a URL usable by front-end rendering.
    async fn generate_public_url(&self, key: &str) -> Result<String>;

    /// Pair still images with their motion counterparts.
    ///
    /// Returns a map from image key to the paired video object.
    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        live_photo::pair_live_photos(objects)
    }

    /// Delete an object.
    async fn delete_file(&self, key: &str) -> Result<()>;

    /// Write an object, replacing any existing content.
    ///
    /// # Postconditions
    /// - Returns the backend-reported descriptor of the written object
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<StorageObject>;

    /// Query the optional native move capability.
    ///
    /// Backends without a native move return `None`; callers fall back to
    /// download, upload and delete.
    fn as_movable(&self) -> Option<&dyn MovableProvider> {
        None
    }
}

/// Optional capability for backends with a native move.
#[async_trait]
pub trait MovableProvider: StorageProvider {
    /// Move an object to a new key.
    ///
    /// # Errors
    /// - Source not found
    /// - Backend errors
    async fn move_file(
        &self,
        source: &str,
        target: &str,
        options: &UploadOptions,
    ) -> Result<StorageObject>;
}
