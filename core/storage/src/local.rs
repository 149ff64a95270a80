//! Local filesystem storage provider.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use gallerystore_common::{types, Error, Result};

use crate::config::LocalConfig;
use crate::provider::{MovableProvider, StorageObject, StorageProvider, UploadOptions};
use crate::urls;

/// Convert a key to a filesystem path under `root`.
///
/// # Errors
/// - Key is empty, absolute, or escapes the root
pub(crate) fn resolve_key_path(root: &Path, key: &str) -> Result<PathBuf> {
    let key = types::normalize_key(key);
    if key.is_empty() {
        return Err(Error::InvalidInput("Key cannot be empty".to_string()));
    }

    let mut fs_path = root.to_path_buf();
    for component in Path::new(&key).components() {
        match component {
            Component::Normal(part) => fs_path.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidInput(format!(
                    "Key escapes storage root: {}",
                    key
                )))
            }
        }
    }
    Ok(fs_path)
}

/// Build a `file://` URL for a path.
pub(crate) fn file_url(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|_| Error::InvalidInput(format!("Cannot build file URL for {}", path.display())))
}

/// Local filesystem storage provider.
///
/// Keys are `/`-separated paths relative to the configured root.
pub struct LocalProvider {
    root: PathBuf,
    base_url: Option<String>,
    max_file_limit: Option<usize>,
}

impl LocalProvider {
    /// Create a new local provider.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Empty base path
    /// - Permission denied
    pub fn new(config: LocalConfig) -> Result<Self> {
        if config.base_path.is_empty() {
            return Err(Error::Config("Local provider requires 'basePath'".to_string()));
        }

        let root = PathBuf::from(&config.base_path);

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            base_url: config.base_url,
            max_file_limit: config.max_file_limit,
        })
    }

    /// Create a provider rooted at a directory, without a public base URL.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self> {
        Self::new(LocalConfig {
            base_path: root.as_ref().to_string_lossy().into_owned(),
            base_url: None,
            max_file_limit: None,
        })
    }

    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        resolve_key_path(&self.root, key)
    }

    fn to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Create a descriptor from filesystem metadata.
    fn create_object(&self, key: &str, fs_meta: &std::fs::Metadata) -> StorageObject {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        StorageObject {
            key: key.to_string(),
            size: fs_meta.len(),
            last_modified: modified,
            etag: Some(format!("{}-{}", modified.timestamp(), fs_meta.len())),
        }
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let fs_path = self.to_fs_path(key)?;

        match fs::read(&fs_path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if fs_path.is_dir() => {
                tracing::debug!(key = %key, error = %e, "Key names a directory");
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let mut results = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let entry_path = entry.path();
                let fs_meta = entry.metadata().await?;
                if fs_meta.is_dir() {
                    pending.push(entry_path);
                } else if fs_meta.is_file() {
                    if let Some(key) = self.to_key(&entry_path) {
                        results.push(self.create_object(&key, &fs_meta));
                    }
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(limit) = self.max_file_limit {
            results.truncate(limit);
        }

        tracing::debug!(root = %self.root.display(), count = results.len(), "Listed local files");
        Ok(results)
    }

    async fn stat_file(&self, key: &str) -> Result<Option<StorageObject>> {
        let fs_path = self.to_fs_path(key)?;

        match fs::metadata(&fs_path).await {
            Ok(fs_meta) if fs_meta.is_file() => {
                Ok(Some(self.create_object(&types::normalize_key(key), &fs_meta)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        match &self.base_url {
            Some(base) => Ok(urls::join_url(base, &types::normalize_key(key))),
            None => file_url(&self.to_fs_path(key)?),
        }
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let fs_path = self.to_fs_path(key)?;

        if !fs_path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", key)));
        }

        if fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Key names a directory: {}", key)));
        }

        fs::remove_file(&fs_path).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        let fs_path = self.to_fs_path(key)?;
        Self::ensure_parent(&fs_path).await?;

        fs::write(&fs_path, &data).await?;

        let fs_meta = fs::metadata(&fs_path).await?;
        Ok(self.create_object(&types::normalize_key(key), &fs_meta))
    }

    fn as_movable(&self) -> Option<&dyn MovableProvider> {
        Some(self)
    }
}

#[async_trait]
impl MovableProvider for LocalProvider {
    async fn move_file(
        &self,
        source: &str,
        target: &str,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        let from_path = self.to_fs_path(source)?;
        let to_path = self.to_fs_path(target)?;

        if !from_path.is_file() {
            return Err(Error::NotFound(format!("Source not found: {}", source)));
        }

        Self::ensure_parent(&to_path).await?;
        fs::rename(&from_path, &to_path).await?;

        let fs_meta = fs::metadata(&to_path).await?;
        Ok(self.create_object(&types::normalize_key(target), &fs_meta))
    }
}
