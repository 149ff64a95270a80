//! Storage manager: cross-cutting policy over any provider.
//!
//! The manager wraps exactly one provider at a time and adds behavior that
//! must be identical for every backend:
//! - Exclusion filters hide matching keys from every listing and Live Photo
//!   detection result
//! - `move_file` falls back to download, upload and delete when the
//!   provider has no native move
//! - The provider can be swapped at runtime without losing filters

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use gallerystore_common::{Error, KeyPrefix, Result};

use crate::config::StorageConfig;
use crate::provider::{StorageObject, StorageProvider, UploadOptions};
use crate::registry::ProviderRegistry;

/// Predicate over a key; `true` hides the object.
pub type ExclusionFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Policy layer over a single storage provider.
pub struct StorageManager {
    provider: Arc<dyn StorageProvider>,
    filters: Vec<ExclusionFilter>,
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("provider", &self.provider.name())
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl StorageManager {
    /// Create a manager over an existing provider.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            provider,
            filters: Vec::new(),
        }
    }

    /// Build the provider for `config` and wrap it.
    ///
    /// # Errors
    /// - Unknown provider kind
    /// - Provider construction failure
    pub fn from_config(registry: &ProviderRegistry, config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(registry.create(config)?))
    }

    /// Get the active provider.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Redirect the manager to another provider, keeping exclusion filters.
    pub fn set_provider(&mut self, provider: Arc<dyn StorageProvider>) {
        info!(
            from = %self.provider.name(),
            to = %provider.name(),
            "Switching storage provider"
        );
        self.provider = provider;
    }

    /// Build a provider from a new configuration and switch to it.
    ///
    /// On error the current provider stays active.
    pub fn switch_provider(
        &mut self,
        registry: &ProviderRegistry,
        config: &StorageConfig,
    ) -> Result<()> {
        let provider = registry.create(config)?;
        self.set_provider(provider);
        Ok(())
    }

    /// Add an exclusion filter. Filters combine with OR.
    pub fn add_exclusion_filter<F>(&mut self, filter: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
    }

    /// Hide every key under a directory prefix.
    ///
    /// Separators are normalized and a trailing `/` is enforced, so
    /// `drafts` does not hide `drafts-old/`.
    ///
    /// # Errors
    /// - Empty prefix
    pub fn add_excluded_prefix(&mut self, prefix: &str) -> Result<()> {
        let prefix = KeyPrefix::new(prefix)?;
        debug!(prefix = %prefix, "Adding excluded prefix");
        self.add_exclusion_filter(move |key| prefix.matches(key));
        Ok(())
    }

    /// Number of registered exclusion filters.
    pub fn exclusion_filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Check whether any filter hides a key.
    pub fn is_excluded(&self, key: &str) -> bool {
        self.filters.iter().any(|filter| filter(key))
    }

    fn apply_filters(&self, objects: Vec<StorageObject>) -> Vec<StorageObject> {
        if self.filters.is_empty() {
            return objects;
        }

        let before = objects.len();
        let kept: Vec<StorageObject> = objects
            .into_iter()
            .filter(|o| !self.is_excluded(&o.key))
            .collect();

        if kept.len() != before {
            debug!(excluded = before - kept.len(), "Applied exclusion filters");
        }
        kept
    }

    /// Read an object. Returns `Ok(None)` if it does not exist.
    pub async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        self.provider.get_file(key).await
    }

    /// List photos, without excluded keys.
    pub async fn list_images(&self) -> Result<Vec<StorageObject>> {
        let images = self.provider.list_images().await?;
        Ok(self.apply_filters(images))
    }

    /// List every object, without excluded keys.
    pub async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let files = self.provider.list_all_files().await?;
        Ok(self.apply_filters(files))
    }

    /// Build a public URL for a key.
    pub async fn generate_public_url(&self, key: &str) -> Result<String> {
        self.provider.generate_public_url(key).await
    }

    /// Pair images with their motion counterparts.
    ///
    /// `objects` avoids a second listing when the caller already has one;
    /// it is filtered like a fresh listing would be.
    pub async fn detect_live_photos(
        &self,
        objects: Option<&[StorageObject]>,
    ) -> Result<HashMap<String, StorageObject>> {
        let objects = match objects {
            Some(objects) => self.apply_filters(objects.to_vec()),
            None => self.list_all_files().await?,
        };

        Ok(self.provider.detect_live_photos(&objects))
    }

    /// Delete an object.
    pub async fn delete_file(&self, key: &str) -> Result<()> {
        self.provider.delete_file(key).await
    }

    /// Write an object.
    pub async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<StorageObject> {
        self.provider.upload_file(key, data, options).await
    }

    /// Move an object to a new key.
    ///
    /// Moving a key onto itself returns the stored descriptor unchanged.
    /// Otherwise the provider's native move is used when available, else
    /// the source is downloaded, uploaded to the target and deleted; if that
    /// delete fails, the target is deleted again and the delete error is
    /// returned as [`Error::MoveIncomplete`].
    ///
    /// # Errors
    /// - Empty source or target key
    /// - Source does not exist
    /// - Backend errors
    pub async fn move_file(
        &self,
        source: &str,
        target: &str,
        options: &UploadOptions,
    ) -> Result<StorageObject> {
        if source.is_empty() || target.is_empty() {
            return Err(Error::InvalidInput(
                "Move requires non-empty source and target keys".to_string(),
            ));
        }

        if source == target {
            return self
                .provider
                .stat_file(source)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Source not found: {}", source)));
        }

        if let Some(movable) = self.provider.as_movable() {
            debug!(source = %source, target = %target, "Using native move");
            return movable.move_file(source, target, options).await;
        }

        let data = self
            .provider
            .get_file(source)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Source not found: {}", source)))?;

        let object = self.provider.upload_file(target, data, options).await?;

        if let Err(cause) = self.provider.delete_file(source).await {
            warn!(
                source = %source,
                target = %target,
                error = %cause,
                "Failed to delete move source; removing target"
            );

            let compensation = match self.provider.delete_file(target).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(target = %target, error = %e, "Failed to remove move target");
                    Some(Box::new(e))
                }
            };

            return Err(Error::MoveIncomplete {
                source_key: source.to_string(),
                target_key: target.to_string(),
                cause: Box::new(cause),
                compensation,
            });
        }

        info!(source = %source, target = %target, "Moved object via copy and delete");
        Ok(object)
    }
}
