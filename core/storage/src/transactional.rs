//! Transactional storage manager.
//!
//! Turns every write of one build pass into a two-phase commit:
//! - Uploads, deletes and moves are staged locally; uploads are answered
//!   with a placeholder descriptor
//! - `flush_uploads` applies staged uploads in order, recording each in a
//!   ledger, then applies staged deletes
//! - `rollback_uploads` drops what is still staged and deletes what the ledger
//!   recorded
//!
//! A prefetch cache lets callers hand in bytes they already hold so reads of
//! those keys skip the backend.
//!
//! The manager is single-writer: mutating operations take `&mut self`.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use gallerystore_common::{Error, Result};

use crate::manager::StorageManager;
use crate::provider::{StorageObject, StorageProvider, UploadOptions};

/// A write recorded locally but not yet applied to the backend.
#[derive(Debug, Clone)]
struct StagedUpload {
    key: String,
    data: Bytes,
    options: UploadOptions,
    placeholder: StorageObject,
}

/// Outcome of a rollback.
///
/// Rollback never stops early; failed deletes are collected here.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Number of staged uploads dropped without touching the backend.
    pub discarded: usize,
    /// Number of staged deletes dropped without touching the backend.
    pub discarded_deletes: usize,
    /// Ledger keys deleted from the backend.
    pub deleted: Vec<String>,
    /// Ledger keys whose delete failed, with the error.
    pub failed: Vec<(String, Error)>,
}

impl RollbackReport {
    /// True when every ledger key was deleted.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Storage manager with write staging, commit and rollback.
#[derive(Debug)]
pub struct TransactionalStorageManager {
    inner: StorageManager,
    buffer_cache: HashMap<String, Bytes>,
    pending: Vec<StagedUpload>,
    pending_deletes: Vec<String>,
    persisted: BTreeMap<String, StorageObject>,
}

impl TransactionalStorageManager {
    /// Wrap a manager. Starts idle: nothing staged, empty ledger.
    pub fn new(inner: StorageManager) -> Self {
        Self {
            inner,
            buffer_cache: HashMap::new(),
            pending: Vec::new(),
            pending_deletes: Vec::new(),
            persisted: BTreeMap::new(),
        }
    }

    /// Create a transactional manager directly over a provider.
    pub fn with_provider(provider: Arc<dyn StorageProvider>) -> Self {
        Self::new(StorageManager::new(provider))
    }

    /// Get the wrapped manager.
    pub fn manager(&self) -> &StorageManager {
        &self.inner
    }

    /// Get the wrapped manager mutably (filters, provider switch).
    pub fn manager_mut(&mut self) -> &mut StorageManager {
        &mut self.inner
    }

    /// Unwrap the manager. Staged uploads and the ledger are dropped.
    pub fn into_inner(self) -> StorageManager {
        if self.has_pending_uploads() {
            warn!(
                pending = self.pending.len(),
                pending_deletes = self.pending_deletes.len(),
                "Dropping transactional manager with staged writes"
            );
        }
        self.inner
    }

    // ==================== Prefetch cache ====================

    /// Register bytes to serve for `key` instead of reading the backend.
    pub fn stage_buffer(&mut self, key: impl Into<String>, data: Bytes) {
        let key = key.into();
        debug!(key = %key, size_bytes = data.len(), "Caching prefetched buffer");
        self.buffer_cache.insert(key, data);
    }

    /// Drop a cached buffer. Returns true if one was present.
    pub fn evict_buffer(&mut self, key: &str) -> bool {
        self.buffer_cache.remove(key).is_some()
    }

    /// Drop every cached buffer.
    pub fn clear_buffers(&mut self) {
        self.buffer_cache.clear();
    }

    /// Check whether a key has a cached buffer.
    pub fn is_buffered(&self, key: &str) -> bool {
        self.buffer_cache.contains_key(key)
    }

    // ==================== Reads ====================

    /// Read an object.
    ///
    /// Serves the most recently staged upload for `key` first, then the
    /// prefetch cache, then the backend. A staged delete hides the key.
    pub async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        if let Some(staged) = self.latest_staged(key) {
            debug!(key = %key, "Serving staged upload");
            return Ok(Some(staged.data.clone()));
        }

        if self.is_delete_staged(key) {
            return Ok(None);
        }

        if let Some(data) = self.buffer_cache.get(key) {
            debug!(key = %key, "Serving prefetched buffer");
            return Ok(Some(data.clone()));
        }

        self.inner.get_file(key).await
    }

    /// List photos from the backend. Staged uploads are not included.
    pub async fn list_images(&self) -> Result<Vec<StorageObject>> {
        self.inner.list_images().await
    }

    /// List every object from the backend. Staged uploads are not included.
    pub async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        self.inner.list_all_files().await
    }

    /// Build a public URL for a key.
    pub async fn generate_public_url(&self, key: &str) -> Result<String> {
        self.inner.generate_public_url(key).await
    }

    /// Pair images with their motion counterparts.
    pub async fn detect_live_photos(
        &self,
        objects: Option<&[StorageObject]>,
    ) -> Result<HashMap<String, StorageObject>> {
        self.inner.detect_live_photos(objects).await
    }

    // ==================== Writes ====================

    fn latest_staged(&self, key: &str) -> Option<&StagedUpload> {
        self.pending.iter().rev().find(|s| s.key == key)
    }

    fn is_delete_staged(&self, key: &str) -> bool {
        self.pending_deletes.iter().any(|k| k == key)
    }

    /// Stage an upload and return a placeholder descriptor.
    ///
    /// Nothing reaches the backend until [`flush_uploads`](Self::flush_uploads).
    /// A cached buffer or staged delete for the key is dropped, so later
    /// reads see the staged bytes.
    pub fn upload_file(
        &mut self,
        key: impl Into<String>,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageObject {
        let key = key.into();
        let placeholder = StorageObject::placeholder(key.clone(), data.len());

        self.buffer_cache.remove(&key);
        self.pending_deletes.retain(|k| k != &key);
        debug!(key = %key, size_bytes = data.len(), "Staged upload");
        self.pending.push(StagedUpload {
            key,
            data,
            options,
            placeholder: placeholder.clone(),
        });

        placeholder
    }

    /// Stage a delete.
    ///
    /// Staged uploads and the cached buffer for the key are dropped, so
    /// reads return `None` until the key is written again. The backend
    /// object is deleted by [`flush_uploads`](Self::flush_uploads); a key
    /// absent from the backend at that point is skipped.
    ///
    /// # Errors
    /// - Empty key
    pub fn delete_file(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidInput("Key cannot be empty".to_string()));
        }

        self.buffer_cache.remove(key);
        let before = self.pending.len();
        self.pending.retain(|s| s.key != key);
        if !self.is_delete_staged(key) {
            self.pending_deletes.push(key.to_string());
        }

        debug!(
            key = %key,
            dropped_uploads = before - self.pending.len(),
            "Staged delete"
        );
        Ok(())
    }

    /// Stage a move as an upload of the source bytes to `target` plus a
    /// delete of `source`.
    ///
    /// The source is resolved like [`get_file`](Self::get_file), so a
    /// staged or prefetched source can be moved. Nothing reaches the
    /// backend until flush, and a rollback before flush leaves both keys
    /// untouched.
    ///
    /// # Errors
    /// - Empty source or target key
    /// - Source does not exist
    /// - Backend read errors
    pub async fn move_file(
        &mut self,
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
            if let Some(staged) = self.latest_staged(source) {
                return Ok(staged.placeholder.clone());
            }
            if self.is_delete_staged(source) {
                return Err(Error::NotFound(format!("Source not found: {}", source)));
            }
            return self.inner.move_file(source, target, options).await;
        }

        let data = self
            .get_file(source)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Source not found: {}", source)))?;

        let placeholder = self.upload_file(target, data, options.clone());
        self.delete_file(source)?;
        debug!(source = %source, target = %target, "Staged move");

        Ok(placeholder)
    }

    /// Check whether any staged upload or delete has not been flushed.
    pub fn has_pending_uploads(&self) -> bool {
        !self.pending.is_empty() || !self.pending_deletes.is_empty()
    }

    /// Keys of staged uploads, in staging order.
    pub fn pending_keys(&self) -> Vec<&str> {
        self.pending.iter().map(|s| s.key.as_str()).collect()
    }

    /// Keys of staged deletes, in staging order.
    pub fn pending_deletes(&self) -> &[String] {
        &self.pending_deletes
    }

    /// Ledger of writes applied to the backend in this transaction.
    pub fn persisted_uploads(&self) -> &BTreeMap<String, StorageObject> {
        &self.persisted
    }

    // ==================== Commit / abort ====================

    /// Apply staged uploads to the backend in staging order, then staged
    /// deletes.
    ///
    /// Returns the backend-reported descriptors, one per staged upload.
    /// Each successful upload is recorded in the ledger as it completes;
    /// a deleted key leaves the ledger.
    ///
    /// # Errors
    /// The first backend failure stops the flush. Writes applied before it
    /// stay applied and uploads stay in the ledger; the failed write and
    /// every write after it remain staged. Deletes only run once every
    /// upload succeeded.
    pub async fn flush_uploads(&mut self) -> Result<Vec<StorageObject>> {
        if !self.has_pending_uploads() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let staged = std::mem::take(&mut self.pending);
        let total = staged.len();
        let mut committed = Vec::with_capacity(total);
        let mut remaining = staged.into_iter();

        while let Some(upload) = remaining.next() {
            match self
                .inner
                .upload_file(&upload.key, upload.data.clone(), &upload.options)
                .await
            {
                Ok(object) => {
                    debug!(key = %upload.key, size_bytes = object.size, "Flushed upload");
                    self.persisted.insert(upload.key, object.clone());
                    committed.push(object);
                }
                Err(e) => {
                    warn!(
                        key = %upload.key,
                        flushed = committed.len(),
                        total,
                        error = %e,
                        "Flush stopped by failed upload"
                    );
                    self.pending.push(upload);
                    self.pending.extend(remaining);
                    return Err(e);
                }
            }
        }

        self.flush_deletes().await?;

        info!(
            count = committed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Flushed staged uploads"
        );
        Ok(committed)
    }

    async fn flush_deletes(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.pending_deletes);
        let mut remaining = staged.into_iter();

        while let Some(key) = remaining.next() {
            match self.inner.delete_file(&key).await {
                Ok(()) => debug!(key = %key, "Flushed delete"),
                Err(e) if e.is_not_found() => debug!(key = %key, "Delete target already absent"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Flush stopped by failed delete");
                    self.pending_deletes.push(key);
                    self.pending_deletes.extend(remaining);
                    return Err(e);
                }
            }
            self.persisted.remove(&key);
        }

        Ok(())
    }

    /// Abort the transaction.
    ///
    /// Drops every staged write, then deletes every ledger key from the
    /// backend. Delete failures are collected and never stop the loop.
    /// The ledger is empty afterwards.
    pub async fn rollback_uploads(&mut self) -> RollbackReport {
        let mut report = RollbackReport {
            discarded: self.pending.len(),
            discarded_deletes: self.pending_deletes.len(),
            ..RollbackReport::default()
        };
        self.pending.clear();
        self.pending_deletes.clear();

        let ledger = std::mem::take(&mut self.persisted);
        for key in ledger.into_keys() {
            self.buffer_cache.remove(&key);
            match self.inner.delete_file(&key).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "Rollback failed to delete upload");
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            discarded = report.discarded,
            discarded_deletes = report.discarded_deletes,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Rolled back uploads"
        );
        report
    }

    /// Close the transaction after a successful flush.
    ///
    /// Returns the ledger and clears it, so a later rollback cannot touch
    /// committed writes.
    pub fn finish(&mut self) -> BTreeMap<String, StorageObject> {
        if self.has_pending_uploads() {
            warn!(
                pending = self.pending.len(),
                pending_deletes = self.pending_deletes.len(),
                "Finishing transaction with unflushed writes"
            );
        }
        std::mem::take(&mut self.persisted)
    }
}
