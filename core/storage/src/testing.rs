//! Test double with failure injection and call counters.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use gallerystore_common::{Error, Result};

use crate::memory::MemoryProvider;
use crate::provider::{MovableProvider, StorageObject, StorageProvider, UploadOptions};

/// Memory-backed provider that can be told to fail specific keys.
#[derive(Default)]
pub struct FlakyProvider {
    pub inner: MemoryProvider,
    native_move: bool,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub moves: AtomicUsize,
}

impl FlakyProvider {
    /// Provider without a native move capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider exposing a native move capability.
    pub fn with_native_move() -> Self {
        Self {
            native_move: true,
            ..Self::default()
        }
    }

    pub fn fail_upload(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub async fn seed(&self, key: &str, data: &'static [u8]) {
        self.inner
            .upload_file(key, Bytes::from_static(data), &UploadOptions::default())
            .await
            .unwrap();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_file(key).await
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_all_files().await
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        self.inner.generate_public_url(key).await
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(Error::Storage(format!("injected delete failure: {}", key)));
        }
        self.inner.delete_file(key).await
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<StorageObject> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(Error::Storage(format!("injected upload failure: {}", key)));
        }
        self.inner.upload_file(key, data, options).await
    }

    fn as_movable(&self) -> Option<&dyn MovableProvider> {
        if self.native_move {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl MovableProvider for FlakyProvider {
    async fn move_file(
        &self,
        source: &str,
        target: &str,
        options: &UploadOptions,
    ) -> Result<StorageObject> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        self.inner.move_file(source, target, options).await
    }
}
