//! S3-compatible object store provider.
//!
//! Serves AWS S3 and any service speaking its API (MinIO, Cloudflare R2,
//! Backblaze B2). Keys are relative to the configured prefix.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectMeta, ObjectStore, ObjectStoreExt,
    PutOptions, PutPayload,
};
use std::time::Instant;

use gallerystore_common::{types, Error, Result};

use crate::config::S3Config;
use crate::provider::{MovableProvider, StorageObject, StorageProvider, UploadOptions};
use crate::urls;

/// S3-compatible storage provider.
pub struct S3Provider {
    kind: &'static str,
    store: AmazonS3,
    config: S3Config,
    prefix: String,
}

impl S3Provider {
    /// Create a new S3 provider.
    ///
    /// `kind` is the registry kind this instance serves (`s3` or `b2`).
    ///
    /// # Errors
    /// - Missing bucket or region
    /// - Client construction failure
    pub fn new(config: S3Config, kind: &'static str) -> Result<Self> {
        if config.bucket.is_empty() || config.region.is_empty() {
            return Err(Error::Config(format!(
                "{} provider requires 'bucket' and 'region'",
                kind
            )));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_region(config.region.clone())
            .with_bucket_name(config.bucket.clone());

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id.clone());
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret.clone());
        }

        let store = builder
            .build()
            .map_err(|e| Error::Config(format!("Invalid {} config: {}", kind, e)))?;

        let prefix = config
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_default();

        Ok(Self {
            kind,
            store,
            config,
            prefix,
        })
    }

    /// Map a key to its full object name in the bucket.
    fn object_name(&self, key: &str) -> String {
        types::join_key(&self.prefix, &types::normalize_key(key))
    }

    fn location(&self, key: &str) -> ObjectPath {
        ObjectPath::from(self.object_name(key))
    }

    /// Map a full object name back to a key, if it lives under the prefix.
    fn key_for(&self, object_name: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return Some(object_name.to_string());
        }
        object_name
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    fn to_object(&self, meta: &ObjectMeta) -> Option<StorageObject> {
        let key = self.key_for(meta.location.as_ref())?;
        Some(StorageObject {
            key,
            size: meta.size,
            last_modified: meta.last_modified,
            etag: meta.e_tag.clone(),
        })
    }

    /// Build the public URL of a key.
    fn public_url(&self, key: &str) -> String {
        let name = self.object_name(key);
        if let Some(domain) = &self.config.custom_domain {
            urls::join_url(domain, &name)
        } else if let Some(endpoint) = &self.config.endpoint {
            urls::join_url(&format!("{}/{}", endpoint.trim_end_matches('/'), self.config.bucket), &name)
        } else {
            urls::join_url(
                &format!(
                    "https://{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
                &name,
            )
        }
    }

    /// Drain a listing stream, stopping once `max_file_limit` objects
    /// are collected.
    async fn collect_listing<S>(&self, mut listing: S, start: Instant) -> Result<Vec<StorageObject>>
    where
        S: Stream<Item = object_store::Result<ObjectMeta>> + Unpin,
    {
        let limit = self.config.max_file_limit;
        let mut results = Vec::new();

        while !limit.is_some_and(|limit| results.len() >= limit) {
            let Some(meta) = listing.next().await else {
                break;
            };
            let meta = meta.map_err(|e| self.backend_error("list", &self.prefix, e, start))?;
            if let Some(object) = self.to_object(&meta) {
                results.push(object);
            }
        }

        Ok(results)
    }

    fn backend_error(&self, op: &str, key: &str, err: ObjectStoreError, start: Instant) -> Error {
        tracing::error!(
            error = %err,
            bucket = %self.config.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 {} failed",
            op
        );
        Error::Storage(format!("S3 {} failed for '{}': {}", op, key, err))
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        self.kind
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let start = Instant::now();

        let result = match self.store.get(&self.location(key)).await {
            Ok(result) => result,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(self.backend_error("download", key, e, start)),
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| self.backend_error("download", key, e, start))?;

        tracing::debug!(
            bucket = %self.config.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(Some(bytes))
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let start = Instant::now();
        let prefix = (!self.prefix.is_empty()).then(|| ObjectPath::from(self.prefix.as_str()));

        let listing = self.store.list(prefix.as_ref());
        let results = self.collect_listing(listing, start).await?;

        tracing::debug!(
            bucket = %self.config.bucket,
            count = results.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        Ok(results)
    }

    async fn stat_file(&self, key: &str) -> Result<Option<StorageObject>> {
        let start = Instant::now();

        match self.store.head(&self.location(key)).await {
            Ok(meta) => Ok(self.to_object(&meta)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.backend_error("head", key, e, start)),
        }
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        Ok(self.public_url(key))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let start = Instant::now();

        self.store
            .delete(&self.location(key))
            .await
            .map_err(|e| self.backend_error("delete", key, e, start))?;

        tracing::info!(bucket = %self.config.bucket, key = %key, "S3 delete successful");
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<StorageObject> {
        let start = Instant::now();
        let size = data.len() as u64;

        let mut attributes = Attributes::new();
        if let Some(content_type) = &options.content_type {
            attributes.insert(Attribute::ContentType, content_type.clone().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let put = self
            .store
            .put_opts(&self.location(key), PutPayload::from(data), opts)
            .await
            .map_err(|e| self.backend_error("upload", key, e, start))?;

        tracing::info!(
            bucket = %self.config.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(StorageObject {
            key: types::normalize_key(key),
            size,
            last_modified: Utc::now(),
            etag: put.e_tag,
        })
    }

    fn as_movable(&self) -> Option<&dyn MovableProvider> {
        Some(self)
    }
}

#[async_trait]
impl MovableProvider for S3Provider {
    /// Server-side copy followed by a delete of the source.
    async fn move_file(
        &self,
        source: &str,
        target: &str,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        let start = Instant::now();
        let from = self.location(source);
        let to = self.location(target);

        match self.store.copy(&from, &to).await {
            Ok(()) => {}
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(Error::NotFound(format!("Source not found: {}", source)))
            }
            Err(e) => return Err(self.backend_error("copy", source, e, start)),
        }

        self.store
            .delete(&from)
            .await
            .map_err(|e| self.backend_error("delete", source, e, start))?;

        let meta = self
            .store
            .head(&to)
            .await
            .map_err(|e| self.backend_error("head", target, e, start))?;

        self.to_object(&meta)
            .ok_or_else(|| Error::Storage(format!("Moved object outside prefix: {}", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            bucket: "photos".to_string(),
            region: "eu-central-1".to_string(),
            endpoint: None,
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            secret_access_key: Some("secret".to_string()),
            prefix: Some("/gallery/".to_string()),
            custom_domain: None,
            max_file_limit: None,
        }
    }

    #[test]
    fn test_key_mapping_with_prefix() {
        let provider = S3Provider::new(config(), "s3").unwrap();

        assert_eq!(provider.object_name("2024/a.jpg"), "gallery/2024/a.jpg");
        assert_eq!(provider.key_for("gallery/2024/a.jpg").as_deref(), Some("2024/a.jpg"));
        assert_eq!(provider.key_for("gallery-old/a.jpg"), None);
    }

    #[test]
    fn test_public_url_forms() {
        let provider = S3Provider::new(config(), "s3").unwrap();
        assert_eq!(
            provider.public_url("a b.jpg"),
            "https://photos.s3.eu-central-1.amazonaws.com/gallery/a%20b.jpg"
        );

        let mut with_endpoint = config();
        with_endpoint.endpoint = Some("http://localhost:9000/".to_string());
        let provider = S3Provider::new(with_endpoint, "s3").unwrap();
        assert_eq!(
            provider.public_url("a.jpg"),
            "http://localhost:9000/photos/gallery/a.jpg"
        );

        let mut with_domain = config();
        with_domain.custom_domain = Some("https://cdn.example.com".to_string());
        let provider = S3Provider::new(with_domain, "s3").unwrap();
        assert_eq!(provider.public_url("a.jpg"), "https://cdn.example.com/gallery/a.jpg");
    }

    fn meta(name: &str) -> object_store::Result<ObjectMeta> {
        Ok(ObjectMeta {
            location: ObjectPath::from(name),
            last_modified: Utc::now(),
            size: 3,
            e_tag: Some("etag".to_string()),
            version: None,
        })
    }

    #[tokio::test]
    async fn test_listing_respects_file_limit() {
        let names = ["gallery/a.jpg", "other/b.jpg", "gallery/c.jpg", "gallery/d.jpg"];

        let mut limited = config();
        limited.max_file_limit = Some(2);
        let provider = S3Provider::new(limited, "s3").unwrap();
        let listing = futures::stream::iter(names.map(meta));
        let keys: Vec<String> = provider
            .collect_listing(listing, Instant::now())
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["a.jpg", "c.jpg"]);

        let mut empty = config();
        empty.max_file_limit = Some(0);
        let provider = S3Provider::new(empty, "s3").unwrap();
        let listing = futures::stream::iter(names.map(meta));
        let objects = provider.collect_listing(listing, Instant::now()).await.unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_missing_bucket_fails() {
        let mut bad = config();
        bad.bucket.clear();
        assert!(matches!(S3Provider::new(bad, "s3"), Err(Error::Config(_))));
    }

    #[test]
    fn test_kind_is_reported() {
        let b2 = crate::config::B2Config {
            bucket: "photos".to_string(),
            region: "us-west-004".to_string(),
            application_key_id: "id".to_string(),
            application_key: "key".to_string(),
            prefix: None,
            custom_domain: None,
            max_file_limit: None,
        };
        let provider = S3Provider::new(b2.to_s3(), "b2").unwrap();
        assert_eq!(provider.name(), "b2");
        assert!(provider.as_movable().is_some());
    }
}
