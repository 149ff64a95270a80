//! GitHub repository storage provider implementation.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use gallerystore_common::{types, Error, Result};

use crate::config::GitHubConfig;
use crate::provider::{StorageObject, StorageProvider, UploadOptions};
use crate::urls;

use super::client::{GitHubClient, TreeEntry};

/// GitHub repository storage provider.
///
/// Every write is a commit on the configured branch. There is no native
/// move; the manager falls back to copy and delete.
pub struct GitHubProvider {
    config: GitHubConfig,
    client: GitHubClient,
    root: String,
}

impl GitHubProvider {
    /// Create a new GitHub provider.
    ///
    /// # Errors
    /// - Missing owner or repository
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(Error::Config(
                "GitHub provider requires 'owner' and 'repo'".to_string(),
            ));
        }

        let client = GitHubClient::new(
            config.owner.clone(),
            config.repo.clone(),
            config.branch.clone(),
            config.token.clone(),
        )?;
        let root = config
            .path
            .as_deref()
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_default();

        Ok(Self {
            config,
            client,
            root,
        })
    }

    /// Map a key to its path in the repository.
    fn repo_path(&self, key: &str) -> String {
        types::join_key(&self.root, &types::normalize_key(key))
    }

    /// Map a repository path back to a key, if it lives under the root.
    fn key_for(&self, path: &str) -> Option<String> {
        if self.root.is_empty() {
            return Some(path.to_string());
        }
        path.strip_prefix(&self.root)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    fn require_token(&self) -> Result<()> {
        if self.config.token.is_none() {
            return Err(Error::Config(
                "GitHub provider requires a token for writes".to_string(),
            ));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        let path = self.repo_path(key);
        let GitHubConfig {
            owner,
            repo,
            branch,
            ..
        } = &self.config;

        if let Some(domain) = &self.config.custom_domain {
            urls::join_url(domain, &path)
        } else if self.config.use_raw_url {
            urls::join_url(
                &format!("https://raw.githubusercontent.com/{}/{}/{}", owner, repo, branch),
                &path,
            )
        } else {
            format!(
                "{}?raw=true",
                urls::join_url(
                    &format!("https://github.com/{}/{}/blob/{}", owner, repo, branch),
                    &path
                )
            )
        }
    }

    fn to_objects(
        &self,
        entries: Vec<TreeEntry>,
        modified: chrono::DateTime<Utc>,
    ) -> Vec<StorageObject> {
        entries
            .into_iter()
            .filter(TreeEntry::is_blob)
            .filter_map(|entry| {
                let key = self.key_for(&entry.path)?;
                Some(StorageObject {
                    key,
                    size: entry.size.unwrap_or(0),
                    last_modified: modified,
                    etag: Some(entry.sha),
                })
            })
            .collect()
    }
}

#[async_trait]
impl StorageProvider for GitHubProvider {
    fn name(&self) -> &str {
        "github"
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        self.client.download(&self.repo_path(key)).await
    }

    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let entries = self.client.list_tree().await?;
        // Trees carry no per-file timestamps; the head commit date stands in.
        let modified = self.client.head_commit_date().await?.unwrap_or_else(Utc::now);

        let objects = self.to_objects(entries, modified);
        tracing::debug!(
            repo = %self.config.repo,
            branch = %self.client.branch(),
            count = objects.len(),
            "Listed GitHub files"
        );
        Ok(objects)
    }

    async fn generate_public_url(&self, key: &str) -> Result<String> {
        Ok(self.public_url(key))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.require_token()?;
        let path = self.repo_path(key);

        let sha = self
            .client
            .file_sha(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", key)))?;

        self.client
            .delete_file(&path, &sha, &format!("Delete {}", path))
            .await?;

        tracing::info!(repo = %self.config.repo, key = %key, "GitHub delete successful");
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: &UploadOptions,
    ) -> Result<StorageObject> {
        self.require_token()?;
        let path = self.repo_path(key);

        let existing = self.client.file_sha(&path).await?;
        let message = match existing {
            Some(_) => format!("Update {}", path),
            None => format!("Add {}", path),
        };

        let response = self
            .client
            .put_file(&path, &data, existing.as_deref(), &message)
            .await?;

        tracing::info!(
            repo = %self.config.repo,
            key = %key,
            size_bytes = data.len(),
            "GitHub upload successful"
        );

        Ok(StorageObject {
            key: types::normalize_key(key),
            size: response.content.size,
            last_modified: response.committed_at().unwrap_or_else(Utc::now),
            etag: Some(response.content.sha),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> GitHubConfig {
        GitHubConfig {
            owner: "me".to_string(),
            repo: "gallery".to_string(),
            branch: "main".to_string(),
            token: None,
            path: Some("/photos/".to_string()),
            use_raw_url: true,
            custom_domain: None,
        }
    }

    #[test]
    fn test_missing_repo_fails() {
        let mut config = create_test_config();
        config.repo.clear();
        assert!(matches!(GitHubProvider::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_key_mapping() {
        let provider = GitHubProvider::new(create_test_config()).unwrap();

        assert_eq!(provider.repo_path("2024/a.jpg"), "photos/2024/a.jpg");
        assert_eq!(provider.key_for("photos/2024/a.jpg").as_deref(), Some("2024/a.jpg"));
        assert_eq!(provider.key_for("README.md"), None);
    }

    #[test]
    fn test_public_urls() {
        let provider = GitHubProvider::new(create_test_config()).unwrap();
        assert_eq!(
            provider.public_url("a.jpg"),
            "https://raw.githubusercontent.com/me/gallery/main/photos/a.jpg"
        );

        let mut blob = create_test_config();
        blob.use_raw_url = false;
        let provider = GitHubProvider::new(blob).unwrap();
        assert_eq!(
            provider.public_url("a.jpg"),
            "https://github.com/me/gallery/blob/main/photos/a.jpg?raw=true"
        );
    }

    #[test]
    fn test_to_objects_keeps_blobs_under_root() {
        let provider = GitHubProvider::new(create_test_config()).unwrap();
        let entries = vec![
            TreeEntry {
                path: "photos".to_string(),
                kind: "tree".to_string(),
                sha: "t".to_string(),
                size: None,
            },
            TreeEntry {
                path: "photos/a.jpg".to_string(),
                kind: "blob".to_string(),
                sha: "b1".to_string(),
                size: Some(5),
            },
            TreeEntry {
                path: "README.md".to_string(),
                kind: "blob".to_string(),
                sha: "b2".to_string(),
                size: Some(1),
            },
        ];

        let objects = provider.to_objects(entries, Utc::now());
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "a.jpg");
        assert_eq!(objects[0].etag.as_deref(), Some("b1"));
    }

    #[test]
    fn test_no_native_move() {
        let provider = GitHubProvider::new(create_test_config()).unwrap();
        assert!(provider.as_movable().is_none());
    }

    #[tokio::test]
    async fn test_writes_require_token() {
        let provider = GitHubProvider::new(create_test_config()).unwrap();
        let result = provider
            .upload_file("a.jpg", Bytes::from_static(b"x"), &UploadOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
