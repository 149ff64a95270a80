//! GitHub REST API client for repository contents.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use gallerystore_common::{Error, Result};

use crate::urls;

/// GitHub API base URL.
const GITHUB_API_BASE: &str = "https://api.github.com";
/// Media type for JSON responses.
const ACCEPT_JSON: &str = "application/vnd.github+json";
/// Media type returning raw file content.
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
/// Pinned REST API version.
const API_VERSION: &str = "2022-11-28";

/// Entry of a recursive git tree listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// `blob` for files, `tree` for directories.
    #[serde(rename = "type")]
    pub kind: String,
    /// Git object SHA.
    pub sha: String,
    /// Size in bytes (blobs only).
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    /// Check if this entry is a file.
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Metadata of a file returned by the contents API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFile {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    #[serde(default)]
    committer: Option<GitActor>,
}

/// Response of a create/update contents request.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub content: ContentFile,
    commit: GitCommit,
}

impl WriteResponse {
    /// Commit time of the write, if reported.
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.commit.committer.as_ref().and_then(|c| c.date)
    }
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    commit: GitCommit,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// GitHub repository client.
pub struct GitHubClient {
    http: Client,
    token: Option<String>,
    owner: String,
    repo: String,
    branch: String,
}

impl GitHubClient {
    /// Create a new client for one repository branch.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("GalleryStore/0.1")
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token,
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        })
    }

    /// Branch the client reads and writes.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            GITHUB_API_BASE,
            self.owner,
            self.repo,
            urls::encode_key(path)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }

    /// Download raw file content.
    ///
    /// Returns `None` if the file does not exist on the branch.
    pub async fn download(&self, path: &str) -> Result<Option<Bytes>> {
        let response = self
            .request(reqwest::Method::GET, &self.contents_url(path), ACCEPT_RAW)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download file: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;

        response
            .bytes()
            .await
            .map(Some)
            .map_err(|e| Error::Network(format!("Failed to read file body: {}", e)))
    }

    /// Look up the blob SHA of a file, required to update or delete it.
    pub async fn file_sha(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::GET, &self.contents_url(path), ACCEPT_JSON)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: ContentFile = self.handle_response(response).await?;
        Ok(Some(file.sha))
    }

    /// List every entry of the branch tree.
    pub async fn list_tree(&self) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            GITHUB_API_BASE, self.owner, self.repo, self.branch
        );

        let response = self
            .request(reqwest::Method::GET, &url, ACCEPT_JSON)
            .query(&[("recursive", "1")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list tree: {}", e)))?;

        let tree: TreeResponse = self.handle_response(response).await?;
        if tree.truncated {
            tracing::warn!(
                owner = %self.owner,
                repo = %self.repo,
                "GitHub tree listing truncated; some files are missing"
            );
        }
        Ok(tree.tree)
    }

    /// Commit time of the branch head.
    pub async fn head_commit_date(&self) -> Result<Option<DateTime<Utc>>> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            GITHUB_API_BASE, self.owner, self.repo, self.branch
        );

        let response = self
            .request(reqwest::Method::GET, &url, ACCEPT_JSON)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get branch: {}", e)))?;

        let branch: BranchResponse = self.handle_response(response).await?;
        Ok(branch.commit.commit.committer.and_then(|c| c.date))
    }

    /// Create or update a file with a single commit.
    pub async fn put_file(
        &self,
        path: &str,
        data: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<WriteResponse> {
        let body = WriteRequest {
            message,
            content: BASE64.encode(data),
            branch: &self.branch,
            sha,
        };

        let response = self
            .request(reqwest::Method::PUT, &self.contents_url(path), ACCEPT_JSON)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload file: {}", e)))?;

        self.handle_response(response).await
    }

    /// Delete a file with a single commit.
    pub async fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<()> {
        let body = DeleteRequest {
            message,
            sha,
            branch: &self.branch,
        };

        let response = self
            .request(reqwest::Method::DELETE, &self.contents_url(path), ACCEPT_JSON)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete file: {}", e)))?;

        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound("Resource not found".to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Network(format!("API error: {} - {}", status, body)))
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }
}
