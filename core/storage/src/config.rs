//! Storage configuration.
//!
//! `StorageConfig` is a tagged union keyed by the `"provider"` field. Kinds
//! without a built-in variant are kept as [`StorageConfig::Custom`] so that
//! plugin providers registered at runtime can read their own options.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use gallerystore_common::{Error, Result};

/// Field holding the provider kind.
pub const PROVIDER_TAG: &str = "provider";

/// S3-compatible object store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Region identifier.
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, Spaces).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key; falls back to the environment when absent.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret key; falls back to the environment when absent.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Key namespace inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Base URL used for public links instead of the endpoint.
    #[serde(default)]
    pub custom_domain: Option<String>,
    /// Upper bound on the number of listed objects.
    #[serde(default)]
    pub max_file_limit: Option<usize>,
}

/// Backblaze B2 configuration, served through its S3-compatible API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2Config {
    pub bucket: String,
    /// B2 region, e.g. `us-west-004`.
    pub region: String,
    pub application_key_id: String,
    pub application_key: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default)]
    pub max_file_limit: Option<usize>,
}

impl B2Config {
    /// Translate into the equivalent S3 configuration.
    pub fn to_s3(&self) -> S3Config {
        S3Config {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: Some(format!("https://s3.{}.backblazeb2.com", self.region)),
            access_key_id: Some(self.application_key_id.clone()),
            secret_access_key: Some(self.application_key.clone()),
            prefix: self.prefix.clone(),
            custom_domain: self.custom_domain.clone(),
            max_file_limit: self.max_file_limit,
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

/// GitHub repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Personal access token; anonymous access is read-only and rate limited.
    #[serde(default)]
    pub token: Option<String>,
    /// Sub-directory of the repository holding the photos.
    #[serde(default)]
    pub path: Option<String>,
    /// Link to raw.githubusercontent.com instead of the blob view.
    #[serde(default = "default_true")]
    pub use_raw_url: bool,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

/// Local directory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    pub base_path: String,
    /// Base URL under which `base_path` is served.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_file_limit: Option<usize>,
}

/// Eagle asset-manager library configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EagleConfig {
    /// Path to the `*.library` directory.
    pub library_path: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Also list items moved to Eagle's trash.
    #[serde(default)]
    pub include_deleted: bool,
}

fn parse_body<T: DeserializeOwned>(kind: &str, body: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| Error::Config(format!("Invalid {} config: {}", kind, e)))
}

/// Configuration for exactly one provider instance.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    S3(S3Config),
    B2(B2Config),
    GitHub(GitHubConfig),
    Local(LocalConfig),
    Eagle(EagleConfig),
    /// Any other kind, for providers registered at runtime.
    Custom {
        kind: String,
        options: Map<String, Value>,
    },
}

impl StorageConfig {
    /// Get the provider kind this configuration declares.
    pub fn kind(&self) -> &str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::B2(_) => "b2",
            StorageConfig::GitHub(_) => "github",
            StorageConfig::Local(_) => "local",
            StorageConfig::Eagle(_) => "eagle",
            StorageConfig::Custom { kind, .. } => kind,
        }
    }

    /// Convenience constructor for runtime-registered kinds.
    pub fn custom(kind: impl Into<String>, options: Map<String, Value>) -> Self {
        StorageConfig::Custom {
            kind: kind.into(),
            options,
        }
    }

    /// Parse a configuration from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::Config(
                "Storage config must be a JSON object".to_string(),
            ));
        };

        let kind = match map.remove(PROVIDER_TAG) {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => {
                return Err(Error::Config(format!(
                    "Storage config requires a '{}' field",
                    PROVIDER_TAG
                )))
            }
        };

        let config = match kind.as_str() {
            "s3" => StorageConfig::S3(parse_body(&kind, map)?),
            "b2" => StorageConfig::B2(parse_body(&kind, map)?),
            "github" => StorageConfig::GitHub(parse_body(&kind, map)?),
            "local" => StorageConfig::Local(parse_body(&kind, map)?),
            "eagle" => StorageConfig::Eagle(parse_body(&kind, map)?),
            _ => StorageConfig::Custom {
                kind: kind.clone(),
                options: map,
            },
        };

        Ok(config)
    }

    /// Render the configuration as a JSON value including the tag.
    pub fn to_value(&self) -> Result<Value> {
        let body = match self {
            StorageConfig::S3(c) => serde_json::to_value(c)?,
            StorageConfig::B2(c) => serde_json::to_value(c)?,
            StorageConfig::GitHub(c) => serde_json::to_value(c)?,
            StorageConfig::Local(c) => serde_json::to_value(c)?,
            StorageConfig::Eagle(c) => serde_json::to_value(c)?,
            StorageConfig::Custom { options, .. } => Value::Object(options.clone()),
        };

        let mut map = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert(PROVIDER_TAG.to_string(), Value::String(self.kind().to_string()));
        Ok(Value::Object(map))
    }
}

impl Serialize for StorageConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StorageConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        StorageConfig::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_s3_config() {
        let config: StorageConfig = serde_json::from_value(json!({
            "provider": "s3",
            "bucket": "photos",
            "region": "eu-central-1",
            "customDomain": "https://cdn.example.com"
        }))
        .unwrap();

        assert_eq!(config.kind(), "s3");
        match config {
            StorageConfig::S3(c) => {
                assert_eq!(c.bucket, "photos");
                assert_eq!(c.custom_domain.as_deref(), Some("https://cdn.example.com"));
                assert!(c.prefix.is_none());
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_github_defaults() {
        let config = StorageConfig::from_value(json!({
            "provider": "github",
            "owner": "me",
            "repo": "gallery"
        }))
        .unwrap();

        let StorageConfig::GitHub(c) = config else {
            panic!("expected github config");
        };
        assert_eq!(c.branch, "main");
        assert!(c.use_raw_url);
    }

    #[test]
    fn test_unknown_kind_is_custom() {
        let config = StorageConfig::from_value(json!({
            "provider": "dropbox",
            "token": "abc"
        }))
        .unwrap();

        assert_eq!(config.kind(), "dropbox");
        let StorageConfig::Custom { options, .. } = &config else {
            panic!("expected custom config");
        };
        assert_eq!(options["token"], "abc");
    }

    #[test]
    fn test_missing_tag_fails() {
        let result = StorageConfig::from_value(json!({ "bucket": "photos" }));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_known_kind_fails() {
        let result = StorageConfig::from_value(json!({ "provider": "local" }));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_serialize_keeps_tag() {
        let config = StorageConfig::Local(LocalConfig {
            base_path: "/srv/photos".to_string(),
            base_url: None,
            max_file_limit: None,
        });

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["provider"], "local");
        assert_eq!(value["basePath"], "/srv/photos");

        let back: StorageConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_b2_maps_to_s3_endpoint() {
        let b2 = B2Config {
            bucket: "b".to_string(),
            region: "us-west-004".to_string(),
            application_key_id: "id".to_string(),
            application_key: "key".to_string(),
            prefix: None,
            custom_domain: None,
            max_file_limit: None,
        };

        let s3 = b2.to_s3();
        assert_eq!(
            s3.endpoint.as_deref(),
            Some("https://s3.us-west-004.backblazeb2.com")
        );
        assert_eq!(s3.access_key_id.as_deref(), Some("id"));
    }
}
