//! Key helpers shared by every storage backend.
//!
//! Keys are opaque, path-like strings using `/` as separator. Providers own
//! their namespace; these helpers only normalize separators and split keys
//! into their directory, stem and extension parts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalize a key: backslashes become `/` and leading separators are dropped.
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Join a namespace prefix and a key with exactly one separator.
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

/// Get the file name (last component) of a key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Get the lowercased extension of a key, without the dot.
///
/// Dotfiles such as `.hidden` have no extension.
pub fn extension(key: &str) -> Option<String> {
    let name = file_name(key);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
        Some(_) => None,
    }
}

/// Get the key without its extension, keeping the directory part.
///
/// `photos/IMG_0001.HEIC` becomes `photos/IMG_0001`.
pub fn base_key(key: &str) -> &str {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(0) | None => key,
        Some(idx) => &key[..name_start + idx],
    }
}

/// A normalized key prefix for directory-style matching.
///
/// The prefix always ends with `/`, so `drafts` never matches a sibling
/// such as `drafts-old/photo.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// Create a prefix from a raw directory string.
    ///
    /// # Errors
    /// - Returns error if the prefix is empty after normalization
    pub fn new(prefix: &str) -> crate::Result<Self> {
        let mut normalized = normalize_key(prefix);
        while normalized.ends_with("//") {
            normalized.pop();
        }
        if normalized.is_empty() || normalized == "/" {
            return Err(crate::Error::InvalidInput(
                "Key prefix cannot be empty".to_string(),
            ));
        }
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    /// Check whether a key lives under this prefix.
    pub fn matches(&self, key: &str) -> bool {
        normalize_key(key).starts_with(&self.0)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
