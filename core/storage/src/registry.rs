//! Provider registry for dynamic provider resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gallerystore_common::{Error, Result};

use crate::config::StorageConfig;
use crate::provider::StorageProvider;

/// Factory function type for creating providers.
pub type ProviderFactory =
    Arc<dyn Fn(&StorageConfig) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Where a provider keeps its data, for discovery and UI grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCategory {
    /// Storage on the machine running the build.
    Local,
    /// Storage behind a network API.
    Remote,
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderCategory::Local => write!(f, "local"),
            ProviderCategory::Remote => write!(f, "remote"),
        }
    }
}

struct Registration {
    category: ProviderCategory,
    factory: ProviderFactory,
}

/// Registry for storage provider factories.
///
/// Constructed once at startup and passed by reference to whatever builds
/// managers. Built-in and plugin providers register through the same API.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Registration>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// Registering a kind that already exists replaces the previous factory;
    /// the last registration wins.
    ///
    /// # Returns
    /// The category of the replaced registration, if any.
    pub fn register<F>(
        &mut self,
        kind: impl Into<String>,
        category: ProviderCategory,
        factory: F,
    ) -> Option<ProviderCategory>
    where
        F: Fn(&StorageConfig) -> Result<Arc<dyn StorageProvider>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let previous = self.factories.insert(
            kind.clone(),
            Registration {
                category,
                factory: Arc::new(factory),
            },
        );

        if previous.is_some() {
            tracing::debug!(kind = %kind, "Replaced storage provider registration");
        }

        previous.map(|r| r.category)
    }

    /// Construct a provider for the kind the configuration declares.
    ///
    /// # Errors
    /// - `Error::Config` naming the kind when nothing is registered for it
    /// - Any error the factory reports
    pub fn create(&self, config: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
        let kind = config.kind();
        let registration = self.factories.get(kind).ok_or_else(|| {
            Error::Config(format!("Unknown storage provider kind '{}'", kind))
        })?;
        (registration.factory)(config)
    }

    /// Check if a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Get the category a kind was registered under.
    pub fn category_of(&self, kind: &str) -> Option<ProviderCategory> {
        self.factories.get(kind).map(|r| r.category)
    }

    /// Get every registered kind, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Get the registered kinds of one category, sorted.
    pub fn kinds_in(&self, category: ProviderCategory) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .factories
            .iter()
            .filter(|(_, r)| r.category == category)
            .map(|(k, _)| k.clone())
            .collect();
        kinds.sort();
        kinds
    }
}

fn mismatched(expected: &str, config: &StorageConfig) -> Error {
    Error::Config(format!(
        "Provider '{}' cannot be built from a '{}' config",
        expected,
        config.kind()
    ))
}

/// Create a registry with the built-in providers.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    // In-memory provider (for testing and dry runs)
    registry.register("memory", ProviderCategory::Local, |_config| {
        Ok(Arc::new(crate::memory::MemoryProvider::new()) as Arc<dyn StorageProvider>)
    });

    registry.register("local", ProviderCategory::Local, |config| match config {
        StorageConfig::Local(c) => Ok(Arc::new(crate::local::LocalProvider::new(c.clone())?)
            as Arc<dyn StorageProvider>),
        other => Err(mismatched("local", other)),
    });

    registry.register("eagle", ProviderCategory::Local, |config| match config {
        StorageConfig::Eagle(c) => Ok(Arc::new(crate::eagle::EagleProvider::new(c.clone())?)
            as Arc<dyn StorageProvider>),
        other => Err(mismatched("eagle", other)),
    });

    registry.register("s3", ProviderCategory::Remote, |config| match config {
        StorageConfig::S3(c) => Ok(Arc::new(crate::s3::S3Provider::new(c.clone(), "s3")?)
            as Arc<dyn StorageProvider>),
        other => Err(mismatched("s3", other)),
    });

    registry.register("b2", ProviderCategory::Remote, |config| match config {
        StorageConfig::B2(c) => Ok(Arc::new(crate::s3::S3Provider::new(c.to_s3(), "b2")?)
            as Arc<dyn StorageProvider>),
        other => Err(mismatched("b2", other)),
    });

    registry.register("github", ProviderCategory::Remote, |config| match config {
        StorageConfig::GitHub(c) => Ok(Arc::new(crate::github::GitHubProvider::new(c.clone())?)
            as Arc<dyn StorageProvider>),
        other => Err(mismatched("github", other)),
    });

    registry
}
