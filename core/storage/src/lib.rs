//! Storage abstraction for the photo gallery.
//!
//! This module provides a trait-based interface over photo backends
//! (S3-compatible buckets, GitHub repositories, local directories, Eagle
//! libraries), a provider registry for config-driven construction, and two
//! policy layers on top:
//! - [`StorageManager`]: exclusion filters, move fallback, provider hot-swap
//! - [`TransactionalStorageManager`]: write staging, commit and rollback
//!
//! # Design Principles
//! - Provider isolation: no backend-specific logic outside its provider
//! - Async operations: all I/O operations are async
//! - Absence is not failure: reads of missing keys return `None`
//! - Unified error semantics: consistent error types across providers

pub mod config;
pub mod eagle;
pub mod github;
pub mod live_photo;
pub mod local;
pub mod manager;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod s3;
pub mod transactional;
pub(crate) mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{B2Config, EagleConfig, GitHubConfig, LocalConfig, S3Config, StorageConfig};
pub use eagle::EagleProvider;
pub use github::GitHubProvider;
pub use local::LocalProvider;
pub use manager::{ExclusionFilter, StorageManager};
pub use memory::MemoryProvider;
pub use provider::{MovableProvider, StorageObject, StorageProvider, UploadOptions};
pub use registry::{create_default_registry, ProviderCategory, ProviderFactory, ProviderRegistry};
pub use s3::S3Provider;
pub use transactional::{RollbackReport, TransactionalStorageManager};
