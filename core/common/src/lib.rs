//! Common utilities and types shared across GalleryStore modules.
//!
//! This module provides the error taxonomy and the key helpers used by every
//! storage backend, ensuring consistent semantics across providers.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::KeyPrefix;
