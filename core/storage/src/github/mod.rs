//! GitHub repository storage provider.
//!
//! Photos live in a Git repository branch, accessed through the REST
//! contents and trees APIs:
//! - Recursive tree listing for enumeration
//! - One commit per upload or delete
//! - raw.githubusercontent.com links for public URLs

pub mod client;
pub mod provider;

pub use client::GitHubClient;
pub use provider::GitHubProvider;
