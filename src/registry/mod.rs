//! Registry access for the Wally package registry
//!
//! The `Registry` trait is the seam between the resolver/installer and the
//! HTTP client, so resolution and installation can run against an in-memory
//! registry in tests.

mod api;
mod client;
pub mod memory;

pub use api::{PackageAttrs, Realm, RegistryMetadata, SearchResult, VersionEntry};
pub use client::{RegistryClient, DEFAULT_REGISTRY, MAX_ARCHIVE_SIZE, WALLY_VERSION};

use crate::id::PackageId;
use crate::semver::Version;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Package (or package version) not found
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Registry returned a non-success status
    #[error("Registry returned status {status}: {body}")]
    Server { status: u16, body: String },

    /// Response body did not parse
    #[error("Malformed registry response: {0}")]
    Json(#[from] serde_json::Error),

    /// Response parsed but did not match the expected shape
    #[error("Unexpected registry response: {0}")]
    Schema(String),

    /// Archive exceeded the download size limit
    #[error("Archive too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
}

/// Read-only access to a package registry
pub trait Registry {
    /// Fetch the version list and per-version dependency maps for a package
    fn metadata(&self, id: &PackageId) -> Result<Arc<RegistryMetadata>, RegistryError>;

    /// Fetch the ZIP archive for one version of a package
    fn download(&self, id: &PackageId, version: &Version) -> Result<Vec<u8>, RegistryError>;

    /// URL recorded in the lockfile as the `resolved` source of a version
    fn contents_url(&self, id: &PackageId, version: &Version) -> String {
        format!(
            "{}/v1/package-contents/{}/{}/{}",
            DEFAULT_REGISTRY,
            id.scope(),
            id.name(),
            version
        )
    }
}
