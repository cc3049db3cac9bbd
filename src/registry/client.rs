//! Registry HTTP client
//!
//! Provides a blocking HTTP client for the Wally package registry.

use super::api::{RegistryMetadata, SearchResult};
use super::{Registry, RegistryError};
use crate::id::PackageId;
use crate::semver::Version;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default registry URL
pub const DEFAULT_REGISTRY: &str = "https://api.wally.run";

/// Wally API version advertised on every request
pub const WALLY_VERSION: &str = "0.3.2";

/// Maximum accepted archive size (50 MB)
pub const MAX_ARCHIVE_SIZE: u64 = 50 * 1024 * 1024;

/// Registry client for the Wally package registry
///
/// Owns a process-lifetime metadata cache keyed by package id; downloads are
/// never cached in memory (callers stream them to disk).
pub struct RegistryClient {
    /// HTTP client
    client: Client,

    /// Base URL for the registry
    base_url: String,

    /// Metadata cache, single-writer (the engine task)
    metadata_cache: RefCell<HashMap<PackageId, Arc<RegistryMetadata>>>,
}

impl RegistryClient {
    /// Create a new registry client with the default URL
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_url(DEFAULT_REGISTRY)
    }

    /// Create a new registry client with a custom URL
    pub fn with_url(base_url: &str) -> Result<Self, RegistryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("wally-version"),
            HeaderValue::from_static(WALLY_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("jelly-cli/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|e| RegistryError::Schema(e.to_string()))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            metadata_cache: RefCell::new(HashMap::new()),
        })
    }

    /// The registry base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search the registry
    ///
    /// GET /v1/package-search?query=...
    pub fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, RegistryError> {
        let url = format!("{}/v1/package-search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .header(ACCEPT, "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(RegistryError::Server {
                status: response.status().as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let mut results: Vec<SearchResult> = serde_json::from_str(&response.text()?)?;
        if let Some(limit) = limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Get package metadata, consulting the in-memory cache first
    ///
    /// GET /v1/package-metadata/{scope}/{name}
    pub fn package_metadata(&self, id: &PackageId) -> Result<Arc<RegistryMetadata>, RegistryError> {
        if let Some(cached) = self.metadata_cache.borrow().get(id) {
            return Ok(Arc::clone(cached));
        }

        let url = format!(
            "{}/v1/package-metadata/{}/{}",
            self.base_url,
            id.scope(),
            id.name()
        );

        let response = self.client.get(&url).header(ACCEPT, "application/json").send()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(id.to_string()));
        }

        if !response.status().is_success() {
            return Err(RegistryError::Server {
                status: response.status().as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let metadata: RegistryMetadata = serde_json::from_str(&response.text()?)?;
        let metadata = Arc::new(metadata);

        self.metadata_cache
            .borrow_mut()
            .insert(id.clone(), Arc::clone(&metadata));

        Ok(metadata)
    }

    /// The latest published version of a package
    ///
    /// The registry guarantees descending order, so this is the first entry.
    pub fn latest_version(&self, id: &PackageId) -> Result<Version, RegistryError> {
        let metadata = self.package_metadata(id)?;

        let entry = metadata
            .versions
            .first()
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()))?;

        Version::parse(&entry.package.version).map_err(|e| RegistryError::Schema(e.to_string()))
    }

    /// Download a package archive
    ///
    /// GET /v1/package-contents/{scope}/{name}/{version}
    pub fn download_archive(
        &self,
        id: &PackageId,
        version: &Version,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = self.archive_url(id, version);

        let response = self.client.get(&url).header(ACCEPT, "application/zip").send()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(format!("{}@{}", id, version)));
        }

        if !response.status().is_success() {
            return Err(RegistryError::Server {
                status: response.status().as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > MAX_ARCHIVE_SIZE {
                return Err(RegistryError::TooLarge {
                    size: len,
                    max: MAX_ARCHIVE_SIZE,
                });
            }
        }

        let bytes = response.bytes()?.to_vec();
        if bytes.len() as u64 > MAX_ARCHIVE_SIZE {
            return Err(RegistryError::TooLarge {
                size: bytes.len() as u64,
                max: MAX_ARCHIVE_SIZE,
            });
        }

        Ok(bytes)
    }

    fn archive_url(&self, id: &PackageId, version: &Version) -> String {
        format!(
            "{}/v1/package-contents/{}/{}/{}",
            self.base_url,
            id.scope(),
            id.name(),
            version
        )
    }
}

impl Registry for RegistryClient {
    fn metadata(&self, id: &PackageId) -> Result<Arc<RegistryMetadata>, RegistryError> {
        self.package_metadata(id)
    }

    fn download(&self, id: &PackageId, version: &Version) -> Result<Vec<u8>, RegistryError> {
        self.download_archive(id, version)
    }

    fn contents_url(&self, id: &PackageId, version: &Version) -> String {
        self.archive_url(id, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_url() {
        assert_eq!(DEFAULT_REGISTRY, "https://api.wally.run");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = RegistryClient::with_url("https://registry.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://registry.example.com");
    }

    #[test]
    fn test_contents_url() {
        let client = RegistryClient::new().unwrap();
        let id: PackageId = "roblox/roact".parse().unwrap();
        assert_eq!(
            client.contents_url(&id, &Version::new(1, 4, 0)),
            "https://api.wally.run/v1/package-contents/roblox/roact/1.4.0"
        );
    }
}
