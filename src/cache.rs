//! Per-user artifact cache
//!
//! Stores downloaded package archives at ~/.jelly/cache/. The cache is best
//! effort: the engine never relies on its contents and `cache_clean` wipes
//! it en bloc.

use crate::id::PackageId;
use crate::semver::Version;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache directory could not be determined
    #[error("Failed to locate cache directory: {0}")]
    Init(String),
}

/// Archive cache at ~/.jelly/cache/
///
/// Directory structure:
/// ```text
/// ~/.jelly/cache/
/// ├── roblox_roact@1.4.0.zip
/// ├── evaera_promise@4.0.0.zip
/// └── tmp/
/// ```
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Initialize the cache at the default per-user location
    pub fn init() -> Result<Self, CacheError> {
        let home = dirs::home_dir()
            .ok_or_else(|| CacheError::Init("Could not determine home directory".to_string()))?;

        Self::at(home.join(".jelly").join("cache"))
    }

    /// Initialize a cache rooted at an explicit directory
    pub fn at(root: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    /// The cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_path(&self, id: &PackageId, version: &Version) -> PathBuf {
        self.root
            .join(format!("{}@{}.zip", id.index_dir_name(), version))
    }

    /// Read a cached archive, if present
    pub fn load(&self, id: &PackageId, version: &Version) -> Option<Vec<u8>> {
        fs::read(self.archive_path(id, version)).ok()
    }

    /// Store an archive (atomic write: temp file, flush, rename)
    pub fn store(
        &self,
        id: &PackageId,
        version: &Version,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        let tmp_dir = self.root.join("tmp");
        fs::create_dir_all(&tmp_dir)?;

        let tmp_path = tmp_dir.join(format!(
            "{}@{}.{}.tmp",
            id.index_dir_name(),
            version,
            std::process::id()
        ));

        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.archive_path(id, version))?;
        Ok(())
    }

    /// Wipe the cache
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.root.join("tmp"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (tempfile::TempDir, Cache) {
        let temp = tempfile::tempdir().unwrap();
        let cache = Cache::at(temp.path().join("cache")).unwrap();
        (temp, cache)
    }

    #[test]
    fn test_store_and_load() {
        let (_temp, cache) = test_cache();
        let id: PackageId = "roblox/roact".parse().unwrap();
        let version = Version::new(1, 4, 0);

        assert!(cache.load(&id, &version).is_none());

        cache.store(&id, &version, b"archive bytes").unwrap();
        assert_eq!(cache.load(&id, &version).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_versions_are_distinct() {
        let (_temp, cache) = test_cache();
        let id: PackageId = "roblox/roact".parse().unwrap();

        cache.store(&id, &Version::new(1, 4, 0), b"old").unwrap();
        cache.store(&id, &Version::new(1, 4, 2), b"new").unwrap();

        assert_eq!(cache.load(&id, &Version::new(1, 4, 0)).unwrap(), b"old");
        assert_eq!(cache.load(&id, &Version::new(1, 4, 2)).unwrap(), b"new");
    }

    #[test]
    fn test_clear() {
        let (_temp, cache) = test_cache();
        let id: PackageId = "roblox/roact".parse().unwrap();
        let version = Version::new(1, 4, 0);

        cache.store(&id, &version, b"archive bytes").unwrap();
        cache.clear().unwrap();

        assert!(cache.load(&id, &version).is_none());
        assert!(cache.root().exists());
    }
}
