//! In-memory registry
//!
//! A `Registry` backed by maps instead of HTTP, used by integration tests to
//! drive resolution and installation without a network.

use super::{Registry, RegistryError, RegistryMetadata, VersionEntry};
use crate::id::PackageId;
use crate::semver::Version;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry backed by in-memory metadata and archives
#[derive(Default)]
pub struct MemoryRegistry {
    packages: HashMap<PackageId, Vec<VersionEntry>>,
    archives: HashMap<(PackageId, String), Vec<u8>>,

    // Arc-ed snapshots handed out by `metadata`, rebuilt on publish
    snapshots: RefCell<HashMap<PackageId, Arc<RegistryMetadata>>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a version entry
    ///
    /// Entries are kept in descending version order, matching the ordering
    /// guarantee of the real registry. Entries whose package field does not
    /// form a valid id are ignored.
    pub fn publish(&mut self, entry: VersionEntry) {
        let Some(id) = entry.id() else { return };

        let versions = self.packages.entry(id.clone()).or_default();
        versions.push(entry);
        versions.sort_by(|a, b| {
            let va = Version::parse(&a.package.version).unwrap_or_else(|_| Version::new(0, 0, 0));
            let vb = Version::parse(&b.package.version).unwrap_or_else(|_| Version::new(0, 0, 0));
            vb.cmp(&va)
        });

        self.snapshots.borrow_mut().remove(&id);
    }

    /// Store the archive bytes served for one version of a package
    pub fn put_archive(&mut self, id: &PackageId, version: &str, bytes: Vec<u8>) {
        self.archives
            .insert((id.clone(), version.to_string()), bytes);
    }
}

impl Registry for MemoryRegistry {
    fn metadata(&self, id: &PackageId) -> Result<Arc<RegistryMetadata>, RegistryError> {
        if let Some(snapshot) = self.snapshots.borrow().get(id) {
            return Ok(Arc::clone(snapshot));
        }

        let versions = self
            .packages
            .get(id)
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()))?;

        let snapshot = Arc::new(RegistryMetadata {
            versions: versions.clone(),
        });
        self.snapshots
            .borrow_mut()
            .insert(id.clone(), Arc::clone(&snapshot));

        Ok(snapshot)
    }

    fn download(&self, id: &PackageId, version: &Version) -> Result<Vec<u8>, RegistryError> {
        self.archives
            .get(&(id.clone(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound(format!("{}@{}", id, version)))
    }
}
