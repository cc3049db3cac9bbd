//! Lockfile management (jelly-lock.json)
//!
//! Serializes and deserializes the pinned dependency graph and decides when
//! an existing lockfile is reusable versus stale.

use crate::id::PackageId;
use crate::manifest::Manifest;
use crate::registry::Registry;
use crate::resolver::{Conflict, Resolver, ResolverError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lockfile file name
pub const LOCKFILE_NAME: &str = "jelly-lock.json";

/// Supported lockfile format version
pub const LOCKFILE_VERSION: u32 = 1;

/// Errors that can occur during lockfile operations
#[derive(Debug, Error)]
pub enum LockfileError {
    /// Failed to read or write the lockfile
    #[error("Lockfile IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the lockfile
    #[error("Failed to serialize lockfile: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Resolution failed while generating
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Lockfile (jelly-lock.json)
///
/// Records the exact version and source of every resolved package for
/// reproducible installs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    /// Lockfile format version
    pub lockfile_version: u32,

    /// Root project name
    pub name: String,

    /// Root project version
    pub version: String,

    /// Pinned packages, keyed by `scope/name`
    #[serde(default)]
    pub packages: BTreeMap<PackageId, LockEntry>,

    /// Top-level production ranges at generation time
    #[serde(default)]
    pub dependencies: BTreeMap<PackageId, String>,

    /// Top-level dev ranges at generation time
    #[serde(default)]
    pub dev_dependencies: BTreeMap<PackageId, String>,
}

/// One pinned package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    /// Exact pinned version
    pub version: String,

    /// Archive URL the version resolves to
    pub resolved: String,

    /// sha256 of the downloaded archive, hex-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,

    /// Ranges declared by the pinned version, verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<PackageId, String>,
}

impl Lockfile {
    /// Create an empty lockfile for a manifest
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            lockfile_version: LOCKFILE_VERSION,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            packages: BTreeMap::new(),
            dependencies: manifest.dependencies.clone(),
            dev_dependencies: manifest.dev_dependencies.clone(),
        }
    }

    /// Versions of every pinned package, for shim emission
    pub fn pinned_versions(&self) -> BTreeMap<PackageId, String> {
        self.packages
            .iter()
            .map(|(id, entry)| (id.clone(), entry.version.clone()))
            .collect()
    }
}

/// On-disk lockfile store for one project
pub struct LockfileStore {
    path: PathBuf,
}

impl LockfileStore {
    /// Create a store for the lockfile in a project root
    pub fn new(project_root: &Path) -> Self {
        Self {
            path: project_root.join(LOCKFILE_NAME),
        }
    }

    /// Path of the lockfile
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a lockfile exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the lockfile
    ///
    /// A missing file, a malformed file, or an unsupported format version
    /// all read as `None`: the caller regenerates. Only real IO failures
    /// surface as errors.
    pub fn read(&self) -> Result<Option<Lockfile>, LockfileError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let lockfile: Lockfile = match serde_json::from_str(&content) {
            Ok(lockfile) => lockfile,
            Err(_) => return Ok(None),
        };

        if lockfile.lockfile_version != LOCKFILE_VERSION {
            return Ok(None);
        }

        Ok(Some(lockfile))
    }

    /// Write the lockfile atomically (temp file, flush, rename)
    pub fn write(&self, lockfile: &Lockfile) -> Result<(), LockfileError> {
        let mut content = serde_json::to_string_pretty(lockfile)?;
        content.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(content.as_bytes())?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Delete the lockfile if present
    pub fn delete(&self) -> Result<(), LockfileError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Whether the lockfile covers every top-level manifest dependency
    pub fn validate(&self, manifest: &Manifest) -> Result<bool, LockfileError> {
        let Some(lockfile) = self.read()? else {
            return Ok(false);
        };

        let covered = manifest
            .dependencies
            .keys()
            .chain(manifest.dev_dependencies.keys())
            .all(|id| lockfile.packages.contains_key(id));

        Ok(covered)
    }

    /// Resolve the manifest from scratch and build a fresh lockfile
    ///
    /// The returned lockfile is not written; the caller persists it.
    pub fn generate(
        &self,
        manifest: &Manifest,
        registry: &dyn Registry,
    ) -> Result<(Lockfile, Vec<Conflict>), LockfileError> {
        let direct = manifest.direct_requirements(true);
        let resolution = Resolver::new(registry).resolve_tree(&direct)?;

        let mut lockfile = Lockfile::from_manifest(manifest);
        for (id, node) in &resolution.graph.nodes {
            lockfile.packages.insert(
                id.clone(),
                LockEntry {
                    version: node.version.to_string(),
                    resolved: node.url.clone(),
                    integrity: None,
                    dependencies: node.deps.clone(),
                },
            );
        }

        Ok((lockfile, resolution.conflicts))
    }

    /// Reuse the current lockfile when the manifest still matches, else
    /// regenerate
    pub fn update(
        &self,
        manifest: &Manifest,
        registry: &dyn Registry,
    ) -> Result<(Lockfile, Vec<Conflict>), LockfileError> {
        if let Some(current) = self.read()? {
            if current.dependencies == manifest.dependencies
                && current.dev_dependencies == manifest.dev_dependencies
            {
                return Ok((current, Vec::new()));
            }
        }

        self.generate(manifest, registry)
    }
}
