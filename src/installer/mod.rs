//! Package installation
//!
//! Materializes resolved packages on disk: fetch, extract, normalize, clean,
//! index, then emit alias shims and prune orphans.

mod extract;
mod normalize;

pub use extract::{extract_zip, ArchiveError};
pub use normalize::{cleanup_package_dir, normalize_layout, ProjectFile, ProjectFileNode};

use crate::cache::Cache;
use crate::id::PackageId;
use crate::lockfile::{LockEntry, Lockfile};
use crate::manifest::Manifest;
use crate::registry::{Registry, RegistryError};
use crate::semver::{SemverError, Version};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the package store directory inside the packages path
pub const INDEX_DIR: &str = "_Index";

/// Errors that can occur during installation
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Archive error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Lock entry carried an unparseable version
    #[error(transparent)]
    Semver(#[from] SemverError),

    /// Filesystem failure
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InstallerError {
    /// Whether this failure only skips the affected package
    ///
    /// Registry and archive failures are warned skips; filesystem failures
    /// abort the whole operation.
    pub fn is_package_skip(&self) -> bool {
        matches!(
            self,
            InstallerError::Registry(_) | InstallerError::Archive(_) | InstallerError::Semver(_)
        )
    }
}

fn io_err(path: &Path, source: io::Error) -> InstallerError {
    InstallerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Result of installing a set of packages
#[derive(Debug, Default)]
pub struct InstallSummary {
    /// Packages installed, as `scope/name@version`
    pub installed: Vec<String>,

    /// Packages skipped, with the reason
    pub skipped: Vec<(String, String)>,

    /// sha256 of each downloaded archive, for lockfile integrity entries
    pub integrity: BTreeMap<PackageId, String>,
}

/// Result of pruning orphans
#[derive(Debug, Default)]
pub struct PruneSummary {
    /// `_Index` directories removed
    pub removed_dirs: Vec<String>,

    /// Root shim files removed
    pub removed_shims: Vec<String>,
}

/// Package installer
///
/// Owns the on-disk layout under the project's packages path.
pub struct Installer<'a> {
    registry: &'a dyn Registry,
    cache: Option<&'a Cache>,
    packages_path: PathBuf,
    optimize: bool,
    cleanup: bool,
}

impl<'a> Installer<'a> {
    /// Create an installer for a project's packages directory
    pub fn new(
        registry: &'a dyn Registry,
        cache: Option<&'a Cache>,
        packages_path: PathBuf,
        optimize: bool,
        cleanup: bool,
    ) -> Self {
        Self {
            registry,
            cache,
            packages_path,
            optimize,
            cleanup,
        }
    }

    /// The `_Index` store directory
    pub fn index_dir(&self) -> PathBuf {
        self.packages_path.join(INDEX_DIR)
    }

    /// Install every entry of a pinned set, then emit shims
    ///
    /// Per-package registry and archive failures are warned skips; the rest
    /// of the set still installs. `known` maps every pinned package (not
    /// just the entries being installed) to its version, for shim emission.
    pub fn install_all(
        &self,
        entries: &BTreeMap<PackageId, LockEntry>,
        known: &BTreeMap<PackageId, String>,
    ) -> Result<InstallSummary, InstallerError> {
        let mut summary = InstallSummary::default();

        for (id, entry) in entries {
            match self.install_one(id, entry) {
                Ok(integrity) => {
                    summary
                        .installed
                        .push(format!("{}@{}", id, entry.version));
                    summary.integrity.insert(id.clone(), integrity);
                }
                Err(e) if e.is_package_skip() => {
                    println!("  Skipping {}@{}: {}", id, entry.version, e);
                    summary.skipped.push((id.to_string(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        self.emit_shims(known)?;

        Ok(summary)
    }

    /// Install a single pinned package into the `_Index` store
    ///
    /// Pipeline: download (or cache hit) → write archive → extract →
    /// normalize → clean → drop archive. Any failure removes the package's
    /// `_Index` slot so a later pass starts clean.
    pub fn install_one(
        &self,
        id: &PackageId,
        entry: &LockEntry,
    ) -> Result<String, InstallerError> {
        let version = Version::parse(&entry.version)?;
        let pkg_dir = self.index_dir().join(id.index_dir_name());

        let result = self.run_pipeline(id, &version, &pkg_dir);

        if result.is_err() {
            // Leave no partial slot behind
            let _ = fs::remove_dir_all(&pkg_dir);
        }

        result
    }

    fn run_pipeline(
        &self,
        id: &PackageId,
        version: &Version,
        pkg_dir: &Path,
    ) -> Result<String, InstallerError> {
        // An existing slot is stale state from an earlier run
        if pkg_dir.exists() {
            fs::remove_dir_all(pkg_dir).map_err(|e| io_err(pkg_dir, e))?;
        }
        fs::create_dir_all(pkg_dir).map_err(|e| io_err(pkg_dir, e))?;

        let bytes = match self.cache.and_then(|c| c.load(id, version)) {
            Some(bytes) => bytes,
            None => {
                let bytes = self.registry.download(id, version)?;
                if let Some(cache) = self.cache {
                    // Best effort: a cold cache never fails an install
                    let _ = cache.store(id, version, &bytes);
                }
                bytes
            }
        };

        let integrity = hex::encode(Sha256::digest(&bytes));

        let archive_path = pkg_dir.join(format!("{}.zip", id.index_dir_name()));
        fs::write(&archive_path, &bytes).map_err(|e| io_err(&archive_path, e))?;

        extract_zip(&archive_path, pkg_dir)?;

        if self.optimize {
            normalize_layout(pkg_dir).map_err(|e| io_err(pkg_dir, e))?;
        }

        if self.cleanup {
            cleanup_package_dir(pkg_dir).map_err(|e| io_err(pkg_dir, e))?;
        }

        // The normalize pass may already have dropped the archive
        if archive_path.exists() {
            fs::remove_file(&archive_path).map_err(|e| io_err(&archive_path, e))?;
        }

        Ok(integrity)
    }

    /// Move legacy flat-layout packages into the `_Index` store
    ///
    /// Older layouts placed packages directly under the packages path. A
    /// flat directory matching a pinned package's name is adopted into its
    /// `_Index` slot when that slot is still empty.
    pub fn migrate_legacy<'i>(
        &self,
        ids: impl Iterator<Item = &'i PackageId>,
    ) -> Result<(), InstallerError> {
        for id in ids {
            let legacy = self.packages_path.join(id.name());
            if !legacy.is_dir() || legacy.file_name().map(|n| n == INDEX_DIR).unwrap_or(false) {
                continue;
            }

            let slot = self.index_dir().join(id.index_dir_name());
            if slot.exists() {
                continue;
            }

            let index_dir = self.index_dir();
            fs::create_dir_all(&index_dir).map_err(|e| io_err(&index_dir, e))?;
            fs::rename(&legacy, &slot).map_err(|e| io_err(&legacy, e))?;
        }

        Ok(())
    }

    /// Write alias shims for every package in the `_Index` store
    ///
    /// Reads the store once. Unique names get `{name}.lua`; when several
    /// store entries share a name (stale side-by-side versions), each entry
    /// with a known version gets `{name}_{sanitized-version}.lua` and the
    /// unversioned shim points at the highest version.
    pub fn emit_shims(&self, known: &BTreeMap<PackageId, String>) -> Result<(), InstallerError> {
        let index_dir = self.index_dir();
        if !index_dir.exists() {
            return Ok(());
        }

        // Dir name → id, for store entries the pinned set knows about
        let known_dirs: BTreeMap<String, (&PackageId, &String)> = known
            .iter()
            .map(|(id, version)| (id.index_dir_name(), (id, version)))
            .collect();

        let mut by_name: BTreeMap<String, Vec<(String, Option<Version>)>> = BTreeMap::new();

        for entry in fs::read_dir(&index_dir).map_err(|e| io_err(&index_dir, e))? {
            let entry = entry.map_err(|e| io_err(&index_dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let (base, suffix) = match dir_name.split_once('@') {
                Some((base, suffix)) => (base.to_string(), Some(suffix.to_string())),
                None => (dir_name.clone(), None),
            };

            // Scopes may themselves contain underscores, so prefer names we
            // can match against the pinned set before splitting blindly
            let leaf = match known_dirs.get(&base) {
                Some((id, _)) => id.name().to_string(),
                None => base
                    .split_once('_')
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| base.clone()),
            };

            let version = suffix
                .as_deref()
                .and_then(|s| Version::parse(s).ok())
                .or_else(|| {
                    known_dirs
                        .get(&base)
                        .and_then(|(_, v)| Version::parse(v).ok())
                });

            by_name.entry(leaf).or_default().push((dir_name, version));
        }

        for (name, mut targets) in by_name {
            if let [(dir_name, _)] = targets.as_slice() {
                self.write_shim(&format!("{}.lua", name), dir_name)?;
                continue;
            }

            // Highest version first; unknown versions sort last, dir name
            // breaks ties deterministically
            targets.sort_by(|a, b| match (&a.1, &b.1) {
                (Some(x), Some(y)) => y.cmp(x).then_with(|| a.0.cmp(&b.0)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.0.cmp(&b.0),
            });

            for (dir_name, version) in &targets {
                if let Some(version) = version {
                    self.write_shim(
                        &format!("{}_{}.lua", name, sanitize_version(&version.to_string())),
                        dir_name,
                    )?;
                }
            }

            self.write_shim(&format!("{}.lua", name), &targets[0].0)?;
        }

        Ok(())
    }

    fn write_shim(&self, file_name: &str, target_dir: &str) -> Result<(), InstallerError> {
        let path = self.packages_path.join(file_name);
        let contents = shim_contents(target_dir);
        fs::write(&path, contents).map_err(|e| io_err(&path, e))
    }

    /// Remove store entries and shims with no backing manifest dependency
    ///
    /// Live packages are the manifest's dependencies plus everything they
    /// reach through the lockfile's dependency maps, so transitive packages
    /// survive while packages dropped from the manifest do not. A `_Index`
    /// directory is orphan when its `{scope}_{name}` (ignoring a trailing
    /// `@version` suffix) matches no live package; a root shim is orphan
    /// when no live package has its leaf name. The shim layer is
    /// regenerated afterwards.
    pub fn prune(
        &self,
        manifest: &Manifest,
        lockfile: Option<&Lockfile>,
    ) -> Result<PruneSummary, InstallerError> {
        let mut summary = PruneSummary::default();

        let live = live_packages(manifest, lockfile);
        let keep_dirs: Vec<String> = live.iter().map(|id| id.index_dir_name()).collect();
        let keep_names: Vec<String> = live.iter().map(|id| id.name().to_string()).collect();
        let known = lockfile.map(|l| l.pinned_versions()).unwrap_or_default();

        let index_dir = self.index_dir();
        if index_dir.exists() {
            for entry in fs::read_dir(&index_dir).map_err(|e| io_err(&index_dir, e))? {
                let entry = entry.map_err(|e| io_err(&index_dir, e))?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }

                let dir_name = entry.file_name().to_string_lossy().into_owned();
                let base = dir_name
                    .split_once('@')
                    .map(|(base, _)| base)
                    .unwrap_or(&dir_name);

                if !keep_dirs.iter().any(|k| k == base) {
                    fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
                    summary.removed_dirs.push(dir_name);
                }
            }
        }

        if self.packages_path.exists() {
            for entry in
                fs::read_dir(&self.packages_path).map_err(|e| io_err(&self.packages_path, e))?
            {
                let entry = entry.map_err(|e| io_err(&self.packages_path, e))?;
                let path = entry.path();
                if !path.is_file() || path.extension().map(|e| e != "lua").unwrap_or(true) {
                    continue;
                }

                let stem = match path.file_stem().and_then(|s| s.to_str()) {
                    Some(stem) => stem.to_string(),
                    None => continue,
                };

                let kept = keep_names
                    .iter()
                    .any(|name| stem == *name || stem.starts_with(&format!("{}_", name)));

                if !kept {
                    fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                    summary.removed_shims.push(stem);
                }
            }
        }

        self.emit_shims(&known)?;

        Ok(summary)
    }
}

/// The manifest's dependencies plus everything reachable through the
/// lockfile's per-package dependency maps
fn live_packages(manifest: &Manifest, lockfile: Option<&Lockfile>) -> BTreeSet<PackageId> {
    let mut live: BTreeSet<PackageId> = BTreeSet::new();
    let mut queue: Vec<PackageId> = manifest.all_entries().map(|(id, _)| id.clone()).collect();

    while let Some(id) = queue.pop() {
        if !live.insert(id.clone()) {
            continue;
        }

        if let Some(entry) = lockfile.and_then(|l| l.packages.get(&id)) {
            queue.extend(entry.dependencies.keys().cloned());
        }
    }

    live
}

/// Shim file contents redirecting a name to its `_Index` entry
fn shim_contents(target_dir: &str) -> String {
    format!(
        "-- This file was generated by jelly.\n-- Do not edit it by hand.\nreturn require(\"@self/{}/{}\")\n",
        INDEX_DIR, target_dir
    )
}

/// Sanitize a version for use in a shim file name
///
/// Every non-alphanumeric character becomes an underscore.
fn sanitize_version(version: &str) -> String {
    version
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
