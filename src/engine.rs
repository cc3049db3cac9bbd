//! Engine orchestrator
//!
//! The public surface the CLI collaborator calls, one operation per
//! subcommand: install, add, remove, update, analyze, verify-lock,
//! regenerate-lock, clean.

use crate::cache::{Cache, CacheError};
use crate::id::{PackageId, PackageIdError};
use crate::installer::{Installer, InstallerError};
use crate::lockfile::{Lockfile, LockfileError, LockfileStore};
use crate::manifest::{Manifest, ManifestError, MANIFEST_NAME};
use crate::registry::{Registry, RegistryClient, RegistryError};
use crate::resolver::{Conflict, Resolver, ResolverError, TreeResolution};
use crate::semver::{Range, SemverError, Version};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// No manifest in the project directory
    #[error("No jelly.json found in {0}. Run `jelly init` to create a project.")]
    ManifestMissing(String),

    /// A manifest already exists where init was asked to create one
    #[error("Project already initialized: jelly.json found in {0}")]
    AlreadyInitialized(String),

    /// Invalid package specifier on the command line
    #[error("Invalid package specifier: {0}")]
    InvalidSpecifier(String),

    /// Manifest error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Lockfile error
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    /// Resolution error
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Installation error
    #[error(transparent)]
    Installer(#[from] InstallerError),

    /// Package id error
    #[error(transparent)]
    Id(#[from] PackageIdError),

    /// Semver error
    #[error(transparent)]
    Semver(#[from] SemverError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request for the project-file collaborator
///
/// The core never mutates Rojo project files itself; it asks the
/// collaborator to expose the packages directory in the data model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFileRequest {
    /// Packages directory, relative to the project root
    pub packages_path: String,

    /// Service the directory should be exposed under
    pub parent: String,
}

/// A dependency whose registry latest is ahead of the pinned version
#[derive(Debug, Clone)]
pub struct OutdatedEntry {
    pub id: PackageId,
    pub current: String,
    pub latest: Version,
}

/// Outcome of an install-like operation
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Packages installed, as `scope/name@version`
    pub installed: Vec<String>,

    /// Packages skipped, with the reason
    pub skipped: Vec<(String, String)>,

    /// Conflicts detected during resolution (non-fatal)
    pub conflicts: Vec<Conflict>,

    /// Direct dependencies with a newer registry version
    pub outdated: Vec<OutdatedEntry>,

    /// Request for the project-file collaborator, when enabled
    pub project_file_request: Option<ProjectFileRequest>,
}

/// A parsed `scope/name[@range]` command-line specifier
#[derive(Debug)]
struct PackageSpecifier {
    id: PackageId,
    range: Option<String>,
}

impl PackageSpecifier {
    fn parse(spec: &str) -> Result<Self, EngineError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(EngineError::InvalidSpecifier("empty specifier".to_string()));
        }

        let (id_part, range) = match spec.split_once('@') {
            Some((_, range)) if range.is_empty() => {
                return Err(EngineError::InvalidSpecifier(format!(
                    "empty range in '{}'",
                    spec
                )));
            }
            Some((id, range)) => (id, Some(range.to_string())),
            None => (spec, None),
        };

        let id: PackageId = id_part
            .parse()
            .map_err(|e: PackageIdError| EngineError::InvalidSpecifier(e.to_string()))?;

        if let Some(range) = &range {
            Range::parse(range)
                .map_err(|e| EngineError::InvalidSpecifier(format!("{}: {}", spec, e)))?;
        }

        Ok(Self { id, range })
    }
}

/// The package-management engine for one project
pub struct Engine {
    project_root: PathBuf,
    registry: Box<dyn Registry>,
    cache: Option<Cache>,
}

impl Engine {
    /// Create an engine talking to the default Wally registry
    ///
    /// The per-user cache is best effort: failure to initialize it disables
    /// caching instead of failing the engine.
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let registry = RegistryClient::new()?;
        Ok(Self {
            project_root: project_root.into(),
            registry: Box::new(registry),
            cache: Cache::init().ok(),
        })
    }

    /// Create an engine with an injected registry and no artifact cache
    pub fn with_registry(project_root: impl Into<PathBuf>, registry: Box<dyn Registry>) -> Self {
        Self {
            project_root: project_root.into(),
            registry,
            cache: None,
        }
    }

    /// Attach an artifact cache
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The project root this engine operates on
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn manifest_path(&self) -> PathBuf {
        self.project_root.join(MANIFEST_NAME)
    }

    fn lockfile_store(&self) -> LockfileStore {
        LockfileStore::new(&self.project_root)
    }

    fn load_manifest(&self) -> Result<Manifest, EngineError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(EngineError::ManifestMissing(
                self.project_root.display().to_string(),
            ));
        }
        Ok(Manifest::from_file(&path)?)
    }

    fn installer<'a>(&'a self, manifest: &Manifest) -> Installer<'a> {
        let config = manifest.config();
        Installer::new(
            self.registry.as_ref(),
            self.cache.as_ref(),
            self.project_root.join(&config.packages_path),
            config.optimize,
            config.cleanup,
        )
    }

    /// Create a fresh manifest
    ///
    /// Fails when the project already has one. The name defaults to the
    /// project directory's name.
    pub fn init(&self, name: Option<&str>) -> Result<Manifest, EngineError> {
        let path = self.manifest_path();
        if path.exists() {
            return Err(EngineError::AlreadyInitialized(
                self.project_root.display().to_string(),
            ));
        }

        let name = name.map(|s| s.to_string()).unwrap_or_else(|| {
            self.project_root
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("my-project")
                .to_string()
        });

        let manifest = Manifest::new(&name);
        std::fs::create_dir_all(&self.project_root)?;
        manifest.to_file(&path)?;

        println!("Created {} for {}", MANIFEST_NAME, name);
        Ok(manifest)
    }

    /// Add dependencies and install
    ///
    /// Specs without a range resolve to the registry latest and are written
    /// as a caret range; explicit ranges are written verbatim.
    pub fn add(&self, specs: &[String], dev: bool) -> Result<InstallReport, EngineError> {
        let mut manifest = self.load_manifest()?;

        for spec in specs {
            let spec = PackageSpecifier::parse(spec)?;

            let range = match spec.range {
                Some(range) => range,
                None => {
                    let resolution =
                        Resolver::new(self.registry.as_ref()).resolve_one(&spec.id, "*")?;
                    format!("^{}", resolution.version)
                }
            };

            // Keep the three maps disjoint
            manifest.remove_dependency(&spec.id);
            if dev {
                manifest.dev_dependencies.insert(spec.id.clone(), range.clone());
                println!("Added {} = \"{}\" to devDependencies", spec.id, range);
            } else {
                manifest.dependencies.insert(spec.id.clone(), range.clone());
                println!("Added {} = \"{}\" to dependencies", spec.id, range);
            }
        }

        manifest.to_file(&self.manifest_path())?;
        self.install_locked(&manifest)
    }

    /// Remove dependencies, regenerate the lockfile and prune
    pub fn remove(&self, ids: &[PackageId]) -> Result<(), EngineError> {
        let mut manifest = self.load_manifest()?;

        for id in ids {
            if manifest.remove_dependency(id) {
                println!("Removed {}", id);
            } else {
                println!("Package '{}' is not a dependency", id);
            }
        }

        manifest.to_file(&self.manifest_path())?;

        let store = self.lockfile_store();
        let (lockfile, _) = store.generate(&manifest, self.registry.as_ref())?;
        store.write(&lockfile)?;

        self.installer(&manifest).prune(&manifest, Some(&lockfile))?;

        Ok(())
    }

    /// Add and install only the listed specs
    ///
    /// Resolves the closure of the listed packages, merges the result into
    /// the lockfile and installs just the affected nodes.
    pub fn install_specific(
        &self,
        specs: &[String],
        dev: bool,
    ) -> Result<InstallReport, EngineError> {
        let mut manifest = self.load_manifest()?;
        let mut direct: BTreeMap<PackageId, String> = BTreeMap::new();

        for spec in specs {
            let spec = PackageSpecifier::parse(spec)?;

            let range = match spec.range {
                Some(range) => range,
                None => {
                    let resolution =
                        Resolver::new(self.registry.as_ref()).resolve_one(&spec.id, "*")?;
                    format!("^{}", resolution.version)
                }
            };

            manifest.remove_dependency(&spec.id);
            if dev {
                manifest.dev_dependencies.insert(spec.id.clone(), range.clone());
            } else {
                manifest.dependencies.insert(spec.id.clone(), range.clone());
            }
            direct.insert(spec.id, range);
        }

        manifest.to_file(&self.manifest_path())?;

        let resolution = Resolver::new(self.registry.as_ref()).resolve_tree(&direct)?;

        let store = self.lockfile_store();
        let mut lockfile = match store.read()? {
            Some(lockfile) => lockfile,
            None => Lockfile::from_manifest(&manifest),
        };
        lockfile.dependencies = manifest.dependencies.clone();
        lockfile.dev_dependencies = manifest.dev_dependencies.clone();

        let mut affected = BTreeMap::new();
        for (id, node) in &resolution.graph.nodes {
            let entry = crate::lockfile::LockEntry {
                version: node.version.to_string(),
                resolved: node.url.clone(),
                integrity: None,
                dependencies: node.deps.clone(),
            };
            lockfile.packages.insert(id.clone(), entry.clone());
            affected.insert(id.clone(), entry);
        }
        store.write(&lockfile)?;

        self.run_install(&manifest, &mut lockfile, &affected, resolution.conflicts)
    }

    /// Install every pinned dependency
    ///
    /// Generates the lockfile first when it is absent or does not cover the
    /// manifest.
    pub fn install_all(&self) -> Result<InstallReport, EngineError> {
        let manifest = self.load_manifest()?;
        println!("Installing dependencies for {}...", manifest.name);

        let store = self.lockfile_store();
        let (mut lockfile, conflicts) = if store.validate(&manifest)? {
            match store.read()? {
                Some(lockfile) => (lockfile, Vec::new()),
                None => store.generate(&manifest, self.registry.as_ref())?,
            }
        } else {
            let generated = store.generate(&manifest, self.registry.as_ref())?;
            store.write(&generated.0)?;
            generated
        };

        let entries = lockfile.packages.clone();
        self.run_install(&manifest, &mut lockfile, &entries, conflicts)
    }

    /// Update dependencies to the exact registry latest and reinstall
    ///
    /// With no ids given, only dependencies whose registry latest is ahead
    /// of the pinned version are updated; current entries keep their
    /// declared ranges.
    pub fn update(&self, ids: Option<&[PackageId]>) -> Result<InstallReport, EngineError> {
        let mut manifest = self.load_manifest()?;

        let targets: Vec<PackageId> = match ids {
            Some(ids) => ids.to_vec(),
            None => self
                .outdated()?
                .into_iter()
                .map(|entry| entry.id)
                .collect(),
        };

        for id in &targets {
            let latest = match Resolver::new(self.registry.as_ref()).resolve_one(id, "*") {
                Ok(resolution) => resolution.version,
                Err(ResolverError::Registry(RegistryError::PackageNotFound(_))) => {
                    println!("  Skipping {}: not in the registry", id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let pinned = latest.to_string();
            if let Some(range) = manifest.dependencies.get_mut(id) {
                *range = pinned.clone();
            } else if let Some(range) = manifest.dev_dependencies.get_mut(id) {
                *range = pinned.clone();
            } else if let Some(range) = manifest
                .server_dependencies
                .as_mut()
                .and_then(|server| server.get_mut(id))
            {
                *range = pinned.clone();
            } else {
                println!("  Skipping {}: not a dependency", id);
                continue;
            }

            println!("  Updated {} to {}", id, pinned);
        }

        manifest.to_file(&self.manifest_path())?;
        self.install_locked(&manifest)
    }

    /// Report direct dependencies whose registry latest is newer
    pub fn outdated(&self) -> Result<Vec<OutdatedEntry>, EngineError> {
        let manifest = self.load_manifest()?;
        let lockfile = self.lockfile_store().read()?;
        let resolver = Resolver::new(self.registry.as_ref());

        let mut outdated = Vec::new();
        for (id, range) in manifest.all_entries() {
            let current = match lockfile
                .as_ref()
                .and_then(|lock| lock.packages.get(id))
                .map(|entry| entry.version.clone())
            {
                Some(version) => version,
                None => match resolver.resolve_one(id, range) {
                    Ok(resolution) => resolution.version.to_string(),
                    Err(_) => continue,
                },
            };

            let latest = match resolver.resolve_one(id, "*") {
                Ok(resolution) => resolution.version,
                Err(_) => continue,
            };

            let current_version = match Version::parse(&current) {
                Ok(version) => version,
                Err(_) => continue,
            };

            if latest > current_version {
                outdated.push(OutdatedEntry {
                    id: id.clone(),
                    current,
                    latest,
                });
            }
        }

        Ok(outdated)
    }

    /// Resolve the tree and report it without touching any file
    pub fn analyze(&self) -> Result<TreeResolution, EngineError> {
        let manifest = self.load_manifest()?;
        let direct = manifest.direct_requirements(true);
        let resolution = Resolver::new(self.registry.as_ref()).resolve_tree(&direct)?;

        println!("Resolution for {}:", manifest.name);
        for (id, node) in &resolution.graph.nodes {
            println!("  {} -> {}", id, node.version);
        }
        print_conflicts(&resolution.conflicts);

        Ok(resolution)
    }

    /// Whether the lockfile covers the manifest
    pub fn verify_lock(&self) -> Result<bool, EngineError> {
        let manifest = self.load_manifest()?;
        Ok(self.lockfile_store().validate(&manifest)?)
    }

    /// Unconditionally resolve and persist a fresh lockfile
    pub fn regenerate_lock(&self) -> Result<Vec<Conflict>, EngineError> {
        let manifest = self.load_manifest()?;
        let store = self.lockfile_store();

        let (lockfile, conflicts) = store.generate(&manifest, self.registry.as_ref())?;
        store.write(&lockfile)?;

        println!(
            "Regenerated {} ({} packages)",
            crate::lockfile::LOCKFILE_NAME,
            lockfile.packages.len()
        );
        Ok(conflicts)
    }

    /// Remove orphaned store entries and shims
    pub fn clean(&self) -> Result<(), EngineError> {
        let manifest = self.load_manifest()?;
        let lockfile = self.lockfile_store().read()?;

        let summary = self
            .installer(&manifest)
            .prune(&manifest, lockfile.as_ref())?;
        println!(
            "Removed {} package(s), {} shim(s)",
            summary.removed_dirs.len(),
            summary.removed_shims.len()
        );

        Ok(())
    }

    /// Wipe the per-user artifact cache
    pub fn cache_clean(&self) -> Result<(), EngineError> {
        if let Some(cache) = &self.cache {
            cache.clear()?;
            println!("Cleared {}", cache.root().display());
        }
        Ok(())
    }

    /// Regenerate the lockfile for a changed manifest, then install
    fn install_locked(&self, manifest: &Manifest) -> Result<InstallReport, EngineError> {
        let store = self.lockfile_store();
        let (mut lockfile, conflicts) = store.update(manifest, self.registry.as_ref())?;
        store.write(&lockfile)?;

        let entries = lockfile.packages.clone();
        self.run_install(manifest, &mut lockfile, &entries, conflicts)
    }

    /// Shared install tail: pipeline, integrity write-back, prune, summary
    fn run_install(
        &self,
        manifest: &Manifest,
        lockfile: &mut Lockfile,
        entries: &BTreeMap<PackageId, crate::lockfile::LockEntry>,
        conflicts: Vec<Conflict>,
    ) -> Result<InstallReport, EngineError> {
        print_conflicts(&conflicts);

        let installer = self.installer(manifest);
        let known = lockfile.pinned_versions();

        installer.migrate_legacy(lockfile.packages.keys())?;
        let summary = installer.install_all(entries, &known)?;

        // Record integrity hashes for what was actually downloaded
        let mut changed = false;
        for (id, hash) in &summary.integrity {
            if let Some(entry) = lockfile.packages.get_mut(id) {
                if entry.integrity.as_deref() != Some(hash) {
                    entry.integrity = Some(hash.clone());
                    changed = true;
                }
            }
        }
        if changed {
            self.lockfile_store().write(lockfile)?;
        }

        installer.prune(manifest, Some(&*lockfile))?;

        let outdated = self.outdated().unwrap_or_default();

        let config = manifest.config();
        let project_file_request = config.update_project_file.then(|| ProjectFileRequest {
            packages_path: config.packages_path.clone(),
            parent: "ReplicatedStorage".to_string(),
        });

        println!(
            "\n{} installed, {} skipped, {} outdated",
            summary.installed.len(),
            summary.skipped.len(),
            outdated.len()
        );

        Ok(InstallReport {
            installed: summary.installed,
            skipped: summary.skipped,
            conflicts,
            outdated,
            project_file_request,
        })
    }
}

fn print_conflicts(conflicts: &[Conflict]) {
    for conflict in conflicts {
        match &conflict.resolved {
            Some(version) => {
                println!(
                    "  Warning: conflicting requirements for {} (resolved to {})",
                    conflict.id, version
                );
            }
            None => {
                println!(
                    "  Warning: no version of {} satisfies all requirements",
                    conflict.id
                );
            }
        }
        for (requirer, range) in &conflict.required_by {
            println!("    {} requires {}", requirer, range);
        }
    }
}

/// Find the nearest ancestor directory containing a jelly.json
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(MANIFEST_NAME).exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}
