//! Jelly package-management engine
//!
//! Core engine for the Jelly package manager for the Roblox ecosystem:
//! - Registry access (Wally HTTP API)
//! - Semver version parsing and range matching
//! - Dependency resolution with conflict detection
//! - Lockfile lifecycle (jelly-lock.json)
//! - Package installation (`_Index` store, alias shims, orphan pruning)
//!
//! The command-line surface, publishing and Rojo project-file mutation are
//! external collaborators built on top of this crate.

pub mod cache;
pub mod engine;
pub mod id;
pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod semver;

pub use cache::{Cache, CacheError};
pub use engine::{
    find_project_root, Engine, EngineError, InstallReport, OutdatedEntry, ProjectFileRequest,
};
pub use id::{PackageId, PackageIdError};
pub use installer::{ArchiveError, Installer, InstallerError};
pub use lockfile::{LockEntry, Lockfile, LockfileError, LockfileStore};
pub use manifest::{JellyConfig, Manifest, ManifestError};
pub use registry::{
    Registry, RegistryClient, RegistryError, RegistryMetadata, SearchResult, VersionEntry,
};
pub use resolver::{
    Conflict, Resolution, ResolutionGraph, ResolvedNode, Resolver, ResolverError, TreeResolution,
};
pub use semver::{Range, SemverError, Version};
