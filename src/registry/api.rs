//! Registry API types
//!
//! Response types for the Wally package registry API.

use crate::id::PackageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Package metadata from the registry
///
/// Response from GET /v1/package-metadata/{scope}/{name}. The registry
/// returns versions in descending precedence order and the client never
/// reorders them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryMetadata {
    /// Published versions, newest first
    pub versions: Vec<VersionEntry>,
}

/// One published version of a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Package attributes for this version
    pub package: PackageAttrs,

    /// Production dependencies (id → range)
    #[serde(default)]
    pub dependencies: BTreeMap<PackageId, String>,

    /// Server-realm dependencies
    #[serde(default, rename = "server-dependencies")]
    pub server_dependencies: BTreeMap<PackageId, String>,

    /// Development-only dependencies
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<PackageId, String>,
}

/// Package attributes inside a version entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageAttrs {
    /// Package scope
    pub scope: String,

    /// Package name
    pub name: String,

    /// Version string
    pub version: String,

    /// Realm hint (`shared` or `server`); informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<Realm>,

    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// License identifier (SPDX)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Authors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Homepage URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

/// Per-package realm hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    Shared,
    Server,

    /// Forward compatibility with realms this client does not know
    #[serde(other)]
    Unknown,
}

/// One result from GET /v1/package-search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Package scope
    pub scope: String,

    /// Package name
    pub name: String,

    /// Published versions, newest first
    #[serde(default)]
    pub versions: Vec<String>,

    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Keywords/tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// License identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl VersionEntry {
    /// The id of the package this entry belongs to, if well-formed
    pub fn id(&self) -> Option<PackageId> {
        PackageId::new(&self.package.scope, &self.package.name).ok()
    }

    /// Dependencies that the resolver follows: production + server
    pub fn resolvable_dependencies(&self) -> BTreeMap<PackageId, String> {
        let mut deps = self.dependencies.clone();
        for (id, range) in &self.server_dependencies {
            deps.insert(id.clone(), range.clone());
        }
        deps
    }
}

impl SearchResult {
    /// The package id of this search result
    pub fn id(&self) -> Option<PackageId> {
        PackageId::new(&self.scope, &self.name).ok()
    }
}
