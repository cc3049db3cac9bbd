//! Project manifest parsing (jelly.json)
//!
//! Provides structures and parsing for Jelly project manifests.

use crate::id::PackageId;
use crate::semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Manifest file name
pub const MANIFEST_NAME: &str = "jelly.json";

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read jelly.json: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse jelly.json: {0}")]
    Parse(#[from] serde_json::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    Validation(String),
}

/// Project manifest (jelly.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Project name
    pub name: String,

    /// Project version
    pub version: String,

    /// Production dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<PackageId, String>,

    /// Development-only dependencies
    #[serde(default)]
    pub dev_dependencies: BTreeMap<PackageId, String>,

    /// Server-realm dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_dependencies: Option<BTreeMap<PackageId, String>>,

    /// Named scripts (run by the CLI collaborator)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    /// Tool behavior switches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jelly: Option<JellyConfig>,
}

/// Tool behavior configuration (`jelly` section of the manifest)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JellyConfig {
    /// Remove well-known non-consumable files from installed packages
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Normalize installed package layouts to a bare module tree
    #[serde(default = "default_true")]
    pub optimize: bool,

    /// Directory packages are laid out in, relative to the project root
    #[serde(default = "default_packages_path")]
    pub packages_path: String,

    /// Ask the project-file collaborator to expose the packages directory
    #[serde(default = "default_true")]
    pub update_project_file: bool,
}

fn default_true() -> bool {
    true
}

fn default_packages_path() -> String {
    "Packages".to_string()
}

impl Default for JellyConfig {
    fn default() -> Self {
        Self {
            cleanup: true,
            optimize: true,
            packages_path: default_packages_path(),
            update_project_file: true,
        }
    }
}

impl Manifest {
    /// Create a fresh manifest for a new project
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            server_dependencies: None,
            scripts: BTreeMap::new(),
            jelly: None,
        }
    }

    /// Parse a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a string
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.is_empty() {
            return Err(ManifestError::Validation(
                "Project name cannot be empty".to_string(),
            ));
        }

        if Version::parse(&self.version).is_err() {
            return Err(ManifestError::Validation(format!(
                "Invalid version: {}. Must be valid semver (e.g., 1.2.3)",
                self.version
            )));
        }

        for (id, range) in self.all_entries() {
            if range.is_empty() {
                return Err(ManifestError::Validation(format!(
                    "Dependency '{}' has an empty range",
                    id
                )));
            }
        }

        // No package may appear in more than one dependency map
        for id in self.dependencies.keys() {
            if self.dev_dependencies.contains_key(id) {
                return Err(ManifestError::Validation(format!(
                    "Package '{}' is listed in both dependencies and devDependencies",
                    id
                )));
            }
        }

        if let Some(server) = &self.server_dependencies {
            for id in server.keys() {
                if self.dependencies.contains_key(id) || self.dev_dependencies.contains_key(id) {
                    return Err(ManifestError::Validation(format!(
                        "Package '{}' is listed in more than one dependency map",
                        id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Write manifest to a file (2-space indent, trailing newline)
    pub fn to_file(&self, path: &Path) -> Result<(), ManifestError> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;
        Ok(())
    }

    /// All dependency entries across the three maps
    pub fn all_entries(&self) -> impl Iterator<Item = (&PackageId, &String)> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .chain(self.server_dependencies.iter().flatten())
    }

    /// Direct requirements to resolve: production + server, plus dev when asked
    ///
    /// Server dependencies of the root are treated exactly like production
    /// dependencies; dev dependencies of the root are followed, dev
    /// dependencies of transitive packages never are.
    pub fn direct_requirements(&self, include_dev: bool) -> BTreeMap<PackageId, String> {
        let mut direct: BTreeMap<PackageId, String> = self.dependencies.clone();

        if let Some(server) = &self.server_dependencies {
            for (id, range) in server {
                direct.insert(id.clone(), range.clone());
            }
        }

        if include_dev {
            for (id, range) in &self.dev_dependencies {
                direct.insert(id.clone(), range.clone());
            }
        }

        direct
    }

    /// Remove a package from every dependency map
    ///
    /// Returns true if the package was present anywhere.
    pub fn remove_dependency(&mut self, id: &PackageId) -> bool {
        let mut removed = self.dependencies.remove(id).is_some();
        removed |= self.dev_dependencies.remove(id).is_some();
        if let Some(server) = &mut self.server_dependencies {
            removed |= server.remove(id).is_some();
        }
        removed
    }

    /// Effective tool configuration
    pub fn config(&self) -> JellyConfig {
        self.jelly.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_manifest() {
        let json = r#"{
            "name": "demo",
            "version": "0.1.0",
            "dependencies": {
                "roblox/roact": "^1.4.0",
                "evaera/promise": "~4.0.0"
            },
            "devDependencies": {}
        }"#;

        let manifest = Manifest::from_str(json).unwrap();
        assert_eq!(manifest.name, "demo");
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(manifest.dev_dependencies.is_empty());
    }

    #[test]
    fn test_missing_maps_coerced_to_empty() {
        let json = r#"{ "name": "demo", "version": "0.1.0" }"#;

        let manifest = Manifest::from_str(json).unwrap();
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.dev_dependencies.is_empty());
        assert!(manifest.server_dependencies.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{ "name": "demo", "version": "0.1.0", "private": true }"#;
        assert!(Manifest::from_str(json).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let json = r#"{ "name": "", "version": "0.1.0" }"#;
        let result = Manifest::from_str(json);
        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_bad_version_rejected() {
        let json = r#"{ "name": "demo", "version": "1.0" }"#;
        let result = Manifest::from_str(json);
        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_duplicate_across_maps_rejected() {
        let json = r#"{
            "name": "demo",
            "version": "0.1.0",
            "dependencies": { "roblox/roact": "^1.4.0" },
            "devDependencies": { "roblox/roact": "^1.4.0" }
        }"#;

        let result = Manifest::from_str(json);
        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_server_dependencies() {
        let json = r#"{
            "name": "demo",
            "version": "0.1.0",
            "serverDependencies": { "kampfkarren/hooks": "^0.2.0" }
        }"#;

        let manifest = Manifest::from_str(json).unwrap();
        let direct = manifest.direct_requirements(false);
        assert_eq!(direct.len(), 1);
        assert!(direct.contains_key(&"kampfkarren/hooks".parse().unwrap()));
    }

    #[test]
    fn test_round_trip() {
        let mut manifest = Manifest::new("demo");
        manifest
            .dependencies
            .insert("roblox/roact".parse().unwrap(), "1.4.0".to_string());

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(MANIFEST_NAME);
        manifest.to_file(&path).unwrap();

        let reloaded = Manifest::from_file(&path).unwrap();
        assert_eq!(reloaded, manifest);

        // The writer is stable: a second round trip is byte-identical
        let first = std::fs::read_to_string(&path).unwrap();
        reloaded.to_file(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fresh_manifest_serialization() {
        let manifest = Manifest::new("demo");
        let json = serde_json::to_value(&manifest).unwrap();

        assert_eq!(json["name"], "demo");
        assert_eq!(json["version"], "0.1.0");
        assert!(json["dependencies"].as_object().unwrap().is_empty());
        assert!(json["devDependencies"].as_object().unwrap().is_empty());
        assert!(json.get("serverDependencies").is_none());
        assert!(json.get("scripts").is_none());
    }

    #[test]
    fn test_config_defaults() {
        let manifest = Manifest::new("demo");
        let config = manifest.config();
        assert!(config.cleanup);
        assert!(config.optimize);
        assert!(config.update_project_file);
        assert_eq!(config.packages_path, "Packages");
    }

    #[test]
    fn test_config_overrides() {
        let json = r#"{
            "name": "demo",
            "version": "0.1.0",
            "jelly": { "optimize": false, "packagesPath": "Deps" }
        }"#;

        let manifest = Manifest::from_str(json).unwrap();
        let config = manifest.config();
        assert!(!config.optimize);
        assert!(config.cleanup);
        assert_eq!(config.packages_path, "Deps");
    }
}
