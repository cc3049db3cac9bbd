//! Package layout normalization
//!
//! Leaves an extracted package directory containing just the
//! Roblox-consumable module tree, and strips well-known non-consumable
//! files.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Entries removed from a package root during cleanup
const CLEANUP_ENTRIES: &[&str] = &[
    "README.md",
    "README.txt",
    "LICENSE",
    "LICENSE.md",
    "LICENSE.txt",
    ".gitignore",
    ".gitattributes",
    ".github",
    ".git",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "wally.toml",
    "selene.toml",
    "stylua.toml",
    "docs",
    "documentation",
    "examples",
    "test",
    "tests",
    ".travis.yml",
    ".vscode",
    "rotriever.toml",
];

/// A Rojo project file, read only as far as the installer needs
#[derive(Debug, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tree: Option<ProjectFileNode>,
}

/// One node of a Rojo project tree
///
/// Either a leaf pointing at a filesystem path, or a container with child
/// nodes. Unknown sibling fields (`$className`, properties) are tolerated.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProjectFileNode {
    Leaf {
        #[serde(rename = "$path")]
        path: String,
    },
    Container {
        #[serde(flatten)]
        children: BTreeMap<String, serde_json::Value>,
    },
}

impl ProjectFileNode {
    /// The `$path` of a leaf node
    pub fn path(&self) -> Option<&str> {
        match self {
            ProjectFileNode::Leaf { path } => Some(path),
            ProjectFileNode::Container { .. } => None,
        }
    }
}

/// Normalize a package directory to its bare module tree
///
/// If `default.project.json` declares a `tree.$path`, that path becomes the
/// package root and everything else is discarded. Otherwise, a lone `.lua`
/// or `.luau` file at the root is renamed to `init.lua` when no init module
/// exists yet.
pub fn normalize_layout(pkg_dir: &Path) -> io::Result<()> {
    if let Some(main_root) = project_file_main_root(pkg_dir) {
        if main_root != Path::new(".") {
            hoist_main_root(pkg_dir, &main_root)?;
            return Ok(());
        }
    }

    rename_lone_module(pkg_dir)
}

/// Remove well-known non-consumable entries from a package root
///
/// Deletion is recursive for directories and never reaches outside the
/// package directory.
pub fn cleanup_package_dir(pkg_dir: &Path) -> io::Result<()> {
    for name in CLEANUP_ENTRIES {
        let path = pkg_dir.join(name);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Read `tree.$path` from the package's `default.project.json`, if usable
fn project_file_main_root(pkg_dir: &Path) -> Option<PathBuf> {
    let content = fs::read_to_string(pkg_dir.join("default.project.json")).ok()?;
    let project: ProjectFile = serde_json::from_str(&content).ok()?;
    let path = project.tree.as_ref()?.path()?.to_string();

    let path = PathBuf::from(path);

    // A $path pointing outside the package is ignored
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    Some(path)
}

/// Replace the package directory with the contents of its main module root
fn hoist_main_root(pkg_dir: &Path, main_root: &Path) -> io::Result<()> {
    let staging = staging_path(pkg_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    fs::rename(pkg_dir, &staging)?;
    fs::create_dir_all(pkg_dir)?;

    let source = staging.join(main_root);
    if source.is_dir() {
        for entry in fs::read_dir(&source)? {
            let entry = entry?;
            fs::rename(entry.path(), pkg_dir.join(entry.file_name()))?;
        }
    } else if source.is_file() {
        fs::rename(&source, pkg_dir.join("init.lua"))?;
    } else {
        // Declared $path does not exist: restore the original tree
        fs::remove_dir_all(pkg_dir)?;
        fs::rename(&staging, pkg_dir)?;
        return Ok(());
    }

    fs::remove_dir_all(&staging)?;
    Ok(())
}

fn staging_path(pkg_dir: &Path) -> PathBuf {
    let name = pkg_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());

    pkg_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{}.staging", name))
}

/// Rename a lone root-level module file to init.lua
fn rename_lone_module(pkg_dir: &Path) -> io::Result<()> {
    if pkg_dir.join("init.lua").exists() || pkg_dir.join("init.luau").exists() {
        return Ok(());
    }

    let mut modules = Vec::new();
    for entry in fs::read_dir(pkg_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("lua") | Some("luau") => modules.push(path),
            _ => {}
        }
    }

    if let [module] = modules.as_slice() {
        fs::rename(module, pkg_dir.join("init.lua"))?;
    }

    Ok(())
}
