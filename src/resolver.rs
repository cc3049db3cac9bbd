//! Dependency resolution
//!
//! Maps `(package, range)` requests to concrete versions and walks the
//! transitive graph, producing a flat single-version resolution with
//! detected conflicts.

use crate::id::PackageId;
use crate::registry::{Registry, RegistryError, VersionEntry};
use crate::semver::{Range, Version};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Requirer name used for the manifest's own dependency entries
pub const ROOT_REQUIRER: &str = "<root>";

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// No version satisfies the requested range
    #[error("No version of {package} satisfies {range}")]
    VersionNotFound { package: String, range: String },
}

/// A single `(package, range)` resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Chosen version
    pub version: Version,

    /// The registry entry for the chosen version
    pub entry: VersionEntry,
}

/// A resolved package pinned to one version
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    /// Package id
    pub id: PackageId,

    /// Pinned version
    pub version: Version,

    /// Archive URL the version resolves to
    pub url: String,

    /// Dependencies declared by the chosen version (production + server)
    pub deps: BTreeMap<PackageId, String>,
}

/// Flat resolution of a dependency tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionGraph {
    /// One node per package id
    pub nodes: BTreeMap<PackageId, ResolvedNode>,

    /// The top-level ranges the resolution started from
    pub direct: BTreeMap<PackageId, String>,
}

/// A disagreement between requirers of the same package
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Package both requirers want
    pub id: PackageId,

    /// Who asked for it, with the range each asked for
    pub required_by: Vec<(String, String)>,

    /// The intersection pick, or None when the graph is infeasible
    pub resolved: Option<Version>,
}

/// Result of resolving a full tree
#[derive(Debug, Clone, Default)]
pub struct TreeResolution {
    /// The resolved graph (packages with no satisfying version are absent)
    pub graph: ResolutionGraph,

    /// Conflicts detected along the way, sorted by package id
    pub conflicts: Vec<Conflict>,
}

/// One aggregated requirement on a package
#[derive(Debug, Clone)]
struct Requirement {
    requirer: String,
    raw: String,
    range: Option<Range>,
}

impl Requirement {
    fn new(requirer: &str, raw: &str) -> Self {
        Self {
            requirer: requirer.to_string(),
            raw: raw.to_string(),
            // Unknown range syntax falls back to exact-string comparison
            range: Range::parse(raw).ok(),
        }
    }

    fn satisfies(&self, version: &Version) -> bool {
        match &self.range {
            Some(range) => range.satisfies(version),
            None => self.raw.trim() == version.to_string(),
        }
    }

    fn admits_prerelease(&self, version: &Version) -> bool {
        match &self.range {
            Some(range) => range.mentions_prerelease_of(version),
            None => self.raw.trim() == version.to_string(),
        }
    }
}

/// Dependency resolver
///
/// Pure logic over a `Registry`; all suspension happens inside the registry
/// calls. Output is deterministic for a fixed registry state regardless of
/// iteration order, because the pick is always the highest version in the
/// intersection of every range seen for a package.
pub struct Resolver<'a> {
    registry: &'a dyn Registry,
}

impl<'a> Resolver<'a> {
    /// Create a new resolver
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Resolve a single `(package, range)` request to a concrete version
    ///
    /// Chooses the highest version satisfying the range; the wildcard `*`
    /// takes the registry's first (highest) entry.
    pub fn resolve_one(&self, id: &PackageId, range: &str) -> Result<Resolution, ResolverError> {
        let metadata = self.registry.metadata(id)?;
        let requirement = Requirement::new(ROOT_REQUIRER, range);

        if matches!(requirement.range, Some(Range::Any)) {
            let entry = metadata.versions.first().ok_or_else(|| {
                ResolverError::VersionNotFound {
                    package: id.to_string(),
                    range: range.to_string(),
                }
            })?;
            let version = Version::parse(&entry.package.version)
                .map_err(|e| RegistryError::Schema(e.to_string()))?;
            return Ok(Resolution {
                version,
                entry: entry.clone(),
            });
        }

        let mut best: Option<(Version, &VersionEntry)> = None;
        for entry in &metadata.versions {
            let Ok(version) = Version::parse(&entry.package.version) else {
                continue;
            };

            if !requirement.satisfies(&version) {
                continue;
            }
            if version.is_prerelease() && !requirement.admits_prerelease(&version) {
                continue;
            }

            match &best {
                Some((current, _)) if *current >= version => {}
                _ => best = Some((version, entry)),
            }
        }

        match best {
            Some((version, entry)) => Ok(Resolution {
                version,
                entry: entry.clone(),
            }),
            None => Err(ResolverError::VersionNotFound {
                package: id.to_string(),
                range: range.to_string(),
            }),
        }
    }

    /// Resolve the transitive closure of the given direct requirements
    ///
    /// Production and server dependencies are followed transitively; dev
    /// dependencies are only honored when the caller puts them in `direct`
    /// (the root's dev deps), never for transitive packages. Unsatisfiable
    /// packages are reported as conflicts and skipped; other branches
    /// continue.
    pub fn resolve_tree(
        &self,
        direct: &BTreeMap<PackageId, String>,
    ) -> Result<TreeResolution, ResolverError> {
        let mut queue: VecDeque<(PackageId, Requirement)> = direct
            .iter()
            .map(|(id, range)| (id.clone(), Requirement::new(ROOT_REQUIRER, range)))
            .collect();

        let mut aggregated: HashMap<PackageId, Vec<Requirement>> = HashMap::new();
        let mut picked: BTreeMap<PackageId, ResolvedNode> = BTreeMap::new();
        let mut conflicts: BTreeMap<PackageId, Conflict> = BTreeMap::new();

        while let Some((id, requirement)) = queue.pop_front() {
            let requirements = aggregated.entry(id.clone()).or_default();
            requirements.push(requirement);

            let metadata = match self.registry.metadata(&id) {
                Ok(metadata) => metadata,
                Err(RegistryError::PackageNotFound(_)) => {
                    conflicts.insert(id.clone(), unsatisfiable(&id, requirements));
                    picked.remove(&id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            // Candidates must satisfy every range seen so far for this id
            let mut chosen: Option<(Version, &VersionEntry)> = None;
            for entry in &metadata.versions {
                let Ok(version) = Version::parse(&entry.package.version) else {
                    continue;
                };

                if !requirements.iter().all(|r| r.satisfies(&version)) {
                    continue;
                }
                if version.is_prerelease()
                    && !requirements.iter().any(|r| r.admits_prerelease(&version))
                {
                    continue;
                }

                match &chosen {
                    Some((current, _)) if *current >= version => {}
                    _ => chosen = Some((version, entry)),
                }
            }

            let Some((version, entry)) = chosen else {
                conflicts.insert(id.clone(), unsatisfiable(&id, requirements));
                picked.remove(&id);
                continue;
            };

            // Distinct ranges on the same package are a conflict, resolved by
            // the intersection pick
            let mut distinct: Vec<&str> = requirements.iter().map(|r| r.raw.as_str()).collect();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() > 1 {
                conflicts.insert(
                    id.clone(),
                    Conflict {
                        id: id.clone(),
                        required_by: required_by(requirements),
                        resolved: Some(version.clone()),
                    },
                );
            }

            if let Some(existing) = picked.get(&id) {
                if existing.version == version {
                    continue;
                }
            }

            let deps = entry.resolvable_dependencies();
            for (dep_id, dep_range) in &deps {
                queue.push_back((dep_id.clone(), Requirement::new(&id.to_string(), dep_range)));
            }

            picked.insert(
                id.clone(),
                ResolvedNode {
                    id: id.clone(),
                    version: version.clone(),
                    url: self.registry.contents_url(&id, &version),
                    deps,
                },
            );
        }

        Ok(TreeResolution {
            graph: ResolutionGraph {
                nodes: picked,
                direct: direct.clone(),
            },
            conflicts: conflicts.into_values().collect(),
        })
    }
}

fn required_by(requirements: &[Requirement]) -> Vec<(String, String)> {
    requirements
        .iter()
        .map(|r| (r.requirer.clone(), r.raw.clone()))
        .collect()
}

fn unsatisfiable(id: &PackageId, requirements: &[Requirement]) -> Conflict {
    Conflict {
        id: id.clone(),
        required_by: required_by(requirements),
        resolved: None,
    }
}
