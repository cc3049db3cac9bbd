//! Package identifiers
//!
//! A package is identified by a `scope/name` pair, e.g. `roblox/roact`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a package id
#[derive(Debug, Error)]
pub enum PackageIdError {
    /// Missing scope separator
    #[error("Invalid package id '{0}': expected scope/name")]
    MissingScope(String),

    /// Invalid characters in scope or name
    #[error("Invalid package id '{0}': scope and name may only contain letters, digits, '-' and '_'")]
    InvalidCharacters(String),
}

/// A package identifier: `(scope, name)`, case-sensitive
///
/// Canonical string form is `scope/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    scope: String,
    name: String,
}

impl PackageId {
    /// Create a package id from scope and name parts
    pub fn new(scope: &str, name: &str) -> Result<Self, PackageIdError> {
        if !is_valid_part(scope) || !is_valid_part(name) {
            return Err(PackageIdError::InvalidCharacters(format!(
                "{}/{}",
                scope, name
            )));
        }

        Ok(Self {
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }

    /// The scope part (`roblox` in `roblox/roact`)
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The name part (`roact` in `roblox/roact`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory name used inside the `_Index` store (`roblox_roact`)
    pub fn index_dir_name(&self) -> String {
        format!("{}_{}", self.scope, self.name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

impl FromStr for PackageId {
    type Err = PackageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, name) = s
            .split_once('/')
            .ok_or_else(|| PackageIdError::MissingScope(s.to_string()))?;

        if name.contains('/') {
            return Err(PackageIdError::InvalidCharacters(s.to_string()));
        }

        Self::new(scope, name)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Validate a scope or name part: `[A-Za-z0-9_-]+`
fn is_valid_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
