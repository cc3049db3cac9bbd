//! Semantic versioning parser and range matching
//!
//! Provides SemVer 2.0 version parsing and version range resolution.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during semver parsing
#[derive(Debug, Error)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid range format
    #[error("Invalid range format: {0}")]
    InvalidRange(String),
}

/// Semantic version (MAJOR.MINOR.PATCH with optional pre-release and build)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version range
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    /// Exact version (=1.2.3 or 1.2.3)
    Exact(Version),

    /// Caret range (^1.2.3 → >=1.2.3 <2.0.0)
    Caret(Version),

    /// Tilde range (~1.2.3 → >=1.2.3 <1.3.0)
    Tilde(Version),

    /// Greater than (>1.2.3)
    GreaterThan(Version),

    /// Greater than or equal (>=1.2.3)
    GreaterThanOrEqual(Version),

    /// Less than (<1.2.3)
    LessThan(Version),

    /// Less than or equal (<=1.2.3)
    LessThanOrEqual(Version),

    /// Hyphen range (1.0.0 - 2.0.0, both ends inclusive)
    Hyphen(Version, Version),

    /// Wildcard (1.2.*, 1.*)
    Wildcard(u64, Option<u64>),

    /// Disjunction (A || B)
    Or(Vec<Range>),

    /// Conjunction (>=1.2.0, <2.0.0)
    And(Vec<Range>),

    /// Any version (*)
    Any,
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();

        // Remove 'v' prefix if present
        let s = s.strip_prefix('v').unwrap_or(s);

        // Split by + to separate build metadata
        let (version_part, build) = if let Some(pos) = s.find('+') {
            let (v, b) = s.split_at(pos);
            (v, Some(b[1..].to_string()))
        } else {
            (s, None)
        };

        // Split by - to separate prerelease
        let (core_version, prerelease) = if let Some(pos) = version_part.find('-') {
            let (v, p) = version_part.split_at(pos);
            (v, Some(p[1..].to_string()))
        } else {
            (version_part, None)
        };

        // Parse MAJOR.MINOR.PATCH
        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.len() != 3 {
            return Err(SemverError::InvalidVersion(format!(
                "Expected MAJOR.MINOR.PATCH, got '{}'",
                s
            )));
        }

        let major = parts[0].parse().map_err(|_| {
            SemverError::InvalidVersion(format!("Invalid major version: {}", parts[0]))
        })?;

        let minor = parts[1].parse().map_err(|_| {
            SemverError::InvalidVersion(format!("Invalid minor version: {}", parts[1]))
        })?;

        let patch = parts[2].parse().map_err(|_| {
            SemverError::InvalidVersion(format!("Invalid patch version: {}", parts[2]))
        })?;

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Parse a possibly partial version string, filling missing parts with zero
    ///
    /// Accepts `1`, `1.4` and `1.4.0`; range positions allow the short forms.
    pub fn parse_loose(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        if let Ok(v) = Self::parse(s) {
            return Ok(v);
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.is_empty() || parts.len() > 2 {
            return Err(SemverError::InvalidVersion(s.to_string()));
        }

        let mut numbers = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            numbers[i] = part
                .parse()
                .map_err(|_| SemverError::InvalidVersion(s.to_string()))?;
        }

        Ok(Version::new(numbers[0], numbers[1], numbers[2]))
    }

    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare major, minor, patch
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Compare prerelease (versions with prerelease are less than without);
        // build metadata never participates in precedence
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => cmp_prerelease(a, b),
        }
    }
}

/// Compare pre-release tags per SemVer 2.0 precedence
///
/// Dot-separated identifiers, numeric identifiers compare numerically and
/// rank below alphanumeric ones; a shorter tag that is a prefix of a longer
/// one ranks first.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(n), Ok(m)) => n.cmp(&m),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Range {
    /// Parse a range string
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(SemverError::InvalidRange("empty range".to_string()));
        }

        if s.contains("||") {
            let branches = s
                .split("||")
                .map(|branch| Self::parse_branch(branch.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Range::Or(branches));
        }

        Self::parse_branch(s)
    }

    /// Parse a single disjunction branch
    fn parse_branch(s: &str) -> Result<Self, SemverError> {
        if s.is_empty() {
            return Err(SemverError::InvalidRange("empty range branch".to_string()));
        }

        // Hyphen range: "1.0 - 2.0"
        if let Some((low, high)) = s.split_once(" - ") {
            let low = Version::parse_loose(low.trim())?;
            let high = Version::parse_loose(high.trim())?;
            return Ok(Range::Hyphen(low, high));
        }

        // Comma-separated conjunction: ">=1.2.0, <2.0.0"
        if s.contains(',') {
            let parts = s
                .split(',')
                .map(|part| Self::parse_simple(part.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Range::And(parts));
        }

        Self::parse_simple(s)
    }

    /// Parse a simple range: one comparator, caret, tilde, wildcard or exact
    fn parse_simple(s: &str) -> Result<Self, SemverError> {
        if s == "*" {
            return Ok(Range::Any);
        }

        if let Some(rest) = s.strip_prefix(">=") {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::GreaterThanOrEqual(version));
        }

        if let Some(rest) = s.strip_prefix("<=") {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::LessThanOrEqual(version));
        }

        if let Some(rest) = s.strip_prefix('>') {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::GreaterThan(version));
        }

        if let Some(rest) = s.strip_prefix('<') {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::LessThan(version));
        }

        if let Some(rest) = s.strip_prefix('^') {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::Caret(version));
        }

        if let Some(rest) = s.strip_prefix('~') {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::Tilde(version));
        }

        if let Some(rest) = s.strip_prefix('=') {
            let version = Version::parse_loose(rest.trim())?;
            return Ok(Range::Exact(version));
        }

        // Check for wildcards
        if s.contains('*') {
            return Self::parse_wildcard(s);
        }

        // Default: exact version
        let version = Version::parse_loose(s)?;
        Ok(Range::Exact(version))
    }

    /// Parse wildcard range (1.2.*, 1.*)
    fn parse_wildcard(s: &str) -> Result<Self, SemverError> {
        let parts: Vec<&str> = s.split('.').collect();

        if parts.len() == 2 && parts[1] == "*" {
            let major = parts[0]
                .parse()
                .map_err(|_| SemverError::InvalidRange(format!("Invalid wildcard: {}", s)))?;
            return Ok(Range::Wildcard(major, None));
        }

        if parts.len() == 3 && parts[2] == "*" {
            let major = parts[0]
                .parse()
                .map_err(|_| SemverError::InvalidRange(format!("Invalid wildcard: {}", s)))?;
            let minor = parts[1]
                .parse()
                .map_err(|_| SemverError::InvalidRange(format!("Invalid wildcard: {}", s)))?;
            return Ok(Range::Wildcard(major, Some(minor)));
        }

        Err(SemverError::InvalidRange(format!("Invalid wildcard: {}", s)))
    }

    /// Check if a version satisfies this range
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            Range::Any => true,

            Range::Exact(v) => {
                version.major == v.major
                    && version.minor == v.minor
                    && version.patch == v.patch
                    && version.prerelease == v.prerelease
            }

            Range::Caret(v) => {
                // ^1.2.3 := >=1.2.3 <2.0.0
                // ^0.2.3 := >=0.2.3 <0.3.0
                // ^0.0.3 := >=0.0.3 <0.0.4
                if v.major > 0 {
                    version >= v && version.major == v.major
                } else if v.minor > 0 {
                    version >= v && version.major == 0 && version.minor == v.minor
                } else {
                    version >= v
                        && version.major == 0
                        && version.minor == 0
                        && version.patch == v.patch
                }
            }

            Range::Tilde(v) => {
                // ~1.2.3 := >=1.2.3 <1.3.0
                version >= v && version.major == v.major && version.minor == v.minor
            }

            Range::GreaterThan(v) => version > v,
            Range::GreaterThanOrEqual(v) => version >= v,
            Range::LessThan(v) => version < v,
            Range::LessThanOrEqual(v) => version <= v,

            Range::Hyphen(low, high) => version >= low && version <= high,

            Range::Wildcard(major, minor) => {
                if let Some(m) = minor {
                    version.major == *major && version.minor == *m
                } else {
                    version.major == *major
                }
            }

            Range::Or(ranges) => ranges.iter().any(|r| r.satisfies(version)),
            Range::And(ranges) => ranges.iter().all(|r| r.satisfies(version)),
        }
    }

    /// Check if this range names a prerelease with the same core triple
    ///
    /// Prerelease versions are only eligible candidates when the requirement
    /// itself mentions a prerelease of that exact major.minor.patch.
    pub fn mentions_prerelease_of(&self, version: &Version) -> bool {
        fn same_triple(w: &Version, v: &Version) -> bool {
            w.prerelease.is_some()
                && w.major == v.major
                && w.minor == v.minor
                && w.patch == v.patch
        }

        match self {
            Range::Exact(w)
            | Range::Caret(w)
            | Range::Tilde(w)
            | Range::GreaterThan(w)
            | Range::GreaterThanOrEqual(w)
            | Range::LessThan(w)
            | Range::LessThanOrEqual(w) => same_triple(w, version),

            Range::Hyphen(low, high) => same_triple(low, version) || same_triple(high, version),

            Range::Or(ranges) | Range::And(ranges) => {
                ranges.iter().any(|r| r.mentions_prerelease_of(version))
            }

            Range::Wildcard(..) | Range::Any => false,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::Any => write!(f, "*"),
            Range::Exact(v) => write!(f, "{}", v),
            Range::Caret(v) => write!(f, "^{}", v),
            Range::Tilde(v) => write!(f, "~{}", v),
            Range::GreaterThan(v) => write!(f, ">{}", v),
            Range::GreaterThanOrEqual(v) => write!(f, ">={}", v),
            Range::LessThan(v) => write!(f, "<{}", v),
            Range::LessThanOrEqual(v) => write!(f, "<={}", v),
            Range::Hyphen(low, high) => write!(f, "{} - {}", low, high),
            Range::Wildcard(major, Some(minor)) => write!(f, "{}.{}.*", major, minor),
            Range::Wildcard(major, None) => write!(f, "{}.*", major),
            Range::Or(ranges) => {
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", r)?;
                }
                Ok(())
            }
            Range::And(ranges) => {
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", r)?;
                }
                Ok(())
            }
        }
    }
}
