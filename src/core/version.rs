//! Python version specs and the tracked versions of each supported family.
//!
//! Only a handful of recent versions are tracked per family; anything else
//! is rejected up front rather than failing halfway through a build.

use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::core::errors::BuildError;

const CPYTHON_VERSIONS: &[&str] = &["3.9.6", "3.9.5", "3.8.11", "3.7.11", "3.6.14"];

/// A python implementation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Cpython,
}

impl Family {
    pub const ALL: &'static [Family] = &[Family::Cpython];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Cpython => "cpython",
        }
    }

    /// Tracked versions, latest first.
    pub fn versions(&self) -> Vec<Version> {
        let raw = match self {
            Family::Cpython => CPYTHON_VERSIONS,
        };
        let mut versions: Vec<Version> = raw.iter().filter_map(|v| v.parse().ok()).collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    pub fn latest(&self) -> Option<Version> {
        self.versions().into_iter().next()
    }
}

impl FromStr for Family {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpython" | "py" | "python" => Ok(Family::Cpython),
            other => Err(BuildError::UnsupportedFamily {
                family: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `family:version` spec, such as `cpython:3.9.6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonSpec {
    pub family: Family,
    pub version: Version,
}

impl PythonSpec {
    /// Parse and validate a spec against the tracked versions.
    ///
    /// An empty spec selects the latest cpython, a bare version implies cpython,
    /// and a partial version (`3.8`) picks the latest tracked match.
    pub fn parse(spec: &str) -> Result<Self, BuildError> {
        let spec = spec.trim();
        let (family, text) = match spec.split_once(':') {
            Some((family, text)) => (family.parse::<Family>()?, text),
            None if spec.is_empty() || spec.starts_with(|c: char| c.is_ascii_digit()) => {
                (Family::Cpython, spec)
            }
            None => {
                return Err(BuildError::InvalidSpec {
                    spec: spec.to_string(),
                })
            }
        };

        let invalid = || BuildError::InvalidSpec {
            spec: spec.to_string(),
        };

        if text.is_empty() {
            let version = family.latest().ok_or_else(invalid)?;
            return Ok(PythonSpec { family, version });
        }

        let parts = text
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let version = match parts.as_slice() {
            [major, minor, patch] => Version::new(*major, *minor, *patch),
            [major] | [major, _] => family
                .versions()
                .into_iter()
                .find(|v| v.major == *major && parts.get(1).map_or(true, |m| v.minor == *m))
                .ok_or_else(|| BuildError::UnsupportedVersion {
                    spec: format!("{}:{}", family, text),
                })?,
            _ => return Err(invalid()),
        };

        if !family.versions().contains(&version) {
            return Err(BuildError::UnsupportedVersion {
                spec: format!("{}:{}", family, version),
            });
        }

        Ok(PythonSpec { family, version })
    }

    /// `major.minor`, as used in `libpython3.9.a` and `python3.9`.
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }

    /// Folder-friendly form: `cpython-3.9.6`.
    pub fn canonical_folder(&self) -> String {
        format!("{}-{}", self.family, self.version)
    }
}

impl fmt::Display for PythonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.version)
    }
}
