//! Target system - the (platform, architecture) pair being built for.

use std::fmt;
use std::path::PathBuf;

use crate::core::errors::BuildError;

/// SDK headers used for telltale detection on macOS.
const MACOS_SDK_INCLUDE: &str = "/Library/Developer/CommandLineTools/SDKs/MacOSX.sdk/usr/include";

/// Operating system family of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Darwin,
    /// Any other platform name; accepted as a target, but nothing compiles on it.
    Other(String),
}

impl Platform {
    /// Platform of the running host.
    pub fn host() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::Darwin,
            other => Platform::from(other),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Other(name) => name,
        }
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        match name {
            "linux" => Platform::Linux,
            "darwin" | "macos" => Platform::Darwin,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform and architecture we're compiling for, with the system include
/// folders used to look for already-installed libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSystem {
    platform: Platform,
    architecture: String,
    sys_include: Vec<PathBuf>,
}

impl TargetSystem {
    pub fn new(platform: Platform, architecture: impl Into<String>) -> Self {
        let architecture = architecture.into();
        let sys_include = match platform {
            Platform::Darwin => vec![PathBuf::from(MACOS_SDK_INCLUDE)],
            _ => vec![
                PathBuf::from("/usr/include"),
                PathBuf::from(format!("/usr/include/{}-{}-gnu", architecture, platform)),
            ],
        };

        TargetSystem {
            platform,
            architecture,
            sys_include,
        }
    }

    /// The running host.
    pub fn host() -> Self {
        let platform = Platform::host();
        let architecture = match (&platform, std::env::consts::ARCH) {
            (Platform::Darwin, "aarch64") => "arm64",
            (_, arch) => arch,
        };
        Self::new(platform, architecture)
    }

    /// Parse a `<platform>-<architecture>` target, defaulting missing parts to the host.
    pub fn parse(target: Option<&str>) -> Result<Self, BuildError> {
        let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Self::host());
        };

        let (platform, arch) = target.split_once('-').unwrap_or((target, ""));
        if platform.is_empty() || arch.contains(char::is_whitespace) {
            return Err(BuildError::InvalidTarget {
                target: target.to_string(),
            });
        }

        let host = Self::host();
        let arch = if arch.is_empty() {
            host.architecture
        } else {
            arch.to_string()
        };
        Ok(Self::new(Platform::from(platform), arch))
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn sys_include(&self) -> &[PathBuf] {
        &self.sys_include
    }

    pub fn is_linux(&self) -> bool {
        self.platform == Platform::Linux
    }

    pub fn is_macos(&self) -> bool {
        self.platform == Platform::Darwin
    }
}

impl fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.architecture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explicit_target() {
        let target = TargetSystem::parse(Some("linux-x86_64")).unwrap();
        assert!(target.is_linux());
        assert_eq!(target.architecture(), "x86_64");
        assert_eq!(target.to_string(), "linux-x86_64");
        assert_eq!(
            target.sys_include(),
            &[
                PathBuf::from("/usr/include"),
                PathBuf::from("/usr/include/x86_64-linux-gnu")
            ]
        );
    }

    #[test]
    fn test_parse_darwin_uses_sdk() {
        let target = TargetSystem::parse(Some("darwin-arm64")).unwrap();
        assert!(target.is_macos());
        assert_eq!(target.sys_include(), &[PathBuf::from(MACOS_SDK_INCLUDE)]);
    }

    #[test]
    fn test_parse_unknown_platform_is_accepted() {
        let target = TargetSystem::parse(Some("foo-bar")).unwrap();
        assert_eq!(target.platform(), &Platform::Other("foo".to_string()));
        assert_eq!(target.architecture(), "bar");
        assert!(!target.is_linux());
        assert!(!target.is_macos());
    }

    #[test]
    fn test_parse_defaults_to_host() {
        assert_eq!(TargetSystem::parse(None).unwrap(), TargetSystem::host());
        assert_eq!(TargetSystem::parse(Some("  ")).unwrap(), TargetSystem::host());

        let target = TargetSystem::parse(Some("linux")).unwrap();
        assert!(target.is_linux());
        assert_eq!(target.architecture(), TargetSystem::host().architecture());
    }

    #[test]
    fn test_parse_rejects_empty_platform() {
        assert!(matches!(
            TargetSystem::parse(Some("-x86_64")),
            Err(BuildError::InvalidTarget { .. })
        ));
    }
}
