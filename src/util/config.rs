//! Configuration file support for portable-python.
//!
//! Two configuration file locations are consulted:
//! - Global: `<config dir>/portable-python/config.toml` - User-wide defaults
//! - Project: `./portable-python.toml` - Overrides for the current folder
//!
//! Project config takes precedence over global config, and command line flags
//! take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the project-level config file, looked up in the current directory.
pub const PROJECT_CONFIG_FILE: &str = "portable-python.toml";

/// portable-python configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Network settings
    pub net: NetConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Folder where all compilation happens (default: `build`)
    pub build_folder: Option<PathBuf>,

    /// Folder where packaged tarballs end up (default: `dist`)
    pub dist_folder: Option<PathBuf>,

    /// Default external module override (`all`, `none`, `+x,-y`, ...)
    pub modules: Option<String>,

    /// Install prefix, `{python_version}` is expanded
    pub prefix: Option<String>,

    /// Keep the static libpython in the distribution
    #[serde(rename = "static")]
    pub static_libpython: bool,

    /// Number of parallel `make` jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Default `<platform>-<arch>` target
    pub target: Option<String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Download timeout in seconds
    pub timeout: Option<u64>,

    /// Offline mode (don't fetch from network)
    pub offline: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.build_folder.is_some() {
            self.build.build_folder = other.build.build_folder;
        }
        if other.build.dist_folder.is_some() {
            self.build.dist_folder = other.build.dist_folder;
        }
        if other.build.modules.is_some() {
            self.build.modules = other.build.modules;
        }
        if other.build.prefix.is_some() {
            self.build.prefix = other.build.prefix;
        }
        if other.build.static_libpython {
            self.build.static_libpython = true;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.target.is_some() {
            self.build.target = other.build.target;
        }

        // Net settings
        if other.net.timeout.is_some() {
            self.net.timeout = other.net.timeout;
        }
        if other.net.offline {
            self.net.offline = true;
        }
    }

    pub fn build_folder(&self) -> PathBuf {
        self.build
            .build_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("build"))
    }

    pub fn dist_folder(&self) -> PathBuf {
        self.build
            .dist_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("dist"))
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (./portable-python.toml)
/// 2. Global config (<config dir>/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    // Load global config first
    if let Some(global_path) = global_path.filter(|p| p.exists()) {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.build.modules.is_none());
        assert!(!config.build.static_libpython);
        assert!(!config.net.offline);
        assert_eq!(config.build_folder(), PathBuf::from("build"));
        assert_eq!(config.dist_folder(), PathBuf::from("dist"));
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[build]
build-folder = "/tmp/pp-build"
modules = "+bdb,-tkinter"
prefix = "/apps/python{python_version}"
static = true
jobs = 8

[net]
offline = true
timeout = 30
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.build_folder(), PathBuf::from("/tmp/pp-build"));
        assert_eq!(config.build.modules.as_deref(), Some("+bdb,-tkinter"));
        assert_eq!(
            config.build.prefix.as_deref(),
            Some("/apps/python{python_version}")
        );
        assert!(config.build.static_libpython);
        assert_eq!(config.build.jobs, Some(8));
        assert!(config.net.offline);
        assert_eq!(config.net.timeout, Some(30));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.build.modules = Some("all".to_string());
        base.build.jobs = Some(4);

        let mut override_cfg = Config::default();
        override_cfg.build.modules = Some("none".to_string());

        base.merge(override_cfg);

        assert_eq!(base.build.modules.as_deref(), Some("none"));
        assert_eq!(base.build.jobs, Some(4)); // Not overridden
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join(PROJECT_CONFIG_FILE);

        std::fs::write(
            &global_path,
            r#"
[build]
dist-folder = "/srv/dist"
modules = "all"
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[build]
modules = "-tkinter"
"#,
        )
        .unwrap();

        let config = load_config(Some(&global_path), &project_path);

        assert_eq!(config.build.modules.as_deref(), Some("-tkinter"));
        assert_eq!(config.dist_folder(), PathBuf::from("/srv/dist"));
    }

    #[test]
    fn test_load_config_invalid_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let project_path = tmp.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&project_path, "[build\nmodules = ").unwrap();

        let config = load_config(None, &project_path);
        assert!(config.build.modules.is_none());
    }
}
