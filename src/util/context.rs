//! Global context for portable-python operations.
//!
//! Provides centralized access to configuration, paths, and run-wide flags.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::util::config::{load_config, Config, PROJECT_CONFIG_FILE};

/// Project directories for portable-python
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "portable-python", "portable-python"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Folder holding the user-wide config.toml, if the platform has one
    config_dir: Option<PathBuf>,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,

    /// Whether side effects are only logged, never performed
    dryrun: bool,

    /// Merged configuration
    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let config_dir = PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.config_dir().to_path_buf());

        let mut ctx = GlobalContext {
            cwd,
            config_dir,
            verbose: false,
            color: true,
            dryrun: false,
            config: Config::default(),
        };
        ctx.config = load_config(ctx.global_config_path().as_deref(), &ctx.project_config_path());
        Ok(ctx)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color mode.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn set_dryrun(&mut self, dryrun: bool) {
        self.dryrun = dryrun;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Path of the user-wide config file.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|dir| dir.join("config.toml"))
    }

    /// Path of the config file for the current directory.
    pub fn project_config_path(&self) -> PathBuf {
        self.cwd.join(PROJECT_CONFIG_FILE)
    }

    /// Make `path` absolute relative to the current directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }

    pub fn is_dryrun(&self) -> bool {
        self.dryrun
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();

        assert_eq!(ctx.cwd(), tmp.path());
        assert_eq!(
            ctx.project_config_path(),
            tmp.path().join("portable-python.toml")
        );
        assert_eq!(ctx.resolve(Path::new("build")), tmp.path().join("build"));
        assert_eq!(ctx.resolve(Path::new("/opt/build")), PathBuf::from("/opt/build"));
    }

    #[test]
    fn test_context_reads_project_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("portable-python.toml"),
            "[build]\nmodules = \"none\"\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();
        assert_eq!(ctx.config().build.modules.as_deref(), Some("none"));
        assert!(!ctx.is_dryrun());
    }
}
