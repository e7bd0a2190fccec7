//! Side-effect executor.
//!
//! Every mutation a build performs (spawning a tool, downloading, touching
//! the filesystem) goes through an [`Effects`] implementation. The real one
//! performs it; the dry-run one logs `Would ...` and records the action.
//! Read-only probes (existence checks, listing a folder) are not effects and
//! always look at the real filesystem.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::errors::BuildError;
use crate::sources::archive;
use crate::sources::download::Downloader;
use crate::util::fs as pfs;
use crate::util::hash;
use crate::util::process::ProcessBuilder;

/// Exit code and combined output of a spawned tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A side effect, as recorded by [`DryRunEffects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run { command: String, cwd: Option<PathBuf> },
    Download { url: String, dest: PathBuf },
    Decompress { archive: PathBuf, dest: PathBuf },
    EnsureDir { path: PathBuf, clean: bool },
    Touch(PathBuf),
    Delete(PathBuf),
    Move { from: PathBuf, to: PathBuf },
    Symlink { target: PathBuf, link: PathBuf },
    Chmod { path: PathBuf, mode: u32 },
    Write { path: PathBuf },
    Package { folder: PathBuf, tarball: PathBuf },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Run { command, .. } => write!(f, "run: {}", command),
            Action::Download { url, dest } => write!(f, "download {} -> {}", url, dest.display()),
            Action::Decompress { archive, dest } => {
                write!(f, "untar {} -> {}", archive.display(), dest.display())
            }
            Action::EnsureDir { path, clean: true } => write!(f, "clean folder {}", path.display()),
            Action::EnsureDir { path, clean: false } => {
                write!(f, "create folder {}", path.display())
            }
            Action::Touch(path) => write!(f, "touch {}", path.display()),
            Action::Delete(path) => write!(f, "delete {}", path.display()),
            Action::Move { from, to } => write!(f, "move {} -> {}", from.display(), to.display()),
            Action::Symlink { target, link } => {
                write!(f, "symlink {} <- {}", target.display(), link.display())
            }
            Action::Chmod { path, mode } => write!(f, "chmod {:o} {}", mode, path.display()),
            Action::Write { path } => write!(f, "write {}", path.display()),
            Action::Package { folder, tarball } => {
                write!(f, "tar {} -> {}", folder.display(), tarball.display())
            }
        }
    }
}

/// Capability to perform the side effects of a build.
pub trait Effects {
    /// Whether effects are only simulated.
    fn is_dryrun(&self) -> bool;

    /// Run a build tool, appending its output to `log` when given.
    ///
    /// A non-zero exit is a [`BuildError::ToolFailure`].
    fn run(&self, command: &ProcessBuilder, log: Option<&Path>) -> Result<RunOutput>;

    /// Run a read-only inspection tool and capture its output, whatever its exit code.
    fn capture(&self, command: &ProcessBuilder) -> Result<RunOutput>;

    fn download(&self, url: &str, dest: &Path) -> Result<()>;
    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()>;
    fn ensure_dir(&self, path: &Path, clean: bool) -> Result<()>;
    fn touch(&self, path: &Path) -> Result<()>;
    fn delete(&self, path: &Path) -> Result<()>;
    fn move_path(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create `link` pointing at `target` (replacing `link` if present).
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn chmod(&self, path: &Path, mode: u32) -> Result<()>;
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Tar+gzip `folder` into `tarball`, with a `.sha256` sidecar.
    fn package(&self, folder: &Path, tarball: &Path) -> Result<()>;
}

/// Capture a read-only tool's output; shared by both executors.
fn capture_output(command: &ProcessBuilder) -> Result<RunOutput> {
    let output = command.exec()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(RunOutput {
        code: output.status.code(),
        output: text,
    })
}

/// Performs every effect for real.
#[derive(Debug)]
pub struct RealEffects {
    downloader: Downloader,
}

impl RealEffects {
    pub fn new(downloader: Downloader) -> Self {
        RealEffects { downloader }
    }
}

impl Effects for RealEffects {
    fn is_dryrun(&self) -> bool {
        false
    }

    fn run(&self, command: &ProcessBuilder, log: Option<&Path>) -> Result<RunOutput> {
        tracing::debug!("Running: {}", command.display_command());
        let result = match log {
            Some(log) => {
                let status = command.exec_logged(log)?;
                RunOutput {
                    code: status.code(),
                    output: String::new(),
                }
            }
            None => capture_output(command)?,
        };

        if !result.success() {
            return Err(BuildError::ToolFailure {
                command: command.display_command(),
                code: result.code,
                log: log.map(Path::to_path_buf),
            }
            .into());
        }
        Ok(result)
    }

    fn capture(&self, command: &ProcessBuilder) -> Result<RunOutput> {
        capture_output(command)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloader.fetch(url, dest)
    }

    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()> {
        tracing::debug!("Untar {} -> {}", archive.display(), dest.display());
        archive::decompress(archive, dest)
    }

    fn ensure_dir(&self, path: &Path, clean: bool) -> Result<()> {
        pfs::ensure_dir(path, clean)
    }

    fn touch(&self, path: &Path) -> Result<()> {
        pfs::touch(path)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        tracing::debug!("Deleting {}", path.display());
        pfs::remove_if_exists(path)
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        pfs::move_path(from, to)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        pfs::remove_if_exists(link)?;
        pfs::symlink(target, link).with_context(|| {
            format!(
                "failed to symlink {} -> {}",
                link.display(),
                target.display()
            )
        })
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        pfs::chmod(path, mode)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        pfs::write_string(path, contents)
    }

    fn package(&self, folder: &Path, tarball: &Path) -> Result<()> {
        archive::package(folder, tarball)?;
        let digest = hash::write_sidecar(tarball)?;
        tracing::debug!("{}  {}", digest, tarball.display());
        Ok(())
    }
}

/// Performs nothing; logs what would happen and records it.
#[derive(Debug, Default)]
pub struct DryRunEffects {
    actions: RefCell<Vec<Action>>,
}

impl DryRunEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions recorded so far, in order.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.borrow().clone()
    }

    fn record(&self, action: Action) -> Result<()> {
        tracing::info!("Would {}", action);
        self.actions.borrow_mut().push(action);
        Ok(())
    }
}

impl Effects for DryRunEffects {
    fn is_dryrun(&self) -> bool {
        true
    }

    fn run(&self, command: &ProcessBuilder, _log: Option<&Path>) -> Result<RunOutput> {
        self.record(Action::Run {
            command: command.display_command(),
            cwd: command.get_cwd().map(Path::to_path_buf),
        })?;
        Ok(RunOutput {
            code: Some(0),
            output: String::new(),
        })
    }

    fn capture(&self, command: &ProcessBuilder) -> Result<RunOutput> {
        capture_output(command)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.record(Action::Download {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        })
    }

    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.record(Action::Decompress {
            archive: archive.to_path_buf(),
            dest: dest.to_path_buf(),
        })
    }

    fn ensure_dir(&self, path: &Path, clean: bool) -> Result<()> {
        self.record(Action::EnsureDir {
            path: path.to_path_buf(),
            clean,
        })
    }

    fn touch(&self, path: &Path) -> Result<()> {
        self.record(Action::Touch(path.to_path_buf()))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.record(Action::Delete(path.to_path_buf()))
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        self.record(Action::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.record(Action::Symlink {
            target: target.to_path_buf(),
            link: link.to_path_buf(),
        })
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.record(Action::Chmod {
            path: path.to_path_buf(),
            mode,
        })
    }

    fn write(&self, path: &Path, _contents: &str) -> Result<()> {
        self.record(Action::Write {
            path: path.to_path_buf(),
        })
    }

    fn package(&self, folder: &Path, tarball: &Path) -> Result<()> {
        self.record(Action::Package {
            folder: folder.to_path_buf(),
            tarball: tarball.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::util::shell::Shell;

    fn real() -> RealEffects {
        RealEffects::new(Downloader::new(Arc::new(Shell::default())).offline(true))
    }

    #[test]
    fn test_dryrun_records_without_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let effects = DryRunEffects::new();
        let folder = tmp.path().join("deps");

        effects.ensure_dir(&folder, true).unwrap();
        effects
            .run(&ProcessBuilder::new("make").arg("install"), None)
            .unwrap();

        assert!(!folder.exists());
        assert_eq!(
            effects.actions(),
            vec![
                Action::EnsureDir {
                    path: folder,
                    clean: true
                },
                Action::Run {
                    command: "make install".to_string(),
                    cwd: None
                },
            ]
        );
    }

    #[test]
    fn test_action_display() {
        let action = Action::Package {
            folder: PathBuf::from("build/cpython-3.9.6/3.9.6"),
            tarball: PathBuf::from("dist/cpython-3.9.6-darwin-x86_64.tar.gz"),
        };
        assert_eq!(
            action.to_string(),
            "tar build/cpython-3.9.6/3.9.6 -> dist/cpython-3.9.6-darwin-x86_64.tar.gz"
        );
    }

    #[test]
    fn test_real_run_failure_is_tool_failure() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("01-zlib.log");

        let err = real()
            .run(&ProcessBuilder::new("false"), Some(&log))
            .unwrap_err();
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::ToolFailure { code, log: Some(path), .. }) => {
                assert_eq!(*code, Some(1));
                assert_eq!(path, &log);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(log.exists());
    }

    #[test]
    fn test_real_symlink_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("python");
        std::fs::write(&link, "stale").unwrap();

        real().symlink(Path::new("python3.9"), &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("python3.9"));
    }

    #[test]
    fn test_capture_reports_exit_code() {
        let out = DryRunEffects::new()
            .capture(&ProcessBuilder::new("sh").args(["-c", "echo out; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert!(out.output.contains("out"));
    }
}
