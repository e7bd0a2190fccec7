//! Implementation of `portable-python build`.
//!
//! Compiles the selected external modules first, then python itself, and
//! finally checks that the compiled extensions don't depend on anything
//! outside of the platform's base libraries.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;

use crate::builder::context::{BuildContext, BuildLayout, BuildOptions};
use crate::builder::cpython;
use crate::builder::telltale::HostProbe;
use crate::builder::tree::ModuleTree;
use crate::builder::{root_module, Compiler};
use crate::core::errors::BuildError;
use crate::core::target::TargetSystem;
use crate::core::version::PythonSpec;
use crate::ops::inspect::PythonInspector;
use crate::util::effects::Effects;
use crate::util::shell::{format_duration, plural, Shell, Status};

/// What to build, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// `family:version`, or just a version
    pub python_spec: String,

    /// Base build folder, must be absolute
    pub build_folder: PathBuf,

    /// Where to put the packaged tarball, must be absolute
    pub dist_folder: PathBuf,

    /// Sub-module override (`all`, `none`, `+x,-y`, ...)
    pub modules: Option<String>,

    /// Install prefix, `{python_version}` is expanded
    pub prefix: Option<String>,

    pub static_libpython: bool,

    /// `<platform>-<arch>`, host by default
    pub target: Option<String>,

    /// Parallel `make` jobs
    pub jobs: Option<usize>,

    /// Reuse already unpacked sources, finalize only
    pub x_debug: bool,
}

/// A validated build: python spec, folder layout and resolved module tree.
///
/// Construction performs every input check; nothing touches the disk or the
/// network until [`BuildSetup::compile`].
#[derive(Debug)]
pub struct BuildSetup {
    ctx: BuildContext,
    tree: ModuleTree,
}

impl BuildSetup {
    pub fn new(request: &BuildRequest, probe: &dyn HostProbe) -> Result<Self, BuildError> {
        let python = PythonSpec::parse(&request.python_spec)?;
        if request.build_folder.to_string_lossy().contains(' ') {
            return Err(BuildError::PathWithSpace {
                path: request.build_folder.clone(),
            });
        }
        let target = TargetSystem::parse(request.target.as_deref())?;
        let tree = ModuleTree::build(
            root_module(python.family),
            &python.version.to_string(),
            &target,
            probe,
            request.modules.as_deref(),
        )?;

        let layout = BuildLayout::new(&request.build_folder, &request.dist_folder, &python);
        let options = BuildOptions {
            static_libpython: request.static_libpython,
            prefix: request.prefix.clone(),
            x_debug: request.x_debug,
            jobs: request.jobs,
        };
        Ok(BuildSetup {
            ctx: BuildContext::new(target, python, layout, options),
            tree,
        })
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    /// Folder the compiled python gets installed in.
    pub fn install_folder(&self) -> PathBuf {
        cpython::install_folder(&self.ctx.layout, &self.ctx.options, &self.ctx.python)
    }

    pub fn tarball_path(&self) -> PathBuf {
        cpython::tarball_path(&self.ctx.layout, &self.ctx.python, &self.ctx.target)
    }

    /// `[auto-detected: 2 modules] -> zlib:1.2.11, cpython:3.9.6`
    pub fn selection_summary(&self) -> String {
        let root = self.tree.root();
        let mut summary = format!("[{}]", self.tree.node(root).modules);
        let labels: Vec<String> = self
            .tree
            .selected_descendants(root)
            .into_iter()
            .map(|id| self.tree.label(id))
            .collect();
        if !labels.is_empty() {
            summary.push_str(" -> ");
            summary.push_str(&labels.join(", "));
        }
        summary
    }

    /// Compile the whole module tree, then inspect the result.
    ///
    /// A build whose extensions are not portable fails with
    /// [`BuildError::ValidationFailure`], except in dry-run mode.
    pub fn compile(&self, effects: &dyn Effects, shell: &Shell) -> Result<Option<PythonInspector>> {
        let started = Instant::now();
        let root = self.tree.root();

        tracing::info!("Modules selected: {}", self.selection_summary());
        effects.ensure_dir(&self.ctx.layout.build_folder, !self.ctx.options.x_debug)?;

        let external = self.tree.selected_descendants(root).len();
        tracing::info!("Compiling {}", plural(external, "external module"));
        Compiler::new(&self.ctx, &self.tree, effects, shell).compile_all()?;

        let inspector = self.validate(effects, shell)?;

        let tarball = self.tarball_path();
        if tarball.is_file() {
            shell.status(Status::Packaged, tarball.display());
        }

        shell.status(
            Status::Finished,
            format!(
                "{} in {}",
                self.tree.label(root),
                format_duration(started.elapsed())
            ),
        );
        Ok(inspector)
    }

    /// Inspect the installed python, if any, and check its extensions.
    ///
    /// Fails with [`BuildError::ValidationFailure`] when no extension could be
    /// inspected or any of them is problematic. Dry-run only warns.
    pub fn validate(&self, effects: &dyn Effects, shell: &Shell) -> Result<Option<PythonInspector>> {
        let install = self.install_folder();
        if !install.is_dir() {
            return Ok(None);
        }

        shell.status(Status::Inspecting, install.display());
        let inspected = PythonInspector::inspect(&install.display().to_string(), None, effects)?;
        println!("{}", inspected.report(Some(false)));
        if !inspected.is_valid() {
            let summary = match &inspected.full_so_report {
                Some(report) => report.to_string(),
                None => "no .so files found".to_string(),
            };
            if !effects.is_dryrun() {
                return Err(BuildError::ValidationFailure { summary }.into());
            }
            shell.warn(format!("Build failed: {}", summary));
        }
        Ok(Some(inspected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::telltale::FakeProbe;
    use crate::sources::Downloader;
    use crate::util::effects::{Action, DryRunEffects, RealEffects};
    use tempfile::TempDir;

    fn request(base: &std::path::Path, spec: &str, target: &str, modules: &str) -> BuildRequest {
        BuildRequest {
            python_spec: spec.to_string(),
            build_folder: base.join("build"),
            dist_folder: base.join("dist"),
            modules: Some(modules.to_string()),
            target: Some(target.to_string()),
            jobs: Some(2),
            ..BuildRequest::default()
        }
    }

    fn input_error(request: &BuildRequest) -> String {
        BuildSetup::new(request, &FakeProbe::default())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_input_errors() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();

        assert_eq!(
            input_error(&request(base, "foo", "linux-x86_64", "none")),
            "Invalid python spec: foo"
        );
        assert_eq!(
            input_error(&request(base, "2.7.1", "linux-x86_64", "none")),
            "cpython:2.7.1 is not in the supported list"
        );
        assert_eq!(
            input_error(&request(base, "conda:1.0", "linux-x86_64", "none")),
            "Python family 'conda' is not yet supported"
        );
        assert_eq!(
            input_error(&request(base, "3.9.6", "linux-x86_64", "foo,bar")),
            "Unknown modules: foo, bar"
        );

        let mut spaced = request(base, "3.9.6", "linux-x86_64", "none");
        spaced.build_folder = base.join("foo bar");
        assert!(input_error(&spaced).starts_with("Refusing path with space"));

        // Nothing created by failed setups
        assert!(!base.join("build").exists());
    }

    #[test]
    fn test_layout() {
        let tmp = TempDir::new().unwrap();
        let mut req = request(tmp.path(), "3.9.6", "linux-x86_64", "none");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        let build_folder = tmp.path().join("build/cpython-3.9.6");
        assert_eq!(setup.install_folder(), build_folder.join("3.9.6"));
        assert_eq!(
            setup.tarball_path(),
            tmp.path().join("dist/cpython-3.9.6-linux-x86_64.tar.gz")
        );
        assert_eq!(setup.selection_summary(), "[none]");

        req.prefix = Some("/apps/python{python_version}".to_string());
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        assert_eq!(
            setup.install_folder(),
            build_folder.join("root/apps/python3.9.6")
        );
    }

    #[test]
    fn test_dryrun_compile() {
        let tmp = TempDir::new().unwrap();
        let req = request(tmp.path(), "3.9.6", "darwin-x86_64", "zlib");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        assert_eq!(
            setup.selection_summary(),
            "[zlib] -> zlib:1.2.11"
        );

        let effects = DryRunEffects::new();
        let inspector = setup.compile(&effects, &Shell::default()).unwrap();
        assert!(inspector.is_none());

        let actions = effects.actions();
        assert_eq!(
            actions[0],
            Action::EnsureDir {
                path: tmp.path().join("build/cpython-3.9.6"),
                clean: true,
            }
        );
        assert!(actions.contains(&Action::Run {
            command: format!(
                "make install DESTDIR={}",
                tmp.path().join("build/cpython-3.9.6").display()
            ),
            cwd: Some(tmp.path().join("build/cpython-3.9.6/build/cpython")),
        }));
        assert_eq!(
            actions.last().unwrap(),
            &Action::Package {
                folder: setup.install_folder(),
                tarball: setup.tarball_path(),
            }
        );
        // Dry-run leaves the disk alone
        assert!(!tmp.path().join("build").exists());
    }

    /// Fake installed python whose inspection reports `so_dir` as its
    /// extension folder.
    #[cfg(unix)]
    fn install_fake_python(setup: &BuildSetup, so_dir: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;

        let bin = setup.install_folder().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let python = bin.join("python");
        std::fs::write(
            &python,
            format!(
                "#!/bin/sh\necho '{{\"report\": [], \"so\": \"{}\"}}'\n",
                so_dir.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn real_effects() -> RealEffects {
        let shell = std::sync::Arc::new(Shell::default());
        RealEffects::new(Downloader::new(shell).offline(true))
    }

    fn assert_validation_failure(result: Result<Option<PythonInspector>>, expected: &str) {
        let err = result.unwrap_err();
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::ValidationFailure { summary }) => {
                assert!(summary.contains(expected), "{}", summary)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_failed_extension() {
        let tmp = TempDir::new().unwrap();
        let req = request(tmp.path(), "3.9.6", "linux-x86_64", "none");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        let so_dir = setup.install_folder().join("lib/python3.9/lib-dynload");
        std::fs::create_dir_all(&so_dir).unwrap();
        std::fs::write(so_dir.join("_foo_failed.so"), "").unwrap();
        install_fake_python(&setup, &so_dir);

        let shell = Shell::default();
        assert_validation_failure(
            setup.validate(&real_effects(), &shell),
            "1 problematic, 0 OK",
        );

        // Dry-run only warns
        let inspector = setup.validate(&DryRunEffects::new(), &shell).unwrap().unwrap();
        assert!(!inspector.is_valid());
        assert_eq!(inspector.full_so_report.unwrap().problematic.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_empty_extension_folder() {
        let tmp = TempDir::new().unwrap();
        let req = request(tmp.path(), "3.9.6", "linux-x86_64", "none");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        let so_dir = setup.install_folder().join("lib/python3.9/lib-dynload");
        std::fs::create_dir_all(&so_dir).unwrap();
        install_fake_python(&setup, &so_dir);

        let shell = Shell::default();
        assert_validation_failure(setup.validate(&real_effects(), &shell), "0 problematic, 0 OK");
        assert!(setup.validate(&DryRunEffects::new(), &shell).unwrap().is_some());

        // No extension folder at all
        std::fs::remove_dir(&so_dir).unwrap();
        assert_validation_failure(setup.validate(&real_effects(), &shell), "no .so files found");
    }

    #[test]
    fn test_validate_without_install() {
        let tmp = TempDir::new().unwrap();
        let req = request(tmp.path(), "3.9.6", "linux-x86_64", "none");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        let inspector = setup.validate(&real_effects(), &Shell::default()).unwrap();
        assert!(inspector.is_none());
    }

    #[test]
    fn test_unsupported_platform() {
        let tmp = TempDir::new().unwrap();
        let req = request(tmp.path(), "3.9.6", "foo-bar", "none");
        let setup = BuildSetup::new(&req, &FakeProbe::default()).unwrap();
        let err = setup
            .compile(&DryRunEffects::new(), &Shell::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Compiling on platform 'foo' is not yet supported"
        );
    }
}
