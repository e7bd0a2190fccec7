//! Build context - target, python spec, folder layout and options.

use std::path::{Path, PathBuf};

use crate::core::target::TargetSystem;
use crate::core::version::PythonSpec;
use crate::sources::download;

/// On-disk layout of one build.
///
/// ```text
/// <build_base>/
///   downloads/                  shared tarball cache
///   cpython-3.9.6/              build_folder
///     build/<module>/           unpacked sources
///     deps/{bin,include,lib}    installed external modules
///     logs/NN-<module>.log
/// <dist_folder>/cpython-3.9.6-linux-x86_64.tar.gz
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub build_base: PathBuf,
    pub build_folder: PathBuf,
    pub deps: PathBuf,
    pub dist_folder: PathBuf,
    pub downloads: PathBuf,
}

impl BuildLayout {
    pub fn new(build_base: &Path, dist_folder: &Path, python: &PythonSpec) -> Self {
        let build_folder = build_base.join(python.canonical_folder());
        BuildLayout {
            build_base: build_base.to_path_buf(),
            deps: build_folder.join("deps"),
            build_folder,
            dist_folder: dist_folder.to_path_buf(),
            downloads: build_base.join("downloads"),
        }
    }

    pub fn deps_lib(&self) -> PathBuf {
        self.deps.join("lib")
    }

    pub fn logs(&self) -> PathBuf {
        self.build_folder.join("logs")
    }

    /// Where the sources of module `name` get unpacked.
    pub fn src_dir(&self, name: &str) -> PathBuf {
        self.build_folder.join("build").join(name)
    }

    /// Cache location of the tarball at `url`.
    pub fn download_path(&self, url: &str) -> Option<PathBuf> {
        download::basename(url).map(|name| self.downloads.join(name))
    }
}

/// User options affecting how modules get compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Keep `libpythonX.Y.a` in the final install.
    pub static_libpython: bool,
    /// Install prefix, `{python_version}` is expanded.
    pub prefix: Option<String>,
    /// Reuse already unpacked sources and only run finalization.
    pub x_debug: bool,
    /// `make -j` count; defaults to half the CPUs.
    pub jobs: Option<usize>,
}

/// Everything a module build needs to know besides its own descriptor.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub target: TargetSystem,
    pub python: PythonSpec,
    pub layout: BuildLayout,
    pub options: BuildOptions,
}

impl BuildContext {
    pub fn new(
        target: TargetSystem,
        python: PythonSpec,
        layout: BuildLayout,
        options: BuildOptions,
    ) -> Self {
        BuildContext {
            target,
            python,
            layout,
            options,
        }
    }

    /// Job count to pass to `make`, if any.
    pub fn make_jobs(&self) -> Option<usize> {
        self.options
            .jobs
            .or_else(crate::util::process::default_make_jobs)
            .filter(|jobs| *jobs > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let python = PythonSpec::parse("cpython:3.9.6").unwrap();
        let layout = BuildLayout::new(Path::new("/tmp/build"), Path::new("/tmp/dist"), &python);

        assert_eq!(layout.build_folder, PathBuf::from("/tmp/build/cpython-3.9.6"));
        assert_eq!(layout.deps_lib(), PathBuf::from("/tmp/build/cpython-3.9.6/deps/lib"));
        assert_eq!(layout.logs(), PathBuf::from("/tmp/build/cpython-3.9.6/logs"));
        assert_eq!(
            layout.src_dir("zlib"),
            PathBuf::from("/tmp/build/cpython-3.9.6/build/zlib")
        );
        assert_eq!(
            layout.download_path("https://zlib.net/zlib-1.2.11.tar.gz"),
            Some(PathBuf::from("/tmp/build/downloads/zlib-1.2.11.tar.gz"))
        );
    }

    #[test]
    fn test_explicit_jobs_win() {
        let python = PythonSpec::parse("3.9.6").unwrap();
        let layout = BuildLayout::new(Path::new("build"), Path::new("dist"), &python);
        let mut ctx = BuildContext::new(
            TargetSystem::parse(Some("linux-x86_64")).unwrap(),
            python,
            layout,
            BuildOptions::default(),
        );
        ctx.options.jobs = Some(3);
        assert_eq!(ctx.make_jobs(), Some(3));

        ctx.options.jobs = Some(0);
        assert_eq!(ctx.make_jobs(), None);
    }
}
