//! Telltale detection: is a library already provided by the host?

use std::path::{Path, PathBuf};

use crate::builder::module::{DetectContext, Detection, Telltale};
use crate::core::target::TargetSystem;

/// Read-only view of the host used by auto-detection.
pub trait HostProbe {
    fn exists(&self, path: &Path) -> bool;

    /// First path matching a glob `pattern`.
    fn find(&self, pattern: &str) -> Option<PathBuf>;

    /// Location of `program` in PATH.
    fn which(&self, program: &str) -> Option<PathBuf>;
}

/// Probes the real filesystem and PATH.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealProbe;

impl HostProbe for RealProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn find(&self, pattern: &str) -> Option<PathBuf> {
        if !pattern.contains(['*', '?', '[']) {
            let path = PathBuf::from(pattern);
            return path.exists().then_some(path);
        }
        glob::glob(pattern).ok()?.filter_map(|p| p.ok()).next()
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        crate::util::process::find_executable(program)
    }
}

/// Expand `{include}`, `{arch}` and `{platform}` in a telltale pattern,
/// once per system include folder.
pub fn expand(pattern: &str, target: &TargetSystem) -> Vec<String> {
    let base = pattern
        .replace("{arch}", target.architecture())
        .replace("{platform}", target.platform().as_str());
    if !base.contains("{include}") {
        return vec![base];
    }
    target
        .sys_include()
        .iter()
        .map(|include| base.replace("{include}", &include.to_string_lossy()))
        .collect()
}

/// First existing path matching any of the (non-gate) `patterns`.
pub fn find_telltale(
    patterns: &[&str],
    target: &TargetSystem,
    probe: &dyn HostProbe,
) -> Option<PathBuf> {
    patterns
        .iter()
        .filter(|p| !is_gate(p))
        .flat_map(|p| expand(p, target))
        .find_map(|candidate| probe.find(&candidate))
}

fn is_gate(pattern: &str) -> bool {
    pattern.starts_with(['+', '-'])
}

/// Default auto-detection policy.
///
/// A library that the host already provides is skipped, unless the target
/// is linux and the module names a debian dev package: there the presence of
/// system headers is not enough, since the library must be linked statically.
pub fn default_auto_use(ctx: &DetectContext<'_>) -> Detection {
    let platform = ctx.target.platform().as_str();
    let mut patterns = match ctx.spec.telltale {
        Telltale::Undeclared => {
            return match ctx.parent {
                Some(parent) => Detection::needed(format!("sub-module of {}", parent)),
                None => Detection::needed("always built"),
            };
        }
        Telltale::OnDemand => return Detection::skip("on demand"),
        Telltale::Patterns(patterns) => patterns,
    };

    while let Some((first, rest)) = patterns.split_first() {
        if !is_gate(first) {
            break;
        }
        if first[1..] == *platform {
            return if first.starts_with('-') {
                Detection::skip(format!("on demand on {}", platform))
            } else {
                Detection::needed(format!("mandatory on {}", platform))
            };
        }
        patterns = rest;
    }

    if patterns.is_empty() {
        return Detection::skip("on demand");
    }

    let found = find_telltale(patterns, ctx.target, ctx.probe);
    if let (true, Some(debian)) = (ctx.target.is_linux(), ctx.spec.debian) {
        return match found {
            Some(_) => Detection::needed(format!(
                "needed on linux (on top of {}, for static compile)",
                debian
            )),
            None => Detection::needed(format!("needs {} for static compile", debian)),
        };
    }

    match found {
        Some(path) => Detection::skip(format!("skipped, has {}", path.display())),
        None => Detection::needed(format!("needed, no {}", patterns.join(", "))),
    }
}

/// Fake host for tests: a fixed set of existing paths and programs.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FakeProbe {
    pub paths: Vec<PathBuf>,
    pub programs: Vec<String>,
}

#[cfg(test)]
impl FakeProbe {
    pub fn with_paths(paths: &[&str]) -> Self {
        FakeProbe {
            paths: paths.iter().map(PathBuf::from).collect(),
            programs: Vec::new(),
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.push(program.to_string());
        self
    }
}

#[cfg(test)]
impl HostProbe for FakeProbe {
    fn exists(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path || p.starts_with(path))
    }

    fn find(&self, pattern: &str) -> Option<PathBuf> {
        let pattern = glob::Pattern::new(pattern).ok()?;
        self.paths
            .iter()
            .find(|p| pattern.matches_path(p))
            .cloned()
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        self.programs
            .iter()
            .any(|p| p == program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::module::{Decision, ModuleSpec};

    static XZ: ModuleSpec = ModuleSpec {
        name: "xz",
        telltale: Telltale::Patterns(&["{include}/lzma.h"]),
        ..ModuleSpec::DEFAULT
    };

    static GATED: ModuleSpec = ModuleSpec {
        name: "gated",
        telltale: Telltale::Patterns(&["-darwin", "+linux", "{include}/gated.h"]),
        ..ModuleSpec::DEFAULT
    };

    static FFI: ModuleSpec = ModuleSpec {
        name: "libffi",
        telltale: Telltale::Patterns(&["{include}/ffi.h", "{include}/ffi/ffi.h"]),
        debian: Some("libffi-dev"),
        ..ModuleSpec::DEFAULT
    };

    static ON_DEMAND: ModuleSpec = ModuleSpec {
        name: "bdb",
        telltale: Telltale::OnDemand,
        ..ModuleSpec::DEFAULT
    };

    static CHILD: ModuleSpec = ModuleSpec {
        name: "ncurses",
        ..ModuleSpec::DEFAULT
    };

    fn detect(
        spec: &'static ModuleSpec,
        target: &str,
        probe: &FakeProbe,
        parent: Option<&str>,
    ) -> Detection {
        let target = TargetSystem::parse(Some(target)).unwrap();
        default_auto_use(&DetectContext {
            spec,
            target: &target,
            probe,
            parent,
        })
    }

    #[test]
    fn test_expand_substitutes_every_include() {
        let target = TargetSystem::parse(Some("linux-x86_64")).unwrap();
        assert_eq!(
            expand("{include}/lzma.h", &target),
            vec![
                "/usr/include/lzma.h".to_string(),
                "/usr/include/x86_64-linux-gnu/lzma.h".to_string()
            ]
        );
        assert_eq!(
            expand("/usr/lib/{arch}-{platform}-gnu/libz.a", &target),
            vec!["/usr/lib/x86_64-linux-gnu/libz.a".to_string()]
        );
    }

    #[test]
    fn test_telltale_absent_means_needed() {
        let probe = FakeProbe::default();
        let d = detect(&XZ, "linux-x86_64", &probe, None);
        assert_eq!(d.decision, Decision::Use);
        assert_eq!(d.reason, "needed, no {include}/lzma.h");
    }

    #[test]
    fn test_telltale_present_means_skipped() {
        let probe = FakeProbe::with_paths(&["/usr/include/x86_64-linux-gnu/lzma.h"]);
        let d = detect(&XZ, "linux-x86_64", &probe, None);
        assert_eq!(d.decision, Decision::Skip);
        assert_eq!(d.reason, "skipped, has /usr/include/x86_64-linux-gnu/lzma.h");
    }

    #[test]
    fn test_platform_gates() {
        let probe = FakeProbe::default();
        let d = detect(&GATED, "darwin-x86_64", &probe, None);
        assert_eq!(d, Detection::skip("on demand on darwin"));

        let d = detect(&GATED, "linux-x86_64", &probe, None);
        assert_eq!(d, Detection::needed("mandatory on linux"));

        let d = detect(&GATED, "freebsd-x86_64", &probe, None);
        assert_eq!(d.decision, Decision::Use);
        assert!(d.reason.starts_with("needed, no"));
    }

    #[test]
    fn test_prefer_static_on_linux() {
        let probe = FakeProbe::with_paths(&["/usr/include/ffi.h"]);
        let d = detect(&FFI, "linux-x86_64", &probe, None);
        assert_eq!(d.decision, Decision::Use);
        assert!(d.reason.contains("on top of libffi-dev"));

        let d = detect(&FFI, "linux-x86_64", &FakeProbe::default(), None);
        assert_eq!(d, Detection::needed("needs libffi-dev for static compile"));
    }

    #[test]
    fn test_on_demand_and_undeclared() {
        let probe = FakeProbe::default();
        assert_eq!(
            detect(&ON_DEMAND, "linux-x86_64", &probe, None),
            Detection::skip("on demand")
        );
        assert_eq!(
            detect(&CHILD, "linux-x86_64", &probe, Some("readline:8.1")),
            Detection::needed("sub-module of readline:8.1")
        );
    }

    #[test]
    fn test_fake_probe_globs() {
        let probe = FakeProbe::with_paths(&["/usr/include/tk8.6/tk.h"]).with_program("tclsh");
        assert!(probe.find("/usr/include/tk*/tk.h").is_some());
        assert!(probe.exists(Path::new("/usr/include")));
        assert!(probe.which("tclsh").is_some());
        assert!(probe.which("otool").is_none());
    }
}
