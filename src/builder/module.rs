//! Module descriptors.
//!
//! Each buildable module (an external C library, or the python interpreter
//! itself) is a static [`ModuleSpec`]. Shared behavior lives in
//! [`ModuleSpec::DEFAULT`] and in free functions; a recipe only fills in the
//! fields it customizes.

use std::fmt;

use anyhow::Result;

use crate::builder::compile::ModuleBuild;
use crate::builder::telltale::HostProbe;
use crate::core::errors::BuildError;
use crate::core::target::{Platform, TargetSystem};

/// Contributes the values of one environment variable.
pub type EnvProducer = fn(&ModuleBuild<'_>) -> Vec<String>;

/// One step of a module's lifecycle (prepare, compile, finalize).
pub type StepFn = fn(&ModuleBuild<'_>) -> Result<()>;

/// Decides whether a module should be built on the target.
pub type AutoUseFn = fn(&DetectContext<'_>) -> Detection;

/// How a module's presence on the host is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telltale {
    /// No telltale declared: always built along with its parent.
    Undeclared,
    /// Explicitly empty: only built when asked for.
    OnDemand,
    /// Glob-like patterns, optionally led by `+<platform>` / `-<platform>` gates.
    Patterns(&'static [&'static str]),
}

/// Outcome of auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Auto-selected.
    Use,
    /// Not auto-selected, can still be requested.
    Skip,
    /// Can't be built on this target, never selected.
    Unsupported,
}

/// Auto-detection decision along with a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub decision: Decision,
    pub reason: String,
}

impl Detection {
    pub fn new(decision: Decision, reason: impl Into<String>) -> Self {
        Detection {
            decision,
            reason: reason.into(),
        }
    }

    pub fn needed(reason: impl Into<String>) -> Self {
        Self::new(Decision::Use, reason)
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::new(Decision::Skip, reason)
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::new(Decision::Unsupported, reason)
    }

    pub fn is_supported(&self) -> bool {
        self.decision != Decision::Unsupported
    }
}

/// What auto-detection gets to look at.
pub struct DetectContext<'a> {
    pub spec: &'static ModuleSpec,
    pub target: &'a TargetSystem,
    pub probe: &'a dyn HostProbe,
    /// `name:version` of the parent module, if any.
    pub parent: Option<&'a str>,
}

/// Static descriptor of a buildable module.
pub struct ModuleSpec {
    pub name: &'static str,

    /// Version to build; `None` inherits the parent's.
    pub version: Option<&'static str>,

    /// Source tarball url, `{version}` is expanded. Modules without one only
    /// drive the compilation of their sub-modules.
    pub url: Option<&'static str>,

    pub telltale: Telltale,

    /// Debian dev package whose presence still calls for a static build on linux.
    pub debian: Option<&'static str>,

    /// Folder, relative to the unpacked source, to run configure/make from.
    pub build_cwd: Option<&'static str>,

    /// Sub-folder of `deps/include` to add to the parent's CPATH.
    pub include_subdir: Option<&'static str>,

    /// Candidate sub-modules, in declaration order.
    pub candidates: &'static [&'static ModuleSpec],

    /// Custom auto-detection; `None` applies the default telltale policy.
    pub auto_use: Option<AutoUseFn>,

    /// Extra env vars, merged over the defaults (same name overrides).
    pub env: &'static [(&'static str, EnvProducer)],

    pub prepare: Option<StepFn>,
    pub linux_compile: Option<StepFn>,
    /// Defaults to `linux_compile` when not set.
    pub darwin_compile: Option<StepFn>,
    pub finalize: Option<StepFn>,
}

impl ModuleSpec {
    pub const DEFAULT: ModuleSpec = ModuleSpec {
        name: "",
        version: None,
        url: None,
        telltale: Telltale::Undeclared,
        debian: None,
        build_cwd: None,
        include_subdir: None,
        candidates: &[],
        auto_use: None,
        env: &[],
        prepare: None,
        linux_compile: None,
        darwin_compile: None,
        finalize: None,
    };

    /// Compile step to run on `platform`.
    ///
    /// `Ok(None)` means there is nothing to compile (pure grouping module).
    pub fn compile_for(&self, platform: &Platform) -> Result<Option<StepFn>, BuildError> {
        match platform {
            Platform::Linux => Ok(self.linux_compile),
            Platform::Darwin => Ok(self.darwin_compile.or(self.linux_compile)),
            Platform::Other(name) => Err(BuildError::UnsupportedPlatform {
                platform: name.clone(),
            }),
        }
    }

    /// Source url with `{version}` expanded.
    pub fn url_for(&self, version: &str) -> Option<String> {
        self.url.map(|url| url.replace("{version}", version))
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("telltale", &self.telltale)
            .finish_non_exhaustive()
    }
}
