//! Per-module compile lifecycle.
//!
//! Modules are compiled one at a time, sub-modules first:
//! fetch, env setup, prepare, compile, finalize. Each module gets its own
//! log file under `logs/`, numbered in compile order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::builder::context::{BuildContext, BuildLayout, BuildOptions};
use crate::builder::env;
use crate::builder::module::ModuleSpec;
use crate::builder::tree::{ModuleId, ModuleTree};
use crate::core::target::TargetSystem;
use crate::core::version::PythonSpec;
use crate::util::effects::Effects;
use crate::util::fs as pfs;
use crate::util::process::ProcessBuilder;
use crate::util::shell::{format_duration, Shell, Status};

/// View of one module while it is being compiled.
///
/// This is what recipe steps and env producers get to work with.
pub struct ModuleBuild<'a> {
    ctx: &'a BuildContext,
    tree: &'a ModuleTree,
    id: ModuleId,
    effects: &'a dyn Effects,
    env: &'a BTreeMap<String, String>,
    log: Option<PathBuf>,
}

impl<'a> ModuleBuild<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        tree: &'a ModuleTree,
        id: ModuleId,
        effects: &'a dyn Effects,
        env: &'a BTreeMap<String, String>,
        log: Option<PathBuf>,
    ) -> Self {
        ModuleBuild {
            ctx,
            tree,
            id,
            effects,
            env,
            log,
        }
    }

    pub fn name(&self) -> &'static str {
        self.tree.name(self.id)
    }

    pub fn spec(&self) -> &'static ModuleSpec {
        self.tree.node(self.id).spec
    }

    pub fn version(&self) -> &str {
        &self.tree.node(self.id).version
    }

    pub fn target(&self) -> &TargetSystem {
        &self.ctx.target
    }

    pub fn python(&self) -> &PythonSpec {
        &self.ctx.python
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.ctx.layout
    }

    pub fn options(&self) -> &BuildOptions {
        &self.ctx.options
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects
    }

    pub fn is_dryrun(&self) -> bool {
        self.effects.is_dryrun()
    }

    /// Folder where all external modules get installed.
    pub fn deps(&self) -> &Path {
        &self.ctx.layout.deps
    }

    pub fn deps_lib(&self) -> PathBuf {
        self.ctx.layout.deps_lib()
    }

    /// Unpacked sources of this module.
    pub fn src_dir(&self) -> PathBuf {
        self.ctx.layout.src_dir(self.name())
    }

    /// Folder configure/make run from.
    pub fn work_dir(&self) -> PathBuf {
        let src = self.src_dir();
        match self.spec().build_cwd {
            Some(cwd) => src.join(cwd),
            None => src,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_deref()
    }

    pub fn has_selected_children(&self) -> bool {
        !self.tree.node(self.id).modules.selected().is_empty()
    }

    /// Whether direct sub-module `name` is selected.
    pub fn has_selected_child(&self, name: &str) -> bool {
        self.tree.find_selected(self.id, name).is_some()
    }

    /// Selected descendants, in compile order.
    pub fn selected_descendants(&self) -> impl Iterator<Item = &'static ModuleSpec> + '_ {
        self.tree
            .selected_descendants(self.id)
            .into_iter()
            .map(|id| self.tree.node(id).spec)
    }

    /// Run `program` (may contain arguments, as in `"/bin/sh configure"`)
    /// from the work folder, with the accumulated build env.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let command = ProcessBuilder::from_command_line(program)
            .with_context(|| format!("empty command for module {}", self.name()))?
            .args(args)
            .cwd(self.work_dir())
            .envs(self.env.iter());
        self.effects.run(&command, self.log.as_deref())?;
        Ok(())
    }

    /// Run a configure script with `--prefix=<deps>`.
    pub fn run_configure(&self, program: &str, args: &[&str]) -> Result<()> {
        let prefix = self.deps().display().to_string();
        self.run_configure_with_prefix(program, Some(&prefix), args)
    }

    /// Run a configure script with a custom `--prefix`, or none.
    pub fn run_configure_with_prefix(
        &self,
        program: &str,
        prefix: Option<&str>,
        args: &[&str],
    ) -> Result<()> {
        let prefix = prefix.map(|p| format!("--prefix={}", p));
        let mut all: Vec<&str> = Vec::with_capacity(args.len() + 1);
        if let Some(prefix) = &prefix {
            all.push(prefix);
        }
        all.extend(args.iter().copied().filter(|a| !a.is_empty()));
        self.run(program, &all)
    }

    /// Run `make`, with a `-j` flag when parallel jobs are configured.
    pub fn run_make(&self, args: &[&str]) -> Result<()> {
        let jobs = self.ctx.make_jobs().map(|j| format!("-j{}", j));
        let mut all: Vec<&str> = Vec::with_capacity(args.len() + 1);
        if let Some(jobs) = &jobs {
            all.push(jobs);
        }
        all.extend_from_slice(args);
        self.run("make", &all)
    }
}

/// Drives the compilation of a module tree.
pub struct Compiler<'a> {
    ctx: &'a BuildContext,
    tree: &'a ModuleTree,
    effects: &'a dyn Effects,
    shell: &'a Shell,
    env: BTreeMap<String, String>,
    log_counter: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        tree: &'a ModuleTree,
        effects: &'a dyn Effects,
        shell: &'a Shell,
    ) -> Self {
        Compiler {
            ctx,
            tree,
            effects,
            shell,
            env: BTreeMap::new(),
            log_counter: 0,
        }
    }

    /// Env vars set so far. Values persist from one module to the next,
    /// a later module setting the same variable replaces it.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Compile the whole selected tree, sub-modules first.
    pub fn compile_all(&mut self) -> Result<()> {
        for id in self.tree.post_order(self.tree.root()) {
            self.compile_module(id)?;
        }
        Ok(())
    }

    fn module_build(&self, id: ModuleId, log: &Path) -> ModuleBuild<'_> {
        ModuleBuild::new(
            self.ctx,
            self.tree,
            id,
            self.effects,
            &self.env,
            Some(log.to_path_buf()),
        )
    }

    fn compile_module(&mut self, id: ModuleId) -> Result<()> {
        let started = Instant::now();
        let node = self.tree.node(id);
        let spec = node.spec;
        let layout = &self.ctx.layout;

        self.shell.status(Status::Compiling, self.tree.label(id));

        self.log_counter += 1;
        let log = layout
            .logs()
            .join(format!("{:02}-{}.log", self.log_counter, spec.name));
        if !self.effects.is_dryrun() {
            self.effects.touch(&log)?;
        }

        let src_dir = layout.src_dir(spec.name);
        if self.ctx.options.x_debug && src_dir.is_dir() {
            tracing::info!("Reusing {}, finalizing only", src_dir.display());
            if let Some(finalize) = spec.finalize {
                finalize(&self.module_build(id, &log))?;
            }
            return Ok(());
        }

        let compile = spec.compile_for(self.ctx.target.platform())?;

        if let Some(url) = spec.url_for(&node.version) {
            let archive = layout
                .download_path(&url)
                .with_context(|| format!("can't determine file name of {}", url))?;
            if !archive.exists() {
                self.effects.download(&url, &archive)?;
            }
            self.effects.decompress(&archive, &src_dir)?;
        }

        let vars = env::compose(&self.module_build(id, &log));
        for (name, value) in vars {
            let line = format!("env {}={}", name, value);
            tracing::info!("{}", line);
            if !self.effects.is_dryrun() {
                pfs::append_line(&log, &line)?;
            }
            self.env.insert(name, value);
        }

        let build = self.module_build(id, &log);
        if let Some(prepare) = spec.prepare {
            prepare(&build)?;
        }
        if let Some(compile) = compile {
            compile(&build)?;
        }
        if let Some(finalize) = spec.finalize {
            finalize(&build)?;
        }

        tracing::info!(
            "Compiled {} in {}",
            spec.name,
            format_duration(started.elapsed())
        );
        Ok(())
    }
}
