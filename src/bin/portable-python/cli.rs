//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

/// Build (optionally portable) python binaries
#[derive(Parser)]
#[command(name = "portable-python")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only show what would be done, without doing it
    #[arg(short = 'n', long, global = true)]
    pub dryrun: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a python binary
    Build(BuildArgs),

    /// Overview of python internals
    Inspect(InspectArgs),

    /// List supported versions
    List(ListArgs),

    /// Show which external modules would be selected, and why
    Scan(ScanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Python to build, such as `cpython:3.9.6` (latest cpython when empty)
    #[arg(default_value = "")]
    pub python_spec: String,

    /// Build folder to use [default: build]
    #[arg(short, long, value_name = "PATH")]
    pub build: Option<PathBuf>,

    /// Folder where to put compiled binary tarball [default: dist]
    #[arg(short, long, value_name = "PATH")]
    pub dist: Option<PathBuf>,

    /// External modules to include
    #[arg(short, long, value_name = "CSV")]
    pub modules: Option<String>,

    /// Build a shared-libs python targeting given prefix folder
    #[arg(short, long, value_name = "PATH")]
    pub prefix: Option<String>,

    /// Keep the static libpython in the distribution
    #[arg(long = "static", overrides_with = "no_static")]
    pub static_libpython: bool,

    /// Remove the static libpython from the distribution
    #[arg(long, overrides_with = "static_libpython")]
    pub no_static: bool,

    /// Target system, useful only with --dryrun for now, example: darwin-x86_64
    #[arg(long, env = "PORTABLE_PYTHON_TARGET")]
    pub target: Option<String>,

    /// Number of parallel `make` jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// For debugging, allows to build one module at a time
    #[arg(long, hide = true)]
    pub x_debug: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Modules to inspect
    #[arg(short, long, value_name = "CSV")]
    pub modules: Option<String>,

    /// Python executables or install folders to inspect
    #[arg(required = true)]
    pub pythons: Vec<String>,

    /// Also list the .so files found portable
    #[arg(long)]
    pub so: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Families to list (all when omitted)
    pub family: Vec<String>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Python to scan modules for
    #[arg(long, default_value = "")]
    pub python: String,

    /// Targets to scan, such as `linux-x86_64` (host when omitted)
    pub targets: Vec<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
