//! Shared utilities

pub mod config;
pub mod context;
pub mod effects;
pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;

pub use config::Config;
pub use context::GlobalContext;
pub use effects::{DryRunEffects, Effects, RealEffects};
pub use process::ProcessBuilder;
pub use shell::Shell;
