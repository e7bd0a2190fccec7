//! Module build system.
//!
//! A python build is a tree of modules: the interpreter at the root, the
//! external C libraries it can be statically linked against below it.
//! Modules are described by static [`ModuleSpec`] values, selected per
//! target via [`ModuleCollection`], and compiled bottom-up by [`Compiler`].

pub mod compile;
pub mod context;
pub mod cpython;
pub mod env;
pub mod module;
pub mod recipes;
pub mod selection;
pub mod telltale;
pub mod tree;

pub use compile::{Compiler, ModuleBuild};
pub use context::{BuildContext, BuildLayout, BuildOptions};
pub use module::{Decision, Detection, ModuleSpec, Telltale};
pub use selection::ModuleCollection;
pub use telltale::{HostProbe, RealProbe};
pub use tree::{ModuleId, ModuleTree};

use crate::core::version::Family;

/// Root module building the interpreter of `family`.
pub fn root_module(family: Family) -> &'static ModuleSpec {
    match family {
        Family::Cpython => &cpython::CPYTHON,
    }
}
