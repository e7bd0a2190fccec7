//! Core data structures: the target system, python version specs and the
//! error taxonomy shared by every build stage.

pub mod errors;
pub mod target;
pub mod version;

pub use errors::BuildError;
pub use target::{Platform, TargetSystem};
pub use version::{Family, PythonSpec};
