//! portable-python - build self-contained python distributions
//!
//! This crate compiles CPython along with a selection of external C
//! libraries statically linked into it, packages the result, and checks
//! that the compiled extensions are portable.
//!
//! ```no_run
//! use portable_python::builder::RealProbe;
//! use portable_python::ops::{BuildRequest, BuildSetup};
//! use portable_python::util::{DryRunEffects, Shell};
//!
//! let request = BuildRequest {
//!     python_spec: "cpython:3.9.6".to_string(),
//!     build_folder: "/tmp/build".into(),
//!     dist_folder: "/tmp/dist".into(),
//!     ..BuildRequest::default()
//! };
//! let setup = BuildSetup::new(&request, &RealProbe)?;
//! setup.compile(&DryRunEffects::new(), &Shell::default())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

pub use core::{BuildError, Family, Platform, PythonSpec, TargetSystem};
pub use ops::{BuildRequest, BuildSetup, PythonInspector};
pub use util::context::GlobalContext;
