//! High-level operations.
//!
//! This module contains the implementation of portable-python commands.

pub mod inspect;
pub mod list;
pub mod scan;
pub mod setup;

pub use inspect::{FullSoReport, PythonInspector, SoInfo};
pub use list::list_versions;
pub use scan::{scan, ScanReport};
pub use setup::{BuildRequest, BuildSetup};
