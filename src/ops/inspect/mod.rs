//! Post-build inspection: dynamic library references of compiled extensions,
//! and what an installed python can import.

pub mod python;
pub mod report;
pub mod so_info;

pub use python::{PythonInspector, PythonInstall};
pub use report::FullSoReport;
pub use so_info::{CLibInfo, LibOrigin, LinkerTool, SoInfo};
