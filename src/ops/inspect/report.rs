//! Portability verdict over a folder of shared objects.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::ops::inspect::so_info::{LinkerTool, SoInfo};
use crate::util::effects::Effects;
use crate::util::fs as pfs;

/// Inspection of every shared object of a folder (typically `lib-dynload`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullSoReport {
    pub ok: Vec<SoInfo>,
    pub problematic: Vec<SoInfo>,
    pub size: u64,
}

impl FullSoReport {
    /// Inspect the files directly inside `folder`.
    pub fn scan(folder: &Path, tool: Option<LinkerTool>, effects: &dyn Effects) -> Result<Self> {
        let entries = std::fs::read_dir(folder)
            .with_context(|| format!("failed to list {}", folder.display()))?;
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.path())
            .collect();
        paths.sort();

        let mut report = FullSoReport::default();
        for path in paths {
            report.push(SoInfo::inspect(&path, tool, effects)?);
        }
        Ok(report)
    }

    pub fn push(&mut self, info: SoInfo) {
        self.size += info.size;
        if info.is_problematic() {
            self.problematic.push(info);
        } else {
            self.ok.push(info);
        }
    }

    /// At least one object inspected, and none problematic.
    pub fn is_valid(&self) -> bool {
        !self.ok.is_empty() && self.problematic.is_empty()
    }

    /// Summary line, followed by problematic objects (and OK ones when `verbose`).
    pub fn report(&self, verbose: bool) -> String {
        let mut lines = vec![self.to_string()];
        if verbose {
            lines.extend(self.ok.iter().map(|info| info.to_string()));
        }
        lines.extend(self.problematic.iter().map(|info| info.to_string()));
        lines.join("\n")
    }
}

impl fmt::Display for FullSoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ".so files: {}, {} problematic, {} OK",
            pfs::represented_size(self.size),
            self.problematic.len(),
            self.ok.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::effects::DryRunEffects;
    use tempfile::TempDir;

    fn clean(name: &str) -> SoInfo {
        SoInfo::new(name)
    }

    fn missing(name: &str) -> SoInfo {
        let mut info = SoInfo::new(name);
        info.add_ref("not found", None, Some("libtinfo.so.6"));
        info
    }

    #[test]
    fn test_empty_report_is_invalid() {
        let report = FullSoReport::default();
        assert!(!report.is_valid());
        assert_eq!(report.to_string(), ".so files: 0 B, 0 problematic, 0 OK");
    }

    #[test]
    fn test_missing_lib_flips_validity() {
        let mut report = FullSoReport::default();
        report.push(clean("zlib.so"));
        assert!(report.is_valid());

        report.push(missing("_curses.so"));
        assert!(!report.is_valid());
        assert_eq!(report.ok.len(), 1);
        assert_eq!(report.problematic.len(), 1);
        assert_eq!(
            report.report(false),
            ".so files: 0 B, 1 problematic, 1 OK\n_curses*.so missing: tinfo:6"
        );
        assert_eq!(
            report.report(true),
            ".so files: 0 B, 1 problematic, 1 OK\nzlib*.so\n_curses*.so missing: tinfo:6"
        );
    }

    #[test]
    fn test_scan_without_tool() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("_json.so"), [0u8; 100]).unwrap();
        std::fs::write(tmp.path().join("_tkinter_failed.so"), [0u8; 24]).unwrap();
        std::fs::create_dir(tmp.path().join("__pycache__")).unwrap();

        let report = FullSoReport::scan(tmp.path(), None, &DryRunEffects::new()).unwrap();
        assert_eq!(report.size, 124);
        assert_eq!(report.ok.len(), 1);
        assert_eq!(report.problematic.len(), 1);
        assert!(!report.is_valid());
    }
}
