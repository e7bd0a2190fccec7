//! Implementation of `portable-python scan`: show which modules would be
//! selected on a target, and why, without building anything.

use crate::builder::root_module;
use crate::builder::telltale::HostProbe;
use crate::builder::tree::ModuleTree;
use crate::core::errors::BuildError;
use crate::core::target::TargetSystem;
use crate::core::version::PythonSpec;

/// Module selection report of `python` on one target.
#[derive(Debug)]
pub struct ScanReport {
    pub target: TargetSystem,
    pub tree: ModuleTree,
}

impl ScanReport {
    /// Header line followed by the aligned module table.
    pub fn render(&self) -> String {
        let root = self.tree.root();
        let mut text = format!(
            "{} on {} [{}]",
            self.tree.label(root),
            self.target,
            self.tree.node(root).modules
        );
        let table = self.tree.report(root);
        if !table.is_empty() {
            text.push('\n');
            text.push_str(&table);
        }
        text
    }
}

/// Scan `targets` (the host when empty) for `python`.
pub fn scan(
    python: &PythonSpec,
    targets: &[String],
    probe: &dyn HostProbe,
) -> Result<Vec<ScanReport>, BuildError> {
    let targets: Vec<Option<&str>> = if targets.is_empty() {
        vec![None]
    } else {
        targets.iter().map(|t| Some(t.as_str())).collect()
    };

    targets
        .into_iter()
        .map(|target| {
            let target = TargetSystem::parse(target)?;
            let tree = ModuleTree::build(
                root_module(python.family),
                &python.version.to_string(),
                &target,
                probe,
                None,
            )?;
            Ok(ScanReport { target, tree })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::telltale::FakeProbe;

    #[test]
    fn test_scan_darwin() {
        let python = PythonSpec::parse("3.9.6").unwrap();
        let reports = scan(
            &python,
            &["darwin-x86_64".to_string()],
            &FakeProbe::default().with_program("tclsh"),
        )
        .unwrap();
        assert_eq!(reports.len(), 1);

        let text = reports[0].render();
        let mut lines = text.lines();
        assert!(lines
            .next()
            .unwrap()
            .starts_with("cpython:3.9.6 on darwin-x86_64 [auto-detected: "));
        assert!(text.contains("libffi"));
        assert!(text.contains("on demand on macos"));
        assert!(text.contains(" +- tcl"));
    }

    #[test]
    fn test_scan_invalid_target() {
        let python = PythonSpec::parse("3.9.6").unwrap();
        let err = scan(&python, &["-x86_64".to_string()], &FakeProbe::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidTarget { .. }));
    }
}
