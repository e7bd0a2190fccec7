//! Overview of the internals of an installed python: which notable modules
//! it can import, and how portable its compiled extensions are.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::core::errors::exit_status;
use crate::ops::inspect::report::FullSoReport;
use crate::ops::inspect::so_info::{LinkerTool, SoInfo};
use crate::util::effects::Effects;
use crate::util::process::{find_executable, ProcessBuilder};

/// Modules inspected by default.
pub const DEFAULT_MODULES: &str = "_bz2,_ctypes,_curses,_dbm,_gdbm,_lzma,_tkinter,_sqlite3,_ssl,_uuid,pip,readline,setuptools,wheel,zlib";

/// Extra modules inspected with `all`.
pub const ADDITIONAL_MODULES: &str =
    "_asyncio,_functools,_tracemalloc,dbm.gnu,ensurepip,ossaudiodev,spwd,tkinter,venv";

/// Run by the inspected python, prints a JSON payload on stdout.
const PROBE_SCRIPT: &str = r#"
import json
import os
import sys
import sysconfig


def represented(value):
    if isinstance(value, bytes):
        value = value.decode()
    if isinstance(value, (tuple, list)):
        value = ".".join(str(v) for v in value)
    return str(value)


def module_report(name):
    if name in sys.builtin_module_names:
        return {"version": "built-in"}
    try:
        module = __import__(name, fromlist=["_"])
    except Exception as e:
        return {"version": "*absent*", "note": str(e)}
    result = {"path": getattr(module, "__file__", None)}
    for attr in ("__version__", "version", "VERSION", "sqlite_version", "OPENSSL_VERSION", "TCL_VERSION", "_VERSION"):
        value = getattr(module, attr, None)
        if value is not None and not callable(value):
            result["version"] = represented(value)
            break
    return result


names = [n for n in (sys.argv[1] if len(sys.argv) > 1 else "").split(",") if n]
report = []
for name in names:
    entry = module_report(name)
    entry["name"] = name
    report.append(entry)
so = os.path.join(sysconfig.get_paths()["platstdlib"], "lib-dynload")
print(json.dumps({"report": report, "so": so}))
"#;

/// Expand a module list: empty means the default list, `all` adds the
/// additional modules, a leading `+` adds to the default list.
pub fn resolved_names(names: Option<&str>) -> Vec<String> {
    let names = names.map(str::trim).unwrap_or_default();
    let csv = if names.is_empty() {
        DEFAULT_MODULES.to_string()
    } else if names == "all" {
        format!("{},{}", DEFAULT_MODULES, ADDITIONAL_MODULES)
    } else if let Some(extra) = names.strip_prefix('+') {
        format!("{},{}", DEFAULT_MODULES, extra)
    } else {
        names.to_string()
    };
    csv.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// A python installation to inspect, given as an executable, an install
/// folder, or a program name to look up in PATH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonInstall {
    pub spec: String,
    pub executable: Option<PathBuf>,
    pub problem: Option<String>,
}

impl PythonInstall {
    pub fn find(spec: &str) -> Self {
        let path = Path::new(spec);
        let executable = if path.is_dir() {
            ["bin/python", "bin/python3"]
                .iter()
                .map(|name| path.join(name))
                .find(|exe| exe.exists())
        } else if path.is_file() {
            Some(path.to_path_buf())
        } else {
            find_executable(spec)
        };
        let problem = executable.is_none().then(|| "not available".to_string());
        PythonInstall {
            spec: spec.to_string(),
            executable,
            problem,
        }
    }

    /// Folder containing `bin/`, used to shorten reported module paths.
    fn root(&self) -> Option<&Path> {
        self.executable.as_deref()?.parent()?.parent()
    }
}

impl fmt::Display for PythonInstall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.executable {
            Some(exe) => write!(f, "{}", exe.display()),
            None => f.write_str(&self.spec),
        }
    }
}

/// What the probe script found out about one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub note: Option<String>,
}

/// Output of the probe script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub report: Vec<ModuleInfo>,
    pub so: Option<PathBuf>,
}

/// Result of inspecting one python installation.
#[derive(Debug, Clone)]
pub struct PythonInspector {
    pub python: PythonInstall,
    pub modules: Vec<String>,
    /// Raw probe output, or the failure if the probe could not run.
    pub output: String,
    pub payload: Option<Payload>,
    pub full_so_report: Option<FullSoReport>,
}

impl PythonInspector {
    /// Run the probe script with `spec`'s python and inspect its `lib-dynload` folder.
    pub fn inspect(spec: &str, modules: Option<&str>, effects: &dyn Effects) -> Result<Self> {
        let python = PythonInstall::find(spec);
        let modules = resolved_names(modules);
        let mut inspector = PythonInspector {
            python,
            modules,
            output: String::new(),
            payload: None,
            full_so_report: None,
        };
        let Some(exe) = inspector.python.executable.clone() else {
            return Ok(inspector);
        };

        let command = ProcessBuilder::new(&exe)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .arg(inspector.modules.join(","));
        tracing::debug!("Inspecting {}", exe.display());
        let result = effects.capture(&command)?;
        if !result.success() {
            inspector.output = format!("{}\n{}", exit_status(result.code), result.output);
            return Ok(inspector);
        }

        inspector.output = result.output;
        inspector.payload = parse_payload(&inspector.output);
        if let Some(folder) = inspector
            .payload
            .as_ref()
            .and_then(|p| p.so.as_deref())
            .filter(|f| f.is_dir())
        {
            let tool = LinkerTool::detect();
            inspector.full_so_report = Some(FullSoReport::scan(folder, tool, effects)?);
        }
        Ok(inspector)
    }

    /// Whether the compiled extensions were all found portable.
    pub fn is_valid(&self) -> bool {
        self.full_so_report.as_ref().is_some_and(FullSoReport::is_valid)
    }

    /// Human readable report. With `verbose` set (either way), the `.so`
    /// report is included, listing OK objects too when `true`.
    pub fn report(&self, verbose: Option<bool>) -> String {
        if let Some(problem) = &self.python.problem {
            return format!("{}: {}", self.python, problem);
        }
        let Some(payload) = &self.payload else {
            return format!("{}:\n{}", self.python, self.output.trim_end());
        };

        let rows: Vec<(String, String)> = payload
            .report
            .iter()
            .map(|info| (info.name.clone(), self.module_summary(info)))
            .collect();
        let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        let mut lines: Vec<String> = rows
            .iter()
            .map(|(name, summary)| format!("{:>w$}  {}", name, summary, w = width).trim_end().to_string())
            .collect();
        if let Some(verbose) = verbose {
            match &self.full_so_report {
                Some(report) => lines.push(report.report(verbose)),
                None => lines.push("no .so files found".to_string()),
            }
        }
        format!("{}:\n{}", self.python, lines.join("\n"))
    }

    /// Version followed by where the module comes from, or why it's absent.
    fn module_summary(&self, info: &ModuleInfo) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(version) = info.version.as_deref().filter(|v| !v.is_empty()) {
            parts.push(version.to_string());
        }
        if let Some(path) = &info.path {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let name = name.unwrap_or_default();
            if name.ends_with(".so") {
                parts.push(SoInfo::new(path).short_name);
            } else {
                let path = if name.starts_with("__init__.") {
                    path.parent().unwrap_or(path)
                } else {
                    path.as_path()
                };
                let shown = self
                    .python
                    .root()
                    .and_then(|root| root.parent())
                    .and_then(|base| path.strip_prefix(base).ok())
                    .unwrap_or(path);
                parts.push(shown.display().to_string());
            }
        } else if let Some(note) = info.note.as_deref().filter(|n| !n.contains("No module named")) {
            parts.push(note.to_string());
        }
        parts.join(" ")
    }
}

fn parse_payload(output: &str) -> Option<Payload> {
    let output = output.trim();
    if !output.starts_with('{') {
        return None;
    }
    match serde_json::from_str(output) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!("Can't parse inspection output: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::effects::DryRunEffects;
    use tempfile::TempDir;

    #[test]
    fn test_resolved_names() {
        let default = resolved_names(None);
        assert_eq!(default.len(), 15);
        assert_eq!(resolved_names(Some("")), default);

        let all = resolved_names(Some("all"));
        assert!(all.contains(&"_tracemalloc".to_string()));
        assert_eq!(all.len(), default.len() + 9);

        let mut with_foo = default.clone();
        with_foo.push("foo".to_string());
        assert_eq!(resolved_names(Some("+,,foo")), with_foo);

        assert_eq!(resolved_names(Some("zlib, _ssl")), vec!["zlib", "_ssl"]);
    }

    #[test]
    fn test_missing_python() {
        let inspector =
            PythonInspector::inspect("/no/such/python-foo", None, &DryRunEffects::new()).unwrap();
        assert!(!inspector.is_valid());
        assert_eq!(inspector.report(None), "/no/such/python-foo: not available");
    }

    #[test]
    fn test_find_in_install_folder() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin/python3"), "").unwrap();

        let python = PythonInstall::find(&tmp.path().display().to_string());
        assert_eq!(python.executable, Some(tmp.path().join("bin/python3")));
        assert_eq!(python.problem, None);
    }

    #[test]
    fn test_report_from_payload() {
        let output = r#"{"report": [
            {"name": "zlib", "version": "1.2.11", "path": "/opt/3.9.6/lib/python3.9/lib-dynload/zlib.cpython-39-x86_64-linux-gnu.so"},
            {"name": "_ssl", "version": "*absent*", "note": "No module named '_ssl'"},
            {"name": "_tkinter", "version": "*absent*", "note": "libtk8.6.so: cannot open shared object file"},
            {"name": "sys", "version": "built-in"},
            {"name": "pip", "version": "21.1.3", "path": "/opt/3.9.6/lib/python3.9/site-packages/pip/__init__.py"}
        ], "so": "/opt/3.9.6/lib/python3.9/lib-dynload"}"#;
        let inspector = PythonInspector {
            python: PythonInstall {
                spec: "3.9.6".to_string(),
                executable: Some(PathBuf::from("/opt/3.9.6/bin/python")),
                problem: None,
            },
            modules: Vec::new(),
            output: output.to_string(),
            payload: parse_payload(output),
            full_so_report: None,
        };

        assert_eq!(
            inspector.report(None),
            "/opt/3.9.6/bin/python:\n\
             \u{20}   zlib  1.2.11 zlib\n\
             \u{20}   _ssl  *absent*\n\
             _tkinter  *absent* libtk8.6.so: cannot open shared object file\n\
             \u{20}    sys  built-in\n\
             \u{20}    pip  21.1.3 3.9.6/lib/python3.9/site-packages/pip"
        );
        assert!(inspector.report(Some(false)).ends_with("no .so files found"));
    }

    #[test]
    fn test_unparseable_output() {
        assert_eq!(parse_payload("Traceback (most recent call last):"), None);
        assert_eq!(parse_payload("{not json"), None);
    }
}
