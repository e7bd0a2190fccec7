//! Dynamic library references of a shared object, as reported by `otool -L`
//! (macos) or `ldd` (linux).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::util::effects::Effects;
use crate::util::process::{find_first, ProcessBuilder};

/// Always present on the platform, not worth reporting.
/// See <https://github.com/pypa/auditwheel/blob/main/src/auditwheel/policy/manylinux-policy.json>
const BASE_LIB_PATHS: &[&str] = &["/usr/lib/libSystem.B.dylib"];
const BASE_LIB_NAMES: &[&str] = &[
    "libc.so.6",
    "libm.so.6",
    "libdl.so.2",
    "libpthread.so.0",
    "librt.so.1",
    "libnsl.so.1",
    "libutil.so.1",
    "libX11.so.6",
    "libXext.so.6",
    "libXrender.so.1",
    "libICE.so.6",
    "libSM.so.6",
    "libGL.so.1",
    "libgobject-2.0.so.0",
    "libgthread-2.0.so.0",
    "libglib-2.0.so.0",
    "libresolv.so.2",
    "libexpat.so.1",
];
const BASE_LIB_PREFIXES: &[&str] = &["linux-vdso.so", "ld-linux-x86-64"];
const SYSTEM_LIB_PREFIXES: &[&str] = &["/lib", "/usr/lib", "/System/Library/Frameworks/"];

static OTOOL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+).+current version ([0-9.]+).*$").unwrap());
static TRAILING_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*?([\d.]+)[^\d]*$").unwrap());

/// Where a referenced library comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibOrigin {
    /// Standard system library folder, fine to depend on.
    System,
    /// Anywhere else: makes the object non-portable.
    Other,
    /// Reported as `not found` by the linker.
    Missing,
}

/// A library referenced by a shared object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CLibInfo {
    pub path: String,
    pub origin: LibOrigin,
    pub version: Option<String>,
    pub short_name: Option<String>,
}

impl fmt::Display for CLibInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name.as_deref().unwrap_or(&self.path))?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// Tool used to list the dynamic libraries of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkerTool {
    Otool,
    Ldd,
}

impl LinkerTool {
    /// First tool available in PATH, `otool` preferred.
    pub fn detect() -> Option<Self> {
        match find_first(&["otool", "ldd"]) {
            Some(("otool", _)) => Some(LinkerTool::Otool),
            Some(_) => Some(LinkerTool::Ldd),
            None => None,
        }
    }

    fn command(&self, path: &Path) -> ProcessBuilder {
        match self {
            LinkerTool::Otool => ProcessBuilder::new("otool").arg("-L").arg(path),
            LinkerTool::Ldd => ProcessBuilder::new("ldd").arg(path),
        }
    }
}

/// Classified library references of one shared object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoInfo {
    pub path: PathBuf,
    pub short_name: String,
    pub size: u64,
    pub base_libs: Vec<String>,
    pub system_libs: Vec<CLibInfo>,
    pub other_libs: Vec<CLibInfo>,
    pub missing_libs: Vec<CLibInfo>,
}

impl SoInfo {
    /// An object with no references recorded yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let short_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        SoInfo {
            path,
            short_name,
            size,
            base_libs: Vec::new(),
            system_libs: Vec::new(),
            other_libs: Vec::new(),
            missing_libs: Vec::new(),
        }
    }

    /// Inspect `path` with `tool`. Without a tool, no reference gets recorded.
    pub fn inspect(path: &Path, tool: Option<LinkerTool>, effects: &dyn Effects) -> Result<Self> {
        let mut info = SoInfo::new(path);
        if let Some(tool) = tool {
            let output = effects.capture(&tool.command(path))?;
            match tool {
                LinkerTool::Otool => info.parse_otool(&output.output),
                LinkerTool::Ldd => info.parse_ldd(&output.output),
            }
        }
        Ok(info)
    }

    /// Build failures are kept by python as `<name>_failed.so`.
    pub fn is_failed(&self) -> bool {
        self.path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("_failed"))
    }

    pub fn is_problematic(&self) -> bool {
        self.is_failed() || !self.missing_libs.is_empty() || !self.other_libs.is_empty()
    }

    pub fn parse_otool(&mut self, output: &str) {
        for line in output.lines() {
            if let Some(caps) = OTOOL_LINE.captures(line.trim()) {
                self.add_ref(&caps[1], Some(&caps[2]), None);
            }
        }
    }

    pub fn parse_ldd(&mut self, output: &str) {
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || line == "statically linked" {
                continue;
            }
            match line.split_once("=>") {
                Some((basename, rest)) => {
                    let path = rest.split('(').next().unwrap_or_default().trim();
                    self.add_ref(path, None, Some(basename.trim()));
                }
                None => {
                    let path = line.split(' ').next().unwrap_or_default();
                    self.add_ref(path, None, None);
                }
            }
        }
    }

    /// Record a reference to `path`, classifying it.
    pub fn add_ref(&mut self, path: &str, version: Option<&str>, basename: Option<&str>) {
        let basename = basename
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path));
        let version = version.map(str::to_string).or_else(|| version_of(basename));
        let short_name = short_name_of(basename);

        if path == "not found" {
            push_unique(
                &mut self.missing_libs,
                CLibInfo {
                    path: basename.to_string(),
                    origin: LibOrigin::Missing,
                    version,
                    short_name: Some(short_name),
                },
            );
        } else if is_base_lib(path, basename) {
            if !self.base_libs.iter().any(|p| p == path) {
                self.base_libs.push(path.to_string());
            }
        } else if SYSTEM_LIB_PREFIXES.iter().any(|p| path.starts_with(p)) {
            push_unique(
                &mut self.system_libs,
                CLibInfo {
                    path: path.to_string(),
                    origin: LibOrigin::System,
                    version,
                    short_name: Some(short_name),
                },
            );
        } else {
            push_unique(
                &mut self.other_libs,
                CLibInfo {
                    path: path.to_string(),
                    origin: LibOrigin::Other,
                    version,
                    short_name: None,
                },
            );
        }
    }
}

impl fmt::Display for SoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_failed() {
            write!(f, "{}*_failed.so", self.short_name)?;
        } else {
            write!(f, "{}*.so", self.short_name)?;
        }
        for lib in self.system_libs.iter().chain(&self.other_libs) {
            write!(f, " {}", lib)?;
        }
        if !self.missing_libs.is_empty() {
            let missing: Vec<String> = self.missing_libs.iter().map(|l| l.to_string()).collect();
            write!(f, " missing: {}", missing.join(", "))?;
        }
        Ok(())
    }
}

fn push_unique(libs: &mut Vec<CLibInfo>, lib: CLibInfo) {
    if !libs.iter().any(|l| l.path == lib.path) {
        libs.push(lib);
    }
}

fn is_base_lib(path: &str, basename: &str) -> bool {
    path.starts_with("@rpath/")
        || BASE_LIB_PATHS.contains(&path)
        || BASE_LIB_NAMES.contains(&basename)
        || BASE_LIB_PREFIXES.iter().any(|p| basename.starts_with(p))
}

/// Trailing dotted number of a library file name: `libssl.so.1.1` -> `1.1`.
fn version_of(basename: &str) -> Option<String> {
    TRAILING_VERSION
        .captures(basename)
        .map(|caps| caps[1].trim_matches('.').to_string())
        .filter(|v| !v.is_empty())
}

/// `libssl.so.1.1` -> `ssl`
fn short_name_of(basename: &str) -> String {
    let name = basename.strip_prefix("lib").unwrap_or(basename);
    name.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LDD_OUTPUT: &str = "\
\tlinux-vdso.so.1 (0x00007ffd5b3f4000)
\tlibssl.so.1.1 => /usr/lib/x86_64-linux-gnu/libssl.so.1.1 (0x00007f1c2a0b0000)
\tlibffi.so.7 => /opt/local/lib/libffi.so.7 (0x00007f1c2a0a0000)
\tlibtinfo.so.6 => not found
\tlibpthread.so.0 => /lib/x86_64-linux-gnu/libpthread.so.0 (0x00007f1c2a070000)
\tlibc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f1c29e80000)
\t/lib64/ld-linux-x86-64.so.2 (0x00007f1c2a160000)
";

    const OTOOL_OUTPUT: &str = "\
build/lib/_ssl.cpython-39-darwin.so:
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1292.60.1)
\t/usr/lib/libz.1.dylib (compatibility version 1.0.0, current version 1.2.11)
\t/usr/local/opt/openssl/lib/libssl.1.1.dylib (compatibility version 1.1.0, current version 1.1.0)
\t@rpath/libfoo.dylib (compatibility version 1.0.0, current version 1.0.0)
";

    #[test]
    fn test_parse_ldd() {
        let mut info = SoInfo::new("lib-dynload/_ssl.cpython-39-x86_64-linux-gnu.so");
        info.parse_ldd(LDD_OUTPUT);

        assert_eq!(info.short_name, "_ssl");
        assert_eq!(
            info.base_libs,
            vec![
                "linux-vdso.so.1",
                "/lib/x86_64-linux-gnu/libpthread.so.0",
                "/lib/x86_64-linux-gnu/libc.so.6",
                "/lib64/ld-linux-x86-64.so.2",
            ]
        );
        assert_eq!(info.system_libs.len(), 1);
        assert_eq!(info.system_libs[0].to_string(), "ssl:1.1");
        assert_eq!(info.other_libs.len(), 1);
        assert_eq!(info.other_libs[0].to_string(), "/opt/local/lib/libffi.so.7:7");
        assert_eq!(info.missing_libs.len(), 1);
        assert_eq!(info.missing_libs[0].origin, LibOrigin::Missing);
        assert!(info.is_problematic());
    }

    #[test]
    fn test_parse_otool() {
        let mut info = SoInfo::new("_ssl.cpython-39-darwin.so");
        info.parse_otool(OTOOL_OUTPUT);

        assert_eq!(info.base_libs, vec!["/usr/lib/libSystem.B.dylib", "@rpath/libfoo.dylib"]);
        assert_eq!(info.system_libs[0].to_string(), "z:1.2.11");
        assert_eq!(
            info.other_libs[0].path,
            "/usr/local/opt/openssl/lib/libssl.1.1.dylib"
        );
        assert!(info.missing_libs.is_empty());
        assert_eq!(
            info.to_string(),
            "_ssl*.so z:1.2.11 /usr/local/opt/openssl/lib/libssl.1.1.dylib:1.1.0"
        );
    }

    #[test]
    fn test_not_found_is_always_missing() {
        let mut info = SoInfo::new("_curses.so");
        info.add_ref("not found", None, Some("/usr/lib/libncursesw.so.6"));
        info.add_ref("not found", None, Some("libc.so.6"));
        assert_eq!(info.missing_libs.len(), 2);
        assert!(info.other_libs.is_empty());
        assert!(info.base_libs.is_empty());
    }

    #[test]
    fn test_clean_object() {
        let mut info = SoInfo::new("zlib.cpython-39-x86_64-linux-gnu.so");
        info.parse_ldd("\tstatically linked\n");
        assert!(!info.is_problematic());
        assert_eq!(info.to_string(), "zlib*.so");
    }

    #[test]
    fn test_failed_object() {
        let info = SoInfo::new("_tkinter.cpython-39-x86_64-linux-gnu_failed.so");
        assert!(info.is_problematic());
        assert_eq!(info.to_string(), "_tkinter*_failed.so");
    }

    #[test]
    fn test_names_and_versions() {
        assert_eq!(short_name_of("libssl.so.1.1"), "ssl");
        assert_eq!(short_name_of("ld-linux.so.2"), "ld-linux");
        assert_eq!(version_of("libssl.so.1.1").as_deref(), Some("1.1"));
        assert_eq!(version_of("libpython3.9.so").as_deref(), Some("3.9"));
        assert_eq!(version_of("libfoo.so"), None);
    }
}
