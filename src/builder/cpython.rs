//! The python interpreter itself, root of the module tree.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::builder::compile::ModuleBuild;
use crate::builder::context::{BuildLayout, BuildOptions};
use crate::builder::module::ModuleSpec;
use crate::builder::recipes::PYTHON_MODULES;
use crate::core::target::TargetSystem;
use crate::core::version::PythonSpec;
use crate::util::fs as pfs;

pub static CPYTHON: ModuleSpec = ModuleSpec {
    name: "cpython",
    url: Some("https://www.python.org/ftp/python/{version}/Python-{version}.tgz"),
    candidates: PYTHON_MODULES,
    prepare: Some(fix_lib_permissions),
    linux_compile: Some(cpython_compile),
    finalize: Some(cpython_finalize),
    ..ModuleSpec::DEFAULT
};

/// Absolute python shebang, capturing the interpreter's folder.
static PYTHON_SHEBANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!(/\S*)/python[0-9.]*\s*$").unwrap());

/// `--prefix` python is configured with: `/<version>` by default.
pub fn configure_prefix(options: &BuildOptions, python: &PythonSpec) -> String {
    match &options.prefix {
        Some(prefix) => prefix.replace("{python_version}", &python.version.to_string()),
        None => format!("/{}", python.version),
    }
}

/// `DESTDIR` for `make install`; a separate `root/` when installing to a prefix.
pub fn build_base(layout: &BuildLayout, options: &BuildOptions) -> PathBuf {
    match options.prefix {
        Some(_) => layout.build_folder.join("root"),
        None => layout.build_folder.clone(),
    }
}

/// Folder the compiled python ends up in.
pub fn install_folder(layout: &BuildLayout, options: &BuildOptions, python: &PythonSpec) -> PathBuf {
    let prefix = configure_prefix(options, python);
    build_base(layout, options).join(prefix.trim_start_matches('/'))
}

/// `dist/cpython-3.9.6-linux-x86_64.tar.gz`
pub fn tarball_path(layout: &BuildLayout, python: &PythonSpec, target: &TargetSystem) -> PathBuf {
    layout.dist_folder.join(format!(
        "{}-{}-{}.tar.gz",
        python.family, python.version, target
    ))
}

/// Some libs get installed with funky permissions.
fn fix_lib_permissions(b: &ModuleBuild<'_>) -> Result<()> {
    let deps_lib = b.deps_lib();
    let Ok(entries) = std::fs::read_dir(&deps_lib) else {
        return Ok(());
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.to_string_lossy().ends_with(".la") {
            continue;
        }
        let expected = if path.is_dir() { 0o755 } else { 0o644 };
        let Some(current) = pfs::permissions(&path) else {
            continue;
        };
        if current != expected {
            tracing::info!(
                "Corrected permissions for {} (was {:#o})",
                path.display(),
                current
            );
            b.effects().chmod(&path, expected)?;
        }
    }
    Ok(())
}

fn cpython_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let options = b.options();
    let prefix = configure_prefix(options, b.python());
    let deps = b.deps().display().to_string();

    let mut args: Vec<String> = [
        "--with-ensurepip=upgrade",
        "--enable-optimizations",
        "--with-lto",
        "--enable-ipv6",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect();
    if options.prefix.is_some() {
        args.push("--enable-shared".to_string());
    }
    if b.has_selected_child("openssl") {
        args.push(format!("--with-openssl={}", deps));
    }
    if b.has_selected_child("tkinter") {
        args.push(format!("--with-tcltk-includes=-I{}/include", deps));
        args.push(format!("--with-tcltk-libs=-L{}/lib -ltcl8.6 -ltk8.6", deps));
    }

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    b.run_configure_with_prefix("./configure", Some(&prefix), &args)?;
    b.run_make(&[])?;

    let destdir = format!("DESTDIR={}", build_base(b.layout(), options).display());
    b.run("make", &["install", &destdir])
}

fn cpython_finalize(b: &ModuleBuild<'_>) -> Result<()> {
    let install = install_folder(b.layout(), b.options(), b.python());
    let mm = b.python().major_minor();
    let lib = install.join("lib");
    let bin = install.join("bin");

    clean_build_artifacts(b, &lib, &mm)?;

    for path in pfs::glob_paths(&bin.join("2to3*"))? {
        b.effects().delete(&path)?;
        tracing::info!("Deleted {}", path.display());
    }

    if let Some(exe) = real_exe(&bin, &mm) {
        if exe != "python" {
            b.effects()
                .symlink(Path::new(&exe), &bin.join("python"))?;
            tracing::info!("Symlink {} <- python", exe);
        }
        let prefix_bin = Path::new(&configure_prefix(b.options(), b.python())).join("bin");
        correct_shebangs(b, &bin, &[bin.as_path(), prefix_bin.as_path()], &exe)?;
    }

    let tarball = tarball_path(b.layout(), b.python(), b.target());
    b.effects().package(&install, &tarball)
}

/// Remove test suites and, unless building a static libpython, `libpythonX.Y.a`.
fn clean_build_artifacts(b: &ModuleBuild<'_>, lib: &Path, mm: &str) -> Result<()> {
    let lib_python = lib.join(format!("python{}", mm));
    let static_lib = format!("libpython{}.a", mm);
    let config_copies =
        pfs::glob_paths(&lib_python.join(format!("config-{}*", mm)).join(&static_lib))?;

    let mut cleanable: Vec<PathBuf> = Vec::new();
    if lib_python.is_dir() {
        cleanable.extend(pfs::find_named(&lib_python, "idle_test"));
        cleanable.extend(pfs::find_named(&lib_python, "__phello__.foo.py"));
        cleanable.extend(
            pfs::find_named(&lib_python, "test")
                .into_iter()
                .filter(|p| p.is_dir())
                .filter(|p| !p.components().any(|c| c.as_os_str() == "site-packages")),
        );
    }

    let main_lib = lib.join(&static_lib);
    if b.options().static_libpython {
        if let Some(copy) = config_copies.first() {
            let target = pfs::relative_path(lib, copy);
            b.effects().symlink(&target, &main_lib)?;
        }
    } else {
        if main_lib.exists() {
            cleanable.push(main_lib);
        }
        cleanable.extend(config_copies);
    }

    // Nested matches go away with their parent
    cleanable.sort();
    cleanable.dedup();
    let mut roots: Vec<PathBuf> = Vec::new();
    for path in cleanable {
        if !roots.iter().any(|root| path.starts_with(root)) {
            roots.push(path);
        }
    }
    if roots.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = roots
        .iter()
        .map(|p| pfs::relative_path(lib, p).display().to_string())
        .collect();
    for path in &roots {
        b.effects().delete(path)?;
    }
    tracing::info!(
        "Cleaned {}: {}",
        crate::util::shell::plural(roots.len(), "build artifact"),
        names.join(", ")
    );
    Ok(())
}

/// File name of the actual interpreter in `bin`, following symlinks.
fn real_exe(bin: &Path, mm: &str) -> Option<String> {
    let candidates = [format!("python{}", mm), "python3".to_string(), "python".to_string()];
    candidates.iter().find_map(|name| {
        let path = bin.join(name);
        let meta = std::fs::symlink_metadata(&path).ok()?;
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path).ok()?;
            return target.file_name().map(|n| n.to_string_lossy().into_owned());
        }
        Some(name.clone())
    })
}

/// Scripts installed with an absolute shebang to the build-time python are
/// rewritten to find their interpreter relative to their own location.
///
/// `python_dirs` are the folders the build-time python may be referred to by:
/// the install tree's `bin/` and the configured prefix's `bin/`.
fn correct_shebangs(
    b: &ModuleBuild<'_>,
    bin: &Path,
    python_dirs: &[&Path],
    exe: &str,
) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(bin) else {
        return Ok(());
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .collect();
    paths.sort();

    for path in paths {
        let bytes =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        if !bytes.starts_with(b"#!") {
            continue;
        }
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        if let Some(fixed) = relocatable_script(&text, python_dirs, exe) {
            b.effects().write(&path, &fixed)?;
            tracing::info!("Auto-corrected shebang for {}", path.display());
        }
    }
    Ok(())
}

/// `text` with its shebang replaced by a `/bin/sh` trampoline, if it points
/// at a python in one of `python_dirs`.
fn relocatable_script(text: &str, python_dirs: &[&Path], exe: &str) -> Option<String> {
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let dir = PYTHON_SHEBANG.captures(first)?.get(1)?.as_str();
    if !python_dirs.iter().any(|d| Path::new(dir) == *d) {
        return None;
    }
    Some(format!(
        "#!/bin/sh\n\"exec\" \"$(dirname $0)/{}\" \"$0\" \"$@\"\n{}",
        exe, rest
    ))
}
