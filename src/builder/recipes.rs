//! External C libraries python can be statically linked against.

use anyhow::{Context, Result};

use crate::builder::compile::ModuleBuild;
use crate::builder::env::{cflags_pic, include_flag};
use crate::builder::module::{DetectContext, Detection, ModuleSpec, Telltale};
use crate::builder::telltale::{default_auto_use, find_telltale};

/// Berkeley DB, see <https://docs.python.org/3/library/dbm.html>
pub static BDB: ModuleSpec = ModuleSpec {
    name: "bdb",
    version: Some("6.2.32"),
    url: Some("https://ftp.osuosl.org/pub/blfs/conglomeration/db/db-{version}.tar.gz"),
    // Builds OK statically if libgdbm-compat-dev is present
    telltale: Telltale::OnDemand,
    build_cwd: Some("build_unix"),
    env: &[("CFLAGS", cflags_pic)],
    linux_compile: Some(bdb_compile),
    ..ModuleSpec::DEFAULT
};

pub static BZIP2: ModuleSpec = ModuleSpec {
    name: "bzip2",
    version: Some("1.0.8"),
    url: Some("https://sourceware.org/pub/bzip2/bzip2-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/bzlib.h"]),
    linux_compile: Some(bzip2_compile),
    ..ModuleSpec::DEFAULT
};

/// Needed on macos too, otherwise a brew install from /usr/local gets picked up.
pub static GDBM: ModuleSpec = ModuleSpec {
    name: "gdbm",
    version: Some("1.18.1"),
    url: Some("https://ftp.gnu.org/gnu/gdbm/gdbm-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/gdbm.h"]),
    linux_compile: Some(gdbm_compile),
    ..ModuleSpec::DEFAULT
};

pub static LIBFFI: ModuleSpec = ModuleSpec {
    name: "libffi",
    version: Some("3.3"),
    url: Some("https://github.com/libffi/libffi/releases/download/v{version}/libffi-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/ffi.h", "{include}/ffi/ffi.h"]),
    debian: Some("libffi-dev"),
    auto_use: Some(libffi_auto_use),
    env: &[("CFLAGS", cflags_pic)],
    linux_compile: Some(libffi_compile),
    ..ModuleSpec::DEFAULT
};

pub static OPENSSL: ModuleSpec = ModuleSpec {
    name: "openssl",
    version: Some("1.1.1k"),
    url: Some("https://www.openssl.org/source/openssl-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/openssl/ssl.h"]),
    linux_compile: Some(openssl_compile),
    ..ModuleSpec::DEFAULT
};

pub static NCURSES: ModuleSpec = ModuleSpec {
    name: "ncurses",
    version: Some("6.2"),
    url: Some("https://ftp.gnu.org/pub/gnu/ncurses/ncurses-{version}.tar.gz"),
    include_subdir: Some("ncursesw"),
    linux_compile: Some(ncurses_compile),
    ..ModuleSpec::DEFAULT
};

pub static READLINE: ModuleSpec = ModuleSpec {
    name: "readline",
    version: Some("8.1"),
    url: Some("https://ftp.gnu.org/gnu/readline/readline-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/readline/readline.h"]),
    candidates: &[&NCURSES],
    linux_compile: Some(readline_compile),
    ..ModuleSpec::DEFAULT
};

pub static SQLITE: ModuleSpec = ModuleSpec {
    name: "sqlite",
    version: Some("3.36.0"),
    url: Some("https://github.com/sqlite/sqlite/archive/refs/tags/version-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/sqlite3.h"]),
    auto_use: Some(sqlite_auto_use),
    env: &[("CFLAGS", cflags_pic)],
    linux_compile: Some(sqlite_compile),
    ..ModuleSpec::DEFAULT
};

pub static TCL: ModuleSpec = ModuleSpec {
    name: "tcl",
    url: Some("https://prdownloads.sourceforge.net/tcl/tcl{version}-src.tar.gz"),
    build_cwd: Some("unix"),
    prepare: Some(tcl_prepare),
    linux_compile: Some(tcl_compile),
    ..ModuleSpec::DEFAULT
};

pub static TK: ModuleSpec = ModuleSpec {
    name: "tk",
    url: Some("https://prdownloads.sourceforge.net/tcl/tk{version}-src.tar.gz"),
    build_cwd: Some("unix"),
    env: &[("CFLAGS", tk_cflags)],
    linux_compile: Some(tk_compile),
    ..ModuleSpec::DEFAULT
};

pub static TIX: ModuleSpec = ModuleSpec {
    name: "tix",
    version: Some("8.4.3.6"),
    url: Some("https://github.com/python/cpython-source-deps/archive/tix-{version}.tar.gz"),
    env: &[("CFLAGS", tix_cflags)],
    linux_compile: Some(tix_compile),
    ..ModuleSpec::DEFAULT
};

/// Groups tcl/tk/tix, which inherit its version.
pub static TKINTER: ModuleSpec = ModuleSpec {
    name: "tkinter",
    version: Some("8.6.10"),
    telltale: Telltale::OnDemand,
    candidates: &[&TCL, &TK, &TIX],
    auto_use: Some(tkinter_auto_use),
    ..ModuleSpec::DEFAULT
};

pub static UUID: ModuleSpec = ModuleSpec {
    name: "uuid",
    version: Some("1.0.3"),
    url: Some("https://sourceforge.net/projects/libuuid/files/libuuid-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/uuid/uuid.h"]),
    auto_use: Some(uuid_auto_use),
    env: &[("CFLAGS", cflags_pic)],
    linux_compile: Some(uuid_compile),
    ..ModuleSpec::DEFAULT
};

pub static XZ: ModuleSpec = ModuleSpec {
    name: "xz",
    version: Some("5.2.5"),
    url: Some("https://tukaani.org/xz/xz-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/lzma.h"]),
    linux_compile: Some(xz_compile),
    ..ModuleSpec::DEFAULT
};

pub static ZLIB: ModuleSpec = ModuleSpec {
    name: "zlib",
    version: Some("1.2.11"),
    url: Some("https://zlib.net/zlib-{version}.tar.gz"),
    telltale: Telltale::Patterns(&["{include}/zlib.h"]),
    auto_use: Some(zlib_auto_use),
    env: &[("CFLAGS", cflags_pic)],
    linux_compile: Some(zlib_compile),
    ..ModuleSpec::DEFAULT
};

/// Sub-modules of the python interpreter, in build order.
pub static PYTHON_MODULES: &[&ModuleSpec] = &[
    &LIBFFI, &ZLIB, &XZ, &BZIP2, &READLINE, &OPENSSL, &SQLITE, &BDB, &GDBM, &TKINTER, &UUID,
];

fn telltale_found(ctx: &DetectContext<'_>) -> bool {
    match ctx.spec.telltale {
        Telltale::Patterns(patterns) => find_telltale(patterns, ctx.target, ctx.probe).is_some(),
        _ => false,
    }
}

fn on_demand_on_macos(ctx: &DetectContext<'_>) -> Option<Detection> {
    ctx.target
        .is_macos()
        .then(|| Detection::skip("on demand on macos"))
}

/// On linux, only statically link on top of an installed dev package.
fn linux_on_top_of(ctx: &DetectContext<'_>, debian: &str) -> Option<Detection> {
    if !ctx.target.is_linux() {
        return None;
    }
    Some(if telltale_found(ctx) {
        Detection::needed(format!("needed on linux (on top of {})", debian))
    } else {
        // Fails to link without the dev package
        Detection::skip(format!(
            "need {} on linux as well, pending enhancement",
            debian
        ))
    })
}

fn libffi_auto_use(ctx: &DetectContext<'_>) -> Detection {
    on_demand_on_macos(ctx).unwrap_or_else(|| default_auto_use(ctx))
}

fn sqlite_auto_use(ctx: &DetectContext<'_>) -> Detection {
    if let Some(detection) = on_demand_on_macos(ctx) {
        return detection;
    }
    if ctx.probe.which("tclsh").is_none() {
        return Detection::unsupported("requires tclsh");
    }
    linux_on_top_of(ctx, "libsqlite3-dev").unwrap_or_else(|| default_auto_use(ctx))
}

fn uuid_auto_use(ctx: &DetectContext<'_>) -> Detection {
    on_demand_on_macos(ctx)
        .or_else(|| linux_on_top_of(ctx, "uuid-dev"))
        .unwrap_or_else(|| default_auto_use(ctx))
}

fn zlib_auto_use(ctx: &DetectContext<'_>) -> Detection {
    if ctx.target.is_linux() {
        return Detection::needed("needed on linux (to get it statically compiled)");
    }
    default_auto_use(ctx)
}

fn tkinter_auto_use(ctx: &DetectContext<'_>) -> Detection {
    if !ctx.target.is_macos() && !ctx.probe.exists(std::path::Path::new("/usr/include/X11")) {
        return Detection::skip("requires libx11-dev");
    }
    default_auto_use(ctx)
}

/// `configure`, `make`, `make install`: the usual autotools dance.
fn configure_make_install(b: &ModuleBuild<'_>, configure: &str, args: &[&str]) -> Result<()> {
    b.run_configure(configure, args)?;
    b.run_make(&[])?;
    b.run_make(&["install"])
}

fn bdb_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "../dist/configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--enable-dbm",
            "--with-pic=yes",
        ],
    )
}

fn bzip2_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let prefix = format!("PREFIX={}", b.deps().display());
    b.run_make(&[
        "install",
        &prefix,
        "CFLAGS=-fPIC -O2 -g -D_FILE_OFFSET_BITS=64",
    ])
}

fn gdbm_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--with-pic=yes",
            "--enable-libgdbm-compat",
            "--disable-dependency-tracking",
            "--disable-silent-rules",
            "--disable-rpath",
            "--without-libiconv-prefix",
            "--without-libintl-prefix",
            "--without-readline",
        ],
    )?;
    // python's setup looks for gdbm's ndbm.h as gdbm-ndbm.h
    let include = b.deps().join("include");
    b.effects()
        .move_path(&include.join("ndbm.h"), &include.join("gdbm-ndbm.h"))
}

fn libffi_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let multi_os = if b.target().is_macos() {
        "--disable-multi-os-directory"
    } else {
        ""
    };
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--with-pic=yes",
            multi_os,
            "--disable-docs",
        ],
    )
}

/// OpenSSL `Configure` target, such as `darwin64-x86_64-cc` or `linux-x86_64`.
fn openssl_target(b: &ModuleBuild<'_>) -> String {
    let target = b.target();
    if target.is_macos() {
        format!("darwin64-{}-cc", target.architecture())
    } else {
        target.to_string()
    }
}

fn openssl_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let openssldir = format!("--openssldir={}", b.deps().display());
    let target = openssl_target(b);
    b.run_configure(
        "./Configure",
        &[
            &openssldir,
            "-DPEDANTIC",
            "no-shared",
            "no-idea",
            "no-tests",
            &target,
        ],
    )?;
    b.run_make(&["depend"])?;
    b.run_make(&["all"])?;
    // See https://github.com/openssl/openssl/issues/8170
    b.run_make(&["install_sw"])
}

fn ncurses_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--enable-widec",
            "--without-cxx",
            "--without-tests",
            "--without-manpages",
            "--disable-stripping",
        ],
    )
}

fn readline_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--disable-install-examples",
            "--with-curses",
        ],
    )
}

fn sqlite_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--disable-tcl",
            "--disable-readline",
            "--with-pic=yes",
        ],
    )
}

/// Drop bundled packages that can pull in unwanted symbols.
fn tcl_prepare(b: &ModuleBuild<'_>) -> Result<()> {
    let pkgs = b.src_dir().join("pkgs");
    if !pkgs.is_dir() {
        return Ok(());
    }
    let entries = std::fs::read_dir(&pkgs)
        .with_context(|| format!("failed to read directory: {}", pkgs.display()))?;
    let mut unwanted: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with("sqlite") || n.starts_with("tdbc"))
        })
        .collect();
    unwanted.sort();
    for path in unwanted {
        b.effects().delete(&path)?;
    }
    Ok(())
}

fn tcl_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(b, "./configure", &["--enable-shared=no", "--enable-threads"])?;
    b.run_make(&["install-private-headers"])
}

fn tk_cflags(b: &ModuleBuild<'_>) -> Vec<String> {
    include_flag(b).into_iter().collect()
}

fn tk_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let with_tcl = format!("--with-tcl={}", b.deps_lib().display());
    let aqua = if b.target().is_macos() {
        "--enable-aqua=yes"
    } else {
        ""
    };
    b.run_configure(
        "./configure",
        &["--enable-shared=no", "--enable-threads", &with_tcl, "--without-x", aqua],
    )?;
    b.run_make(&[])?;
    b.effects().touch(&b.work_dir().join("wish"))?;
    b.run_make(&["install"])?;
    b.run_make(&["install-private-headers"])
}

fn tix_cflags(b: &ModuleBuild<'_>) -> Vec<String> {
    // USE_INTERP_RESULT: avoids "no member named 'result' in 'struct Tcl_Interp'"
    let mut flags = vec![
        "-DUSE_INTERP_RESULT".to_string(),
        "-Wno-implicit-function-declaration".to_string(),
    ];
    flags.extend(include_flag(b));
    flags
}

fn tix_compile(b: &ModuleBuild<'_>) -> Result<()> {
    let deps_lib = b.deps_lib();
    let with_tcl = format!("--with-tcl={}", deps_lib.display());
    let with_tk = format!("--with-tk={}", deps_lib.display());
    configure_make_install(
        b,
        "/bin/sh configure",
        &[
            "--enable-shared=no",
            "--enable-threads",
            &with_tcl,
            &with_tk,
            "--without-x",
        ],
    )
}

fn uuid_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &["--enable-shared=no", "--enable-static=yes", "--with-pic=yes"],
    )
}

fn xz_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(
        b,
        "./configure",
        &[
            "--enable-shared=no",
            "--enable-static=yes",
            "--with-pic=yes",
            "--disable-dependency-tracking",
            "--disable-doc",
        ],
    )
}

fn zlib_compile(b: &ModuleBuild<'_>) -> Result<()> {
    configure_make_install(b, "./configure", &["--64", "--static"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::module::Decision;
    use crate::builder::telltale::FakeProbe;
    use crate::core::target::TargetSystem;

    fn detect(spec: &'static ModuleSpec, target: &str, probe: &FakeProbe) -> Detection {
        let target = TargetSystem::parse(Some(target)).unwrap();
        let ctx = DetectContext {
            spec,
            target: &target,
            probe,
            parent: Some("cpython:3.9.6"),
        };
        match spec.auto_use {
            Some(auto_use) => auto_use(&ctx),
            None => default_auto_use(&ctx),
        }
    }

    #[test]
    fn test_zlib_always_needed_on_linux() {
        let probe = FakeProbe::with_paths(&["/usr/include/zlib.h"]);
        assert_eq!(
            detect(&ZLIB, "linux-x86_64", &probe),
            Detection::needed("needed on linux (to get it statically compiled)")
        );
        assert_eq!(detect(&ZLIB, "darwin-x86_64", &probe).decision, Decision::Use);
    }

    #[test]
    fn test_sqlite_requires_tclsh() {
        let probe = FakeProbe::with_paths(&["/usr/include/sqlite3.h"]);
        assert_eq!(
            detect(&SQLITE, "linux-x86_64", &probe),
            Detection::unsupported("requires tclsh")
        );
        assert_eq!(
            detect(&SQLITE, "darwin-x86_64", &probe),
            Detection::skip("on demand on macos")
        );

        let probe = probe.with_program("tclsh");
        assert_eq!(
            detect(&SQLITE, "linux-x86_64", &probe),
            Detection::needed("needed on linux (on top of libsqlite3-dev)")
        );
        assert_eq!(
            detect(&SQLITE, "linux-x86_64", &FakeProbe::default().with_program("tclsh")).decision,
            Decision::Skip
        );
    }

    #[test]
    fn test_uuid_on_linux() {
        let probe = FakeProbe::with_paths(&["/usr/include/uuid/uuid.h"]);
        assert_eq!(
            detect(&UUID, "linux-x86_64", &probe),
            Detection::needed("needed on linux (on top of uuid-dev)")
        );
        assert_eq!(
            detect(&UUID, "linux-x86_64", &FakeProbe::default()),
            Detection::skip("need uuid-dev on linux as well, pending enhancement")
        );
    }

    #[test]
    fn test_tkinter_requires_x11_outside_macos() {
        assert_eq!(
            detect(&TKINTER, "linux-x86_64", &FakeProbe::default()),
            Detection::skip("requires libx11-dev")
        );
        let probe = FakeProbe::with_paths(&["/usr/include/X11/Xlib.h"]);
        assert_eq!(detect(&TKINTER, "linux-x86_64", &probe), Detection::skip("on demand"));
        assert_eq!(
            detect(&TKINTER, "darwin-x86_64", &FakeProbe::default()),
            Detection::skip("on demand")
        );
    }

    #[test]
    fn test_libffi() {
        assert_eq!(
            detect(&LIBFFI, "darwin-arm64", &FakeProbe::default()),
            Detection::skip("on demand on macos")
        );
        assert_eq!(
            detect(&LIBFFI, "linux-x86_64", &FakeProbe::default()),
            Detection::needed("needs libffi-dev for static compile")
        );
    }

    #[test]
    fn test_bdb_is_on_demand() {
        assert_eq!(
            detect(&BDB, "linux-x86_64", &FakeProbe::default()),
            Detection::skip("on demand")
        );
    }

    #[test]
    fn test_module_names_are_unique() {
        let mut names: Vec<&str> = PYTHON_MODULES.iter().map(|m| m.name).collect();
        names.extend(TKINTER.candidates.iter().map(|m| m.name));
        names.extend(READLINE.candidates.iter().map(|m| m.name));
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_every_url_has_a_version() {
        for spec in PYTHON_MODULES {
            if let Some(url) = spec.url {
                assert!(url.contains("{version}"), "{}", spec.name);
            }
        }
    }
}
