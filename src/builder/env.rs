//! Environment composition for module builds.
//!
//! Every module gets the [`DEFAULT_ENV`] producers, overlaid with its own
//! `env` list (a module entry with the same name replaces the default one).
//! Variables are assembled in name order.

use std::collections::BTreeMap;

use crate::builder::compile::ModuleBuild;
use crate::builder::module::{EnvProducer, ModuleSpec};

/// Producers every module gets.
pub const DEFAULT_ENV: &[(&str, EnvProducer)] = &[
    ("ARCHFLAGS", archflags),
    ("CPATH", cpath),
    ("LDFLAGS", ldflags),
    ("MACOSX_DEPLOYMENT_TARGET", macosx_deployment_target),
    ("PATH", path),
    ("PKG_CONFIG_PATH", pkg_config_path),
];

const DEFAULT_MACOSX_DEPLOYMENT_TARGET: &str = "10.14";

/// Effective producers for `spec`, sorted by variable name.
pub fn producers(spec: &ModuleSpec) -> Vec<(&'static str, EnvProducer)> {
    let mut merged: BTreeMap<&'static str, EnvProducer> = DEFAULT_ENV.iter().copied().collect();
    for (name, producer) in spec.env {
        merged.insert(*name, *producer);
    }
    merged.into_iter().collect()
}

/// Join the values of variable `name`: `:` for `*PATH` variables, a space
/// otherwise. Empty values are dropped; `None` when nothing is left.
pub fn join(name: &str, values: Vec<String>) -> Option<String> {
    let separator = if name.ends_with("PATH") { ":" } else { " " };
    let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.join(separator))
}

/// Variables to set before building `build`'s module, in name order.
pub fn compose(build: &ModuleBuild<'_>) -> Vec<(String, String)> {
    producers(build.spec())
        .into_iter()
        .filter_map(|(name, producer)| {
            join(name, producer(build)).map(|value| (name.to_string(), value))
        })
        .collect()
}

fn archflags(b: &ModuleBuild<'_>) -> Vec<String> {
    if b.target().is_macos() {
        vec![format!("-arch {}", b.target().architecture())]
    } else {
        Vec::new()
    }
}

/// Only set for modules with selected sub-modules.
fn cpath(b: &ModuleBuild<'_>) -> Vec<String> {
    if !b.has_selected_children() {
        return Vec::new();
    }
    let include = b.deps().join("include");
    let mut values = vec![include.display().to_string()];
    values.extend(
        b.selected_descendants()
            .filter_map(|spec| spec.include_subdir)
            .map(|sub| include.join(sub).display().to_string()),
    );
    values
}

fn ldflags(b: &ModuleBuild<'_>) -> Vec<String> {
    vec![format!("-L{}", b.deps_lib().display())]
}

fn macosx_deployment_target(b: &ModuleBuild<'_>) -> Vec<String> {
    if !b.target().is_macos() {
        return Vec::new();
    }
    let value = std::env::var("MACOSX_DEPLOYMENT_TARGET")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MACOSX_DEPLOYMENT_TARGET.to_string());
    vec![value]
}

fn path(b: &ModuleBuild<'_>) -> Vec<String> {
    vec![
        b.deps().join("bin").display().to_string(),
        "/usr/bin".to_string(),
        "/bin".to_string(),
    ]
}

fn pkg_config_path(b: &ModuleBuild<'_>) -> Vec<String> {
    vec![b.deps_lib().join("pkgconfig").display().to_string()]
}

/// `-fPIC`, shared by most static library recipes.
pub fn cflags_pic(_: &ModuleBuild<'_>) -> Vec<String> {
    vec!["-fPIC".to_string()]
}

/// `-I<deps>/include`, when that folder exists.
pub fn include_flag(b: &ModuleBuild<'_>) -> Option<String> {
    let include = b.deps().join("include");
    include
        .is_dir()
        .then(|| format!("-I{}", include.display()))
}
