//! Sub-module selection: auto-detection plus user overrides.
//!
//! Override grammar, as given to `--modules`:
//! - `none`: select nothing
//! - `all`: select every module supported on the target
//! - `a,b`: select exactly `a` and `b`
//! - `+a,-b`: start from the auto-detected selection, add `a`, remove `b`
//!
//! Tokens apply left to right, so `+a,-a` ends up without `a`.

use std::collections::BTreeMap;
use std::fmt;

use crate::builder::module::{Decision, Detection};
use crate::builder::tree::ModuleId;
use crate::core::errors::BuildError;
use crate::core::target::TargetSystem;

pub const EXPLICITLY_DISABLED: &str = "explicitly disabled";
pub const EXPLICITLY_REQUESTED: &str = "explicitly requested";

/// A candidate sub-module, with the outcome of its auto-detection.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ModuleId,
    pub name: &'static str,
    pub detection: Detection,
}

/// Candidates of one parent module, and which of them are selected and why.
#[derive(Debug, Clone, Default)]
pub struct ModuleCollection {
    candidates: Vec<ModuleId>,
    selected: Vec<ModuleId>,
    desired: Option<String>,
    reasons: BTreeMap<&'static str, String>,
}

impl ModuleCollection {
    /// Resolve the selection among `candidates` given an optional user override.
    pub fn resolve(
        candidates: Vec<Candidate>,
        desired: Option<&str>,
        target: &TargetSystem,
    ) -> Result<Self, BuildError> {
        let desired = desired.map(str::trim).filter(|d| !d.is_empty());
        let mut reasons: BTreeMap<&'static str, String> = candidates
            .iter()
            .map(|c| (c.name, c.detection.reason.clone()))
            .collect();
        let auto: Vec<&'static str> = candidates
            .iter()
            .filter(|c| c.detection.decision == Decision::Use)
            .map(|c| c.name)
            .collect();

        let names: Vec<&'static str> = match desired {
            None => auto,
            Some("none") => {
                for reason in reasons.values_mut() {
                    *reason = EXPLICITLY_DISABLED.to_string();
                }
                Vec::new()
            }
            Some("all") => {
                let supported: Vec<&'static str> = candidates
                    .iter()
                    .filter(|c| c.detection.is_supported())
                    .map(|c| c.name)
                    .collect();
                for name in &supported {
                    reasons.insert(name, EXPLICITLY_REQUESTED.to_string());
                }
                supported
            }
            Some(csv) => apply_overrides(&candidates, auto, csv, &mut reasons, target)?,
        };

        let selected = candidates
            .iter()
            .filter(|c| names.contains(&c.name))
            .map(|c| c.id)
            .collect();

        Ok(ModuleCollection {
            candidates: candidates.iter().map(|c| c.id).collect(),
            selected,
            desired: desired.map(str::to_string),
            reasons,
        })
    }

    pub fn candidates(&self) -> &[ModuleId] {
        &self.candidates
    }

    /// Selected modules, in declaration order.
    pub fn selected(&self) -> &[ModuleId] {
        &self.selected
    }

    pub fn desired(&self) -> Option<&str> {
        self.desired.as_deref()
    }

    pub fn is_selected(&self, id: ModuleId) -> bool {
        self.selected.contains(&id)
    }

    /// Why a candidate is (or isn't) selected.
    pub fn reason(&self, name: &str) -> Option<&str> {
        self.reasons.get(name).map(String::as_str)
    }
}

impl fmt::Display for ModuleCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.candidates.is_empty() {
            return f.write_str("no sub-modules");
        }
        match &self.desired {
            Some(desired) => f.write_str(desired),
            None => write!(
                f,
                "auto-detected: {}",
                crate::util::shell::plural(self.selected.len(), "module")
            ),
        }
    }
}

fn apply_overrides(
    candidates: &[Candidate],
    auto: Vec<&'static str>,
    csv: &str,
    reasons: &mut BTreeMap<&'static str, String>,
    target: &TargetSystem,
) -> Result<Vec<&'static str>, BuildError> {
    let tokens: Vec<(char, &str)> = csv
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.strip_prefix(['+', '-']) {
            Some(name) => (t.chars().next().unwrap_or('+'), name.trim()),
            None => (' ', t),
        })
        .filter(|(_, name)| !name.is_empty())
        .collect();

    let find = |name: &str| candidates.iter().find(|c| c.name == name);

    let unknown: Vec<String> = tokens
        .iter()
        .filter(|(_, name)| find(name).is_none())
        .map(|(_, name)| name.to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(BuildError::UnknownModules { names: unknown });
    }

    let unavailable: Vec<String> = tokens
        .iter()
        .filter(|(op, _)| *op != '-')
        .filter_map(|(_, name)| find(name))
        .filter(|c| !c.detection.is_supported())
        .map(|c| c.name.to_string())
        .collect();
    if !unavailable.is_empty() {
        return Err(BuildError::UnavailableModules {
            target: target.to_string(),
            names: unavailable,
        });
    }

    let is_delta = tokens.iter().any(|(op, _)| *op != ' ');
    let mut selected = if is_delta { auto } else { Vec::new() };

    for (op, name) in tokens {
        let Some(candidate) = find(name) else {
            continue;
        };
        let name = candidate.name;
        if op == '-' {
            if let Some(pos) = selected.iter().position(|n| *n == name) {
                selected.remove(pos);
                reasons.insert(name, EXPLICITLY_DISABLED.to_string());
            }
        } else if !selected.contains(&name) {
            selected.push(name);
            reasons.insert(name, EXPLICITLY_REQUESTED.to_string());
        }
    }

    Ok(selected)
}
