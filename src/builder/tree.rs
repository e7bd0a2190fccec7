//! Arena of module instances for one build.
//!
//! The root is the python interpreter; every candidate sub-module gets its
//! own node (selected or not, so that reports can show why it was skipped),
//! and each node refers to its parent by index.

use std::fmt;

use crate::builder::module::{DetectContext, ModuleSpec};
use crate::builder::selection::{Candidate, ModuleCollection};
use crate::builder::telltale::{default_auto_use, HostProbe};
use crate::core::errors::BuildError;
use crate::core::target::TargetSystem;

/// Index of a node in a [`ModuleTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

impl ModuleId {
    pub(crate) fn new(index: usize) -> Self {
        ModuleId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// One module instance.
#[derive(Debug)]
pub struct ModuleNode {
    pub spec: &'static ModuleSpec,
    pub parent: Option<ModuleId>,
    /// Own version, or the one inherited from the closest parent declaring one.
    pub version: String,
    pub modules: ModuleCollection,
}

/// A row of the module report: indented name, version, selection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub version: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ModuleTree {
    nodes: Vec<ModuleNode>,
}

impl ModuleTree {
    /// Instantiate `root` and all its candidate descendants, running
    /// auto-detection on each. `desired` overrides the root's selection only.
    pub fn build(
        root: &'static ModuleSpec,
        version: &str,
        target: &TargetSystem,
        probe: &dyn HostProbe,
        desired: Option<&str>,
    ) -> Result<Self, BuildError> {
        let mut tree = ModuleTree { nodes: Vec::new() };
        tree.add(root, None, version.to_string(), target, probe, desired)?;
        Ok(tree)
    }

    fn add(
        &mut self,
        spec: &'static ModuleSpec,
        parent: Option<ModuleId>,
        version: String,
        target: &TargetSystem,
        probe: &dyn HostProbe,
        desired: Option<&str>,
    ) -> Result<ModuleId, BuildError> {
        let id = ModuleId(self.nodes.len());
        self.nodes.push(ModuleNode {
            spec,
            parent,
            version,
            modules: ModuleCollection::default(),
        });

        let label = self.label(id);
        let mut candidates = Vec::with_capacity(spec.candidates.len());
        for child in spec.candidates {
            let child_version = child
                .version
                .map(str::to_string)
                .unwrap_or_else(|| self.nodes[id.0].version.clone());
            let child_id = self.add(child, Some(id), child_version, target, probe, None)?;
            let ctx = DetectContext {
                spec: child,
                target,
                probe,
                parent: Some(label.as_str()),
            };
            let detection = match child.auto_use {
                Some(auto_use) => auto_use(&ctx),
                None => default_auto_use(&ctx),
            };
            candidates.push(Candidate {
                id: child_id,
                name: child.name,
                detection,
            });
        }

        self.nodes[id.0].modules = ModuleCollection::resolve(candidates, desired, target)?;
        Ok(id)
    }

    pub fn root(&self) -> ModuleId {
        ModuleId(0)
    }

    pub fn node(&self, id: ModuleId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: ModuleId) -> &'static str {
        self.nodes[id.0].spec.name
    }

    /// `name:version`, as shown in headers and reasons.
    pub fn label(&self, id: ModuleId) -> String {
        let node = &self.nodes[id.0];
        format!("{}:{}", node.spec.name, node.version)
    }

    /// Selected descendants of `id`, each after its own selected sub-modules,
    /// followed by `id` itself.
    pub fn post_order(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut order = self.selected_descendants(id);
        order.push(id);
        order
    }

    /// Selected descendants of `id` in compile order, excluding `id`.
    pub fn selected_descendants(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut order = Vec::new();
        for child in self.nodes[id.0].modules.selected() {
            order.extend(self.post_order(*child));
        }
        order
    }

    /// Directly selected sub-module of `id` named `name`, if any.
    pub fn find_selected(&self, id: ModuleId, name: &str) -> Option<ModuleId> {
        self.nodes[id.0]
            .modules
            .selected()
            .iter()
            .copied()
            .find(|child| self.name(*child) == name)
    }

    /// Every candidate below `id`, depth first, selected or not.
    pub fn report_rows(&self, id: ModuleId) -> Vec<ReportRow> {
        let mut rows = Vec::new();
        self.collect_rows(id, 0, &mut rows);
        rows
    }

    fn collect_rows(&self, id: ModuleId, indent: usize, rows: &mut Vec<ReportRow>) {
        let prefix = if indent == 0 {
            String::new()
        } else {
            format!(" +{} ", "-".repeat(indent))
        };
        let modules = &self.nodes[id.0].modules;
        for child in modules.candidates() {
            let name = self.name(*child);
            rows.push(ReportRow {
                name: format!("{}{}", prefix, name),
                version: self.nodes[child.0].version.clone(),
                reason: modules.reason(name).unwrap_or_default().to_string(),
            });
            self.collect_rows(*child, indent + 1, rows);
        }
    }

    /// The report as aligned text, one row per line.
    pub fn report(&self, id: ModuleId) -> String {
        format_table(&self.report_rows(id))
    }
}

impl fmt::Display for ModuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label(self.root()))
    }
}

fn format_table(rows: &[ReportRow]) -> String {
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let version_width = rows.iter().map(|r| r.version.len()).max().unwrap_or(0);
    rows.iter()
        .map(|r| {
            format!(
                "{:<nw$}  {:<vw$}  {}",
                r.name,
                r.version,
                r.reason,
                nw = name_width,
                vw = version_width
            )
            .trim_end()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
