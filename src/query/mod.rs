//! Traversal primitives over a `BuildGraph`.
//!
//! Each primitive is a small struct holding already-resolved nodes and
//! implementing `Query`. `eval::QueryEngine` composes them from a parsed
//! query expression; they can also be used directly.
use regex::Regex;
use std::collections::HashSet;

use crate::errors::EvalError;
use crate::graph::{BuildGraph, Node, NodeId, Target, DEFAULT_BUILD_KIND};

pub mod eval;
pub mod parser;

/// Query trait implemented by all traversal primitives.
///
/// Given the graph the operands were resolved from, returns a result of type `R`.
pub trait Query<'g, R> {
    fn run(&self, graph: &'g BuildGraph) -> R;
}

/// Forward transitive closure: every node reachable through `inputs`.
///
/// Depth-first with an explicit work stack. Targets are expanded, files are
/// recorded but not expanded. Each node appears once; order is unspecified.
pub struct DepsQuery<'g> {
    pub roots: Vec<&'g Node>,
}

impl<'g> DepsQuery<'g> {
    #[must_use]
    pub fn new(roots: Vec<&'g Node>) -> Self {
        Self { roots }
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for DepsQuery<'g> {
    fn run(&self, graph: &'g BuildGraph) -> Vec<&'g Node> {
        let mut discovered: HashSet<&'g NodeId> = HashSet::new();
        let mut out: Vec<&'g Node> = Vec::new();
        let mut work: Vec<&'g Node> = self.roots.clone();
        while let Some(current) = work.pop() {
            if !discovered.insert(current.id()) {
                continue;
            }
            out.push(current);
            if let Node::Target(target) = current {
                work.extend(target.inputs.iter().filter_map(|id| graph.node(id)));
            }
        }
        out
    }
}

/// Reverse transitive closure: every consumer reachable through `outputs`.
///
/// Expands layer by layer; the next frontier is exactly the nodes first
/// recorded in the current one. Roots are only included when a cycle leads
/// back to them.
pub struct DependsOnQuery<'g> {
    pub roots: Vec<&'g Node>,
}

impl<'g> DependsOnQuery<'g> {
    #[must_use]
    pub fn new(roots: Vec<&'g Node>) -> Self {
        Self { roots }
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for DependsOnQuery<'g> {
    fn run(&self, graph: &'g BuildGraph) -> Vec<&'g Node> {
        let mut recorded: HashSet<&'g NodeId> = HashSet::new();
        let mut out: Vec<&'g Node> = Vec::new();
        let mut frontier: Vec<&'g Node> = self.roots.clone();
        while !frontier.is_empty() {
            let mut added: Vec<&'g Node> = Vec::new();
            for node in &frontier {
                for parent in node.outputs().iter().filter_map(|id| graph.node(id)) {
                    if recorded.insert(parent.id()) {
                        out.push(parent);
                        added.push(parent);
                    }
                }
            }
            frontier = added;
        }
        out
    }
}

/// Keep targets whose rule `config_name` matches a regex (unanchored search).
///
/// Files and targets without a rule or config name never match.
pub struct KindQuery<'g> {
    pub pattern: Regex,
    pub targets: Vec<&'g Node>,
}

impl<'g> KindQuery<'g> {
    /// # Errors
    /// Returns `EvalError::KindPattern` when `pattern` is not a valid regex.
    pub fn new(pattern: &str, targets: Vec<&'g Node>) -> Result<Self, EvalError> {
        let pattern = Regex::new(pattern)
            .map_err(|source| EvalError::KindPattern { pattern: pattern.to_string(), source })?;
        Ok(Self { pattern, targets })
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for KindQuery<'g> {
    fn run(&self, _graph: &'g BuildGraph) -> Vec<&'g Node> {
        self.targets
            .iter()
            .copied()
            .filter(|n| {
                n.as_target().and_then(Target::config_name).is_some_and(|c| self.pattern.is_match(c))
            })
            .collect()
    }
}

/// Keep nodes wired to at least one consumer through an edge of `kind`.
///
/// A candidate matches when any parent in its `outputs` lists it under
/// `inputs_by_kind[kind]`; parents that disagree do not cancel a match.
pub struct EdgeKindQuery<'g> {
    pub kind: String,
    pub candidates: Vec<&'g Node>,
}

impl<'g> EdgeKindQuery<'g> {
    pub fn new(kind: impl Into<String>, candidates: Vec<&'g Node>) -> Self {
        Self { kind: kind.into(), candidates }
    }

    #[must_use]
    pub fn matches(&self, graph: &BuildGraph, node: &Node) -> bool {
        node.outputs().iter().filter_map(|id| graph.node(id)).filter_map(Node::as_target).any(
            |parent| parent.inputs_by_kind.get(&self.kind).is_some_and(|ids| ids.contains(node.id())),
        )
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for EdgeKindQuery<'g> {
    fn run(&self, graph: &'g BuildGraph) -> Vec<&'g Node> {
        self.candidates.iter().copied().filter(|n| self.matches(graph, n)).collect()
    }
}

/// Outputs each target's rule produces for a build kind, in target order.
///
/// Only meaningful after the rules were materialized; before that rules
/// report nothing. Output ids missing from the graph are dropped.
pub struct OutputsQuery<'g> {
    pub targets: Vec<&'g Node>,
    pub build_kind: String,
}

impl<'g> OutputsQuery<'g> {
    #[must_use]
    pub fn new(targets: Vec<&'g Node>, build_kind: Option<&str>) -> Self {
        Self { targets, build_kind: build_kind.unwrap_or(DEFAULT_BUILD_KIND).to_string() }
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for OutputsQuery<'g> {
    fn run(&self, graph: &'g BuildGraph) -> Vec<&'g Node> {
        let mut out: Vec<&'g Node> = Vec::new();
        for target in self.targets.iter().filter_map(|n| n.as_target()) {
            let Some(rule) = &target.rule else { continue };
            out.extend(
                rule.outputs_for(target, &self.build_kind).iter().filter_map(|id| graph.node(id)),
            );
        }
        out
    }
}

/// Raw files each target consumes directly, in input order then target order.
///
/// Inputs that are targets themselves are skipped; use `DepsQuery` for the
/// full closure.
pub struct FilesQuery<'g> {
    pub targets: Vec<&'g Node>,
}

impl<'g> FilesQuery<'g> {
    #[must_use]
    pub fn new(targets: Vec<&'g Node>) -> Self {
        Self { targets }
    }
}

impl<'g> Query<'g, Vec<&'g Node>> for FilesQuery<'g> {
    fn run(&self, graph: &'g BuildGraph) -> Vec<&'g Node> {
        self.targets
            .iter()
            .filter_map(|n| n.as_target())
            .flat_map(|t| t.inputs.iter())
            .filter_map(|id| graph.node(id))
            .filter(|n| !n.is_dependency_bearing())
            .collect()
    }
}
