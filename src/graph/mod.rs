//! Graph model for one build-graph snapshot.
//!
//! This module defines the node shapes the query engine traverses
//! (`Node`, `Target`, `FileNode`), the `Rule` capability each target exposes
//! for build-output materialization, and `BuildGraph`, the arena that owns a
//! snapshot and answers id lookups.
//!
//! Graphs are normally produced by an external rule-resolution step and handed
//! over as a JSON `GraphSnapshot` (see `BuildGraph::load_json`). Queries in
//! `crate::query` only ever read from a `BuildGraph`.
use crate::errors::{GraphError, MaterializeError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

pub mod resolver;

/// Build kind used by `outputs` when the caller does not name one.
pub const DEFAULT_BUILD_KIND: &str = "build";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Capability contract of a rule attached to a target.
///
/// `outputs_for` only reports outputs once `materialize` has run for the
/// target; before that it may return an empty list. `materialize` must be
/// idempotent: the query engine calls it on every evaluation pass.
pub trait Rule: fmt::Debug + Send + Sync {
    /// Rule classification (e.g. `go_binary`), matched by `kind(...)`.
    fn config_name(&self) -> Option<&str>;

    /// Output node ids this target produces for `build_kind`.
    fn outputs_for(&self, target: &Target, build_kind: &str) -> Vec<NodeId>;

    /// Compute and attach the target's build outputs.
    ///
    /// The default is a rule with nothing to materialize.
    ///
    /// # Errors
    /// Returns `MaterializeError` when the outputs cannot be computed.
    fn materialize(&self, _target: &Target) -> Result<(), MaterializeError> {
        Ok(())
    }
}

/// A build rule instance.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: NodeId,
    pub rule: Option<Arc<dyn Rule>>,
    /// Dependencies, in declaration order.
    pub inputs: Vec<NodeId>,
    /// Targets that consume this one as an input.
    pub outputs: Vec<NodeId>,
    /// Inputs grouped by edge kind (e.g. `srcs`, `deps`).
    pub inputs_by_kind: BTreeMap<String, Vec<NodeId>>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            rule: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            inputs_by_kind: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn config_name(&self) -> Option<&str> {
        self.rule.as_deref().and_then(Rule::config_name)
    }
}

/// A raw file. Leaf in the dependency direction.
#[derive(Debug, Clone, Default)]
pub struct FileNode {
    pub id: NodeId,
    pub outputs: Vec<NodeId>,
}

impl FileNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: NodeId::new(id), outputs: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Target(Target),
    File(FileNode),
}

impl Node {
    #[must_use]
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Target(t) => &t.id,
            Node::File(f) => &f.id,
        }
    }

    /// Consumers of this node.
    #[must_use]
    pub fn outputs(&self) -> &[NodeId] {
        match self {
            Node::Target(t) => &t.outputs,
            Node::File(f) => &f.outputs,
        }
    }

    #[must_use]
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Node::Target(t) => Some(t),
            Node::File(_) => None,
        }
    }

    /// True when forward traversal continues through this node.
    #[must_use]
    pub fn is_dependency_bearing(&self) -> bool {
        matches!(self, Node::Target(_))
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Node::Target(_) => "target",
            Node::File(_) => "file",
        }
    }
}

/// Rule backed by the outputs declared in a snapshot.
///
/// Declared outputs become visible through `outputs_for` only after
/// `materialize`, which also rejects a target that lists one of its own
/// outputs as an input.
#[derive(Debug, Default)]
pub struct DeclaredRule {
    config_name: Option<String>,
    builds: BTreeMap<String, Vec<NodeId>>,
    materialized: OnceLock<BTreeMap<String, Vec<NodeId>>>,
}

impl DeclaredRule {
    #[must_use]
    pub fn new(config_name: Option<String>, builds: BTreeMap<String, Vec<NodeId>>) -> Self {
        Self { config_name, builds, materialized: OnceLock::new() }
    }

    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.materialized.get().is_some()
    }
}

impl Rule for DeclaredRule {
    fn config_name(&self) -> Option<&str> {
        self.config_name.as_deref()
    }

    fn outputs_for(&self, _target: &Target, build_kind: &str) -> Vec<NodeId> {
        self.materialized
            .get()
            .and_then(|builds| builds.get(build_kind))
            .cloned()
            .unwrap_or_default()
    }

    fn materialize(&self, target: &Target) -> Result<(), MaterializeError> {
        if self.is_materialized() {
            return Ok(());
        }
        for (build_kind, outs) in &self.builds {
            if let Some(out) = outs.iter().find(|o| target.inputs.contains(o)) {
                return Err(MaterializeError::OutputIsInput {
                    output: out.clone(),
                    build_kind: build_kind.clone(),
                });
            }
        }
        // A concurrent pass may have won the race; both computed the same map.
        let _ = self.materialized.set(self.builds.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleDecl {
    #[serde(default)]
    pub config_name: Option<String>,
    /// Output ids per build kind.
    #[serde(default)]
    pub builds: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetDecl {
    pub id: String,
    #[serde(default)]
    pub rule: Option<RuleDecl>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub inputs_by_kind: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileDecl {
    pub id: String,
}

/// Serialized form of a resolved build graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub targets: Vec<TargetDecl>,
    #[serde(default)]
    pub files: Vec<FileDecl>,
}

/// Arena owning every node of one snapshot, keyed (and ordered) by id.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: BTreeMap<NodeId, Node>,
}

impl BuildGraph {
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Every target, in id order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.nodes.values().filter_map(Node::as_target)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node. Reverse edges are not touched; call `link_outputs` once
    /// all nodes are in.
    ///
    /// # Errors
    /// Returns `GraphError::DuplicateId` if a node with the same id exists.
    pub fn insert(&mut self, node: Node) -> Result<(), GraphError> {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Recompute every node's `outputs` from the targets' `inputs`.
    ///
    /// Targets are visited in id order, so each `outputs` list is sorted by
    /// consumer id. Inputs pointing at unknown ids are left dangling.
    pub fn link_outputs(&mut self) {
        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        for target in self.targets() {
            for input in &target.inputs {
                edges.push((input.clone(), target.id.clone()));
            }
        }
        for node in self.nodes.values_mut() {
            match node {
                Node::Target(t) => t.outputs.clear(),
                Node::File(f) => f.outputs.clear(),
            }
        }
        for (input, consumer) in edges {
            let Some(node) = self.nodes.get_mut(&input) else { continue };
            let outputs = match node {
                Node::Target(t) => &mut t.outputs,
                Node::File(f) => &mut f.outputs,
            };
            if !outputs.contains(&consumer) {
                outputs.push(consumer);
            }
        }
    }

    /// Build the arena from a snapshot.
    ///
    /// A target's `inputs` are its explicit inputs followed by any
    /// `inputs_by_kind` entry not already listed. Referenced ids that are
    /// declared neither as target nor as file (inputs, build outputs) are
    /// registered as implicit file nodes.
    ///
    /// # Errors
    /// Returns `GraphError::DuplicateId` if an id is declared twice.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut graph = BuildGraph::default();
        let mut referenced: Vec<NodeId> = Vec::new();

        for file in snapshot.files {
            graph.insert(Node::File(FileNode::new(file.id)))?;
        }

        for decl in snapshot.targets {
            let mut target = Target::new(decl.id);
            let mut seen: HashSet<String> = HashSet::new();
            for id in decl.inputs.into_iter().chain(decl.inputs_by_kind.values().flatten().cloned())
            {
                if seen.insert(id.clone()) {
                    target.inputs.push(NodeId(id));
                }
            }
            target.inputs_by_kind = decl
                .inputs_by_kind
                .into_iter()
                .map(|(kind, ids)| (kind, ids.into_iter().map(NodeId).collect()))
                .collect();
            referenced.extend(target.inputs.iter().cloned());

            if let Some(rule) = decl.rule {
                let builds: BTreeMap<String, Vec<NodeId>> = rule
                    .builds
                    .into_iter()
                    .map(|(kind, ids)| (kind, ids.into_iter().map(NodeId).collect()))
                    .collect();
                referenced.extend(builds.values().flatten().cloned());
                target.rule = Some(Arc::new(DeclaredRule::new(rule.config_name, builds)));
            }
            graph.insert(Node::Target(target))?;
        }

        let mut implicit = 0usize;
        for id in referenced {
            if !graph.nodes.contains_key(&id) {
                graph.nodes.insert(id.clone(), Node::File(FileNode { id, outputs: Vec::new() }));
                implicit += 1;
            }
        }

        graph.link_outputs();
        tracing::debug!(nodes = graph.len(), implicit_files = implicit, "graph snapshot loaded");
        Ok(graph)
    }

    /// Parse a JSON snapshot from a string.
    ///
    /// # Errors
    /// Returns `GraphError` on malformed JSON or duplicate ids.
    pub fn from_json_str(data: &str) -> Result<Self, GraphError> {
        let snapshot: GraphSnapshot = serde_json::from_str(data)?;
        Self::from_snapshot(snapshot)
    }

    /// Load a JSON snapshot from disk.
    ///
    /// # Errors
    /// Returns `GraphError` on I/O failure, malformed JSON or duplicate ids.
    pub fn load_json(path: &Path) -> Result<Self, GraphError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(id: &str, inputs: &[&str]) -> TargetDecl {
        TargetDecl {
            id: id.to_string(),
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
            ..TargetDecl::default()
        }
    }

    #[test]
    fn default_file_node_is_empty() {
        let file = FileNode::default();
        assert!(file.id.as_str().is_empty());
        assert!(file.outputs.is_empty());
        assert_eq!(NodeId::default(), NodeId::from(""));
    }

    #[test]
    fn reverse_edges_follow_inputs() {
        let snapshot = GraphSnapshot {
            targets: vec![
                decl("//app:main", &["//lib:util", "app/main.go"]),
                decl("//app:test", &["//lib:util"]),
                decl("//lib:util", &["lib/util.go"]),
            ],
            files: vec![FileDecl { id: "app/main.go".into() }],
        };
        let g = BuildGraph::from_snapshot(snapshot).unwrap();

        let util = g.get("//lib:util").unwrap();
        assert_eq!(util.outputs(), &[NodeId::from("//app:main"), NodeId::from("//app:test")]);
        assert_eq!(g.get("app/main.go").unwrap().outputs(), &[NodeId::from("//app:main")]);
        // Declared nowhere, so it became an implicit file node
        let implicit = g.get("lib/util.go").unwrap();
        assert!(!implicit.is_dependency_bearing());
        assert_eq!(implicit.outputs(), &[NodeId::from("//lib:util")]);
    }

    #[test]
    fn kind_buckets_extend_inputs_without_duplicates() {
        let mut t = decl("//app:main", &["a.go"]);
        t.inputs_by_kind.insert("srcs".into(), vec!["a.go".into(), "b.go".into()]);
        t.inputs_by_kind.insert("deps".into(), vec!["//lib:x".into()]);
        let g = BuildGraph::from_snapshot(GraphSnapshot {
            targets: vec![t, decl("//lib:x", &[])],
            files: vec![],
        })
        .unwrap();

        let target = g.get("//app:main").and_then(Node::as_target).unwrap();
        let ids: Vec<&str> = target.inputs.iter().map(NodeId::as_str).collect();
        // BTreeMap order: "deps" bucket before "srcs"
        assert_eq!(ids, vec!["a.go", "//lib:x", "b.go"]);
        assert!(g.get("//lib:x").unwrap().is_dependency_bearing());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let snapshot = GraphSnapshot {
            targets: vec![decl("//a:a", &[])],
            files: vec![FileDecl { id: "//a:a".into() }],
        };
        let err = BuildGraph::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(id) if id.as_str() == "//a:a"));
    }

    #[test]
    fn declared_rule_outputs_need_materialization() {
        let mut builds = BTreeMap::new();
        builds.insert("build".to_string(), vec![NodeId::from("out/app")]);
        let rule = DeclaredRule::new(Some("go_binary".into()), builds);
        let target = Target::new("//app:main");

        assert!(rule.outputs_for(&target, "build").is_empty());
        rule.materialize(&target).unwrap();
        rule.materialize(&target).unwrap();
        assert_eq!(rule.outputs_for(&target, "build"), vec![NodeId::from("out/app")]);
        assert!(rule.outputs_for(&target, "test").is_empty());
    }

    #[test]
    fn materialize_rejects_output_listed_as_input() {
        let mut builds = BTreeMap::new();
        builds.insert("build".to_string(), vec![NodeId::from("gen.go")]);
        let rule = DeclaredRule::new(None, builds);
        let mut target = Target::new("//gen:gen");
        target.inputs.push(NodeId::from("gen.go"));

        let err = rule.materialize(&target).unwrap_err();
        assert!(matches!(err, MaterializeError::OutputIsInput { ref output, .. } if output.as_str() == "gen.go"));
        assert!(!rule.is_materialized());
    }

    #[test]
    fn load_json_reads_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "targets": [
                    { "id": "//app:main", "rule": { "config_name": "go_binary", "builds": { "build": ["out/main"] } },
                      "inputs": ["main.go"] }
                ]
            }"#,
        )
        .unwrap();

        let g = BuildGraph::load_json(&path).unwrap();
        assert_eq!(g.len(), 3);
        let t = g.get("//app:main").and_then(Node::as_target).unwrap();
        assert_eq!(t.config_name(), Some("go_binary"));
        assert!(g.get("out/main").is_some());
    }
}
