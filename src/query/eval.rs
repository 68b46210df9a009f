//! Query evaluation against one graph snapshot.
use std::collections::HashSet;

use tracing::{debug, error};

use crate::errors::{EvalError, QueryError};
use crate::graph::resolver::{
    resolve_targets, PatternResolver, TargetResolver, TargetSpec, ALL_TARGETS,
};
use crate::graph::{BuildGraph, Node, NodeId, DEFAULT_BUILD_KIND};
use crate::query::parser::{parse_query, Expr, MAX_NESTING};
use crate::query::{
    DependsOnQuery, DepsQuery, EdgeKindQuery, FilesQuery, KindQuery, OutputsQuery, Query,
};

/// Deepest `Expr` tree the evaluator walks. Parsed queries stay well below it;
/// only hand-built expressions can reach it.
pub const MAX_EXPR_DEPTH: usize = 2 * MAX_NESTING;

/// Evaluation context: a graph snapshot plus the resolver used for patterns.
///
/// Each evaluation first materializes every target's rule, then evaluates the
/// expression, then flattens the result. Failures are all-or-nothing.
pub struct QueryEngine<'g, R> {
    graph: &'g BuildGraph,
    resolver: R,
    default_build_kind: String,
}

impl<'g> QueryEngine<'g, PatternResolver<'g>> {
    /// Engine resolving label patterns directly against `graph`.
    #[must_use]
    pub fn new(graph: &'g BuildGraph) -> Self {
        Self::with_resolver(graph, PatternResolver::new(graph))
    }
}

impl<'g, R: TargetResolver<'g>> QueryEngine<'g, R> {
    pub fn with_resolver(graph: &'g BuildGraph, resolver: R) -> Self {
        Self { graph, resolver, default_build_kind: DEFAULT_BUILD_KIND.to_string() }
    }

    /// Build kind used by `outputs(x)` when the query names none.
    #[must_use]
    pub fn with_default_build_kind(mut self, build_kind: impl Into<String>) -> Self {
        self.default_build_kind = build_kind.into();
        self
    }

    #[must_use]
    pub fn graph(&self) -> &'g BuildGraph {
        self.graph
    }

    /// Evaluate query text. Any failure is logged and reported as `None`.
    #[must_use]
    pub fn evaluate(&self, query: &str) -> Option<Vec<&'g Node>> {
        match self.try_evaluate(query) {
            Ok(nodes) => Some(nodes),
            Err(err) => {
                error!(query, error = %err, "query evaluation failed");
                None
            }
        }
    }

    /// Evaluate a prebuilt expression. Any failure is logged and reported as `None`.
    #[must_use]
    pub fn evaluate_expr(&self, expr: &Expr) -> Option<Vec<&'g Node>> {
        match self.try_evaluate_expr(expr) {
            Ok(nodes) => Some(nodes),
            Err(err) => {
                error!(error = %err, "expression evaluation failed");
                None
            }
        }
    }

    /// Like `evaluate`, but returns the failure instead of logging it.
    ///
    /// # Errors
    /// Returns `QueryError` if materialization, parsing, pattern resolution or
    /// kind-pattern compilation fails.
    pub fn try_evaluate(&self, query: &str) -> Result<Vec<&'g Node>, QueryError> {
        self.materialize()?;
        let expr = parse_query(query)?;
        debug!(?expr, "parsed query");
        self.run(&expr, 0)
    }

    /// # Errors
    /// Same as `try_evaluate`, minus parsing.
    pub fn try_evaluate_expr(&self, expr: &Expr) -> Result<Vec<&'g Node>, QueryError> {
        self.materialize()?;
        self.run(expr, 0)
    }

    /// Invoke `materialize` on the rule of every target in the universe.
    ///
    /// Returns the number of rules materialized.
    ///
    /// # Errors
    /// Fails if the universe cannot be resolved or any rule fails; the whole
    /// query is then void.
    pub fn materialize(&self) -> Result<usize, QueryError> {
        let universe = self.resolver.resolve_pattern(ALL_TARGETS)?;
        let mut materialized = 0usize;
        for target in universe.iter().filter_map(|n| n.as_target()) {
            let Some(rule) = &target.rule else { continue };
            rule.materialize(target).map_err(|source| QueryError::Materialization {
                target: target.id.clone(),
                source,
            })?;
            materialized += 1;
        }
        debug!(universe = universe.len(), materialized, "materialized build outputs");
        Ok(materialized)
    }

    fn run(&self, expr: &Expr, depth: usize) -> Result<Vec<&'g Node>, QueryError> {
        let spec = self.eval(expr, depth)?;
        resolve_targets(&self.resolver, &spec)
    }

    fn eval(&self, expr: &Expr, depth: usize) -> Result<TargetSpec<'g>, QueryError> {
        if depth >= MAX_EXPR_DEPTH {
            return Err(EvalError::TooDeep { limit: MAX_EXPR_DEPTH }.into());
        }
        let operand = |inner: &Expr| self.run(inner, depth + 1);
        let graph = self.graph;
        let nodes = match expr {
            Expr::Pattern(pattern) => return Ok(TargetSpec::Pattern(pattern.clone())),
            Expr::Set(items) => {
                let specs = items.iter().map(|e| self.eval(e, depth + 1)).collect::<Result<Vec<_>, _>>()?;
                return Ok(TargetSpec::Many(specs));
            }
            Expr::Deps(inner) => DepsQuery::new(operand(inner)?).run(graph),
            Expr::DependsOn(inner) => DependsOnQuery::new(operand(inner)?).run(graph),
            Expr::Kind { pattern, targets } => {
                KindQuery::new(pattern, operand(targets)?)?.run(graph)
            }
            Expr::EdgeKind { kind, targets } => {
                EdgeKindQuery::new(kind.as_str(), operand(targets)?).run(graph)
            }
            Expr::Outputs { targets, build_kind } => {
                let build_kind = build_kind.as_deref().unwrap_or(&self.default_build_kind);
                OutputsQuery::new(operand(targets)?, Some(build_kind)).run(graph)
            }
            Expr::Files(inner) => FilesQuery::new(operand(inner)?).run(graph),
            Expr::Union(lhs, rhs) => union(operand(lhs)?, operand(rhs)?),
            Expr::Except(lhs, rhs) => {
                let remove: HashSet<&NodeId> = operand(rhs)?.into_iter().map(Node::id).collect();
                dedup(operand(lhs)?.into_iter().filter(|n| !remove.contains(n.id())))
            }
            Expr::Intersect(lhs, rhs) => {
                let keep: HashSet<&NodeId> = operand(rhs)?.into_iter().map(Node::id).collect();
                dedup(operand(lhs)?.into_iter().filter(|n| keep.contains(n.id())))
            }
        };
        Ok(TargetSpec::nodes(nodes))
    }
}

fn dedup<'g>(nodes: impl Iterator<Item = &'g Node>) -> Vec<&'g Node> {
    let mut seen: HashSet<&'g NodeId> = HashSet::new();
    let mut out = Vec::new();
    for node in nodes {
        if seen.insert(node.id()) {
            out.push(node);
        }
    }
    out
}

fn union<'g>(lhs: Vec<&'g Node>, rhs: Vec<&'g Node>) -> Vec<&'g Node> {
    dedup(lhs.into_iter().chain(rhs))
}
