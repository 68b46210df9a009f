use crate::errors::{QueryError, ResolveError};
use crate::graph::{BuildGraph, Node};

/// Pattern selecting every target in the graph.
pub const ALL_TARGETS: &str = "//...";

/// Turns a target-pattern string into graph nodes.
pub trait TargetResolver<'g> {
    /// # Errors
    /// Returns `ResolveError` when the pattern is malformed or matches nothing.
    fn resolve_pattern(&self, pattern: &str) -> Result<Vec<&'g Node>, ResolveError>;
}

/// A target specification: a node, a pattern, or a nested list of either.
#[derive(Debug, Clone)]
pub enum TargetSpec<'g> {
    Node(&'g Node),
    Pattern(String),
    Many(Vec<TargetSpec<'g>>),
}

impl<'g> TargetSpec<'g> {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    #[must_use]
    pub fn nodes(nodes: Vec<&'g Node>) -> Self {
        Self::Many(nodes.into_iter().map(Self::Node).collect())
    }
}

impl<'g> From<&'g Node> for TargetSpec<'g> {
    fn from(node: &'g Node) -> Self {
        Self::Node(node)
    }
}

impl From<&str> for TargetSpec<'_> {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

/// Flatten a specification into nodes, in order and keeping duplicates.
///
/// # Errors
/// Propagates the resolver's failure for the first pattern that fails.
pub fn resolve_targets<'g, R>(resolver: &R, spec: &TargetSpec<'g>) -> Result<Vec<&'g Node>, QueryError>
where
    R: TargetResolver<'g> + ?Sized,
{
    match spec {
        TargetSpec::Node(node) => Ok(vec![*node]),
        TargetSpec::Pattern(pattern) => Ok(resolver.resolve_pattern(pattern)?),
        TargetSpec::Many(specs) => {
            let mut out = Vec::new();
            for s in specs {
                out.extend(resolve_targets(resolver, s)?);
            }
            Ok(out)
        }
    }
}

enum Pattern<'a> {
    All,
    Recursive(&'a str),
    Package(&'a str),
    Exact(&'a str),
}

fn classify(pattern: &str) -> Result<Pattern<'_>, ResolveError> {
    if pattern.trim().is_empty() {
        return Err(ResolveError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "empty pattern".to_string(),
        });
    }
    if let Some(prefix) = pattern.strip_suffix("...") {
        let Some(package) = prefix.strip_prefix("//") else {
            return Err(ResolveError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "recursive patterns must start with //".to_string(),
            });
        };
        let package = package.trim_end_matches('/');
        return Ok(if package.is_empty() { Pattern::All } else { Pattern::Recursive(package) });
    }
    if let Some(rest) = pattern.strip_prefix("//") {
        if let Some(package) = rest.strip_suffix(":all").or_else(|| rest.strip_suffix(":*")) {
            return Ok(Pattern::Package(package));
        }
    }
    Ok(Pattern::Exact(pattern))
}

// `//pkg/sub:name` -> `pkg/sub`; `//pkg/sub` is shorthand for `//pkg/sub:sub`.
fn package_of(id: &str) -> Option<&str> {
    let rest = id.strip_prefix("//")?;
    Some(rest.split_once(':').map_or(rest, |(package, _)| package))
}

fn target_in_package(node: &Node, keep: impl Fn(&str) -> bool) -> bool {
    node.is_dependency_bearing() && package_of(node.id().as_str()).is_some_and(keep)
}

/// Resolves label patterns against one `BuildGraph`.
///
/// Supported forms: `//...`, `//pkg/...`, `//pkg:all` (or `//pkg:*`) and
/// exact node ids, which may name targets or files.
#[derive(Debug, Clone, Copy)]
pub struct PatternResolver<'g> {
    graph: &'g BuildGraph,
}

impl<'g> PatternResolver<'g> {
    #[must_use]
    pub fn new(graph: &'g BuildGraph) -> Self {
        Self { graph }
    }
}

impl<'g> TargetResolver<'g> for PatternResolver<'g> {
    fn resolve_pattern(&self, pattern: &str) -> Result<Vec<&'g Node>, ResolveError> {
        let matched: Vec<&'g Node> = match classify(pattern)? {
            Pattern::All => self.graph.nodes().filter(|n| n.is_dependency_bearing()).collect(),
            Pattern::Recursive(root) => self
                .graph
                .nodes()
                .filter(|n| {
                    target_in_package(n, |p| {
                        p == root || p.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
                    })
                })
                .collect(),
            Pattern::Package(package) => {
                self.graph.nodes().filter(|n| target_in_package(n, |p| p == package)).collect()
            }
            Pattern::Exact(id) => self.graph.get(id).into_iter().collect(),
        };
        if matched.is_empty() {
            return Err(ResolveError::NoMatch { pattern: pattern.to_string() });
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FileDecl, GraphSnapshot, TargetDecl};

    fn fixture() -> BuildGraph {
        let target = |id: &str| TargetDecl { id: id.to_string(), ..TargetDecl::default() };
        BuildGraph::from_snapshot(GraphSnapshot {
            targets: vec![
                target("//app:main"),
                target("//app:test"),
                target("//app/server:server"),
                target("//apple:pie"),
                target("//lib"),
            ],
            files: vec![FileDecl { id: "app/main.go".into() }],
        })
        .unwrap()
    }

    fn ids(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    #[test]
    fn all_targets_excludes_files() {
        let g = fixture();
        let res = PatternResolver::new(&g).resolve_pattern(ALL_TARGETS).unwrap();
        assert_eq!(res.len(), 5);
        assert!(res.iter().all(|n| n.is_dependency_bearing()));
    }

    #[test]
    fn recursive_pattern_respects_package_boundaries() {
        let g = fixture();
        let res = PatternResolver::new(&g).resolve_pattern("//app/...").unwrap();
        assert_eq!(ids(&res), vec!["//app/server:server", "//app:main", "//app:test"]);
    }

    #[test]
    fn package_pattern_and_shorthand_labels() {
        let g = fixture();
        let r = PatternResolver::new(&g);
        assert_eq!(ids(&r.resolve_pattern("//app:all").unwrap()), vec!["//app:main", "//app:test"]);
        assert_eq!(ids(&r.resolve_pattern("//app:*").unwrap()), vec!["//app:main", "//app:test"]);
        assert_eq!(ids(&r.resolve_pattern("//lib:all").unwrap()), vec!["//lib"]);
    }

    #[test]
    fn exact_ids_match_files_too() {
        let g = fixture();
        let res = PatternResolver::new(&g).resolve_pattern("app/main.go").unwrap();
        assert_eq!(ids(&res), vec!["app/main.go"]);
    }

    #[test]
    fn unmatched_and_malformed_patterns_fail() {
        let g = fixture();
        let r = PatternResolver::new(&g);
        assert!(matches!(r.resolve_pattern("//nope:x"), Err(ResolveError::NoMatch { .. })));
        assert!(matches!(r.resolve_pattern("//nope/..."), Err(ResolveError::NoMatch { .. })));
        assert!(matches!(r.resolve_pattern("app/..."), Err(ResolveError::InvalidPattern { .. })));
        assert!(matches!(r.resolve_pattern("  "), Err(ResolveError::InvalidPattern { .. })));
    }

    #[test]
    fn nested_specs_flatten_in_order_with_duplicates() {
        let g = fixture();
        let r = PatternResolver::new(&g);
        let main = g.get("//app:main").unwrap();
        let spec = TargetSpec::Many(vec![
            TargetSpec::pattern("//lib"),
            TargetSpec::Many(vec![TargetSpec::Node(main), "//app:main".into()]),
        ]);
        let res = resolve_targets(&r, &spec).unwrap();
        assert_eq!(ids(&res), vec!["//lib", "//app:main", "//app:main"]);
    }

    #[test]
    fn nested_spec_propagates_resolution_failure() {
        let g = fixture();
        let r = PatternResolver::new(&g);
        let spec = TargetSpec::Many(vec!["//lib".into(), "//missing:x".into()]);
        assert!(matches!(resolve_targets(&r, &spec), Err(QueryError::Resolution(_))));
    }
}
