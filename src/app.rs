use crate::cli::{Cli, Commands, OutputFormat};
use crate::graph::resolver::{PatternResolver, TargetResolver};
use crate::graph::{BuildGraph, Node, DEFAULT_BUILD_KIND};
use crate::query::eval::QueryEngine;
use crate::utils::config::{load_config_at, load_config_near, Config};
use clap::CommandFactory;
use clap_complete::generate;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// One result line, as printed in both output formats.
#[derive(Debug, Serialize)]
pub struct NodeRow<'a> {
    pub id: &'a str,
    pub node: &'static str,
    pub kind: Option<&'a str>,
}

impl<'a> From<&'a Node> for NodeRow<'a> {
    fn from(node: &'a Node) -> Self {
        Self {
            id: node.id().as_str(),
            node: node.label(),
            kind: node.as_target().and_then(|t| t.config_name()),
        }
    }
}

/// Run the CLI logic in-process.
///
/// Returns an exit code: 0 on success, 1 when the graph cannot be loaded or
/// the query fails, 2 when no graph snapshot is given or configured.
#[must_use]
pub fn run_cli(cli: Cli) -> i32 {
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = env!("CARGO_PKG_NAME");
            generate(shell, &mut cmd, bin_name, &mut io::stdout());
            0
        }
        Commands::Query { expr, graph, config, format, build_kind, offset, limit } => {
            let cfg = settings(config.as_deref());
            let graph = match open_graph(graph, cfg.as_ref()) {
                Ok(g) => g,
                Err(code) => return code,
            };
            let build_kind = build_kind
                .or_else(|| cfg.as_ref().and_then(Config::build_kind).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_BUILD_KIND.to_string());
            let engine = QueryEngine::new(&graph).with_default_build_kind(build_kind);
            let results = match engine.try_evaluate(&expr) {
                Ok(nodes) => nodes,
                Err(e) => {
                    tracing::debug!(query = %expr, error = ?e, "query failed");
                    eprintln!("Query failed: {e}");
                    return 1;
                }
            };
            let start = offset.min(results.len());
            let end = match limit {
                Some(l) => start.saturating_add(l).min(results.len()),
                None => results.len(),
            };
            if let Err(code) = print_nodes(&results[start..end], start, output_format(format, cfg.as_ref())) {
                return code;
            }
            if !cli.quiet {
                eprintln!("{} of {} result(s)", end - start, results.len());
            }
            0
        }
        Commands::Targets { pattern, graph, config, format } => {
            let cfg = settings(config.as_deref());
            let graph = match open_graph(graph, cfg.as_ref()) {
                Ok(g) => g,
                Err(code) => return code,
            };
            let nodes = match PatternResolver::new(&graph).resolve_pattern(&pattern) {
                Ok(nodes) => nodes,
                Err(e) => {
                    eprintln!("Resolve failed: {e}");
                    return 1;
                }
            };
            if let Err(code) = print_nodes(&nodes, 0, output_format(format, cfg.as_ref())) {
                return code;
            }
            if !cli.quiet {
                eprintln!("{} node(s) match {pattern}", nodes.len());
            }
            0
        }
    }
}

// An explicit --config wins; otherwise look in the working directory.
fn settings(explicit: Option<&Path>) -> Option<Config> {
    match explicit {
        Some(path) => {
            let cfg = load_config_at(path);
            if cfg.is_none() {
                eprintln!("Warning: could not read config {}", path.display());
            }
            cfg
        }
        None => std::env::current_dir().ok().and_then(|dir| load_config_near(&dir)),
    }
}

fn open_graph(flag: Option<PathBuf>, cfg: Option<&Config>) -> Result<BuildGraph, i32> {
    let Some(path) = flag.or_else(|| cfg.and_then(Config::graph_path)) else {
        eprintln!("No graph snapshot. Pass --graph, set DEPQUERY_GRAPH, or set [graph] path in depquery.toml.");
        return Err(2);
    };
    BuildGraph::load_json(&path).map_err(|e| {
        eprintln!("Load graph failed ({}): {e}", path.display());
        1
    })
}

fn output_format(flag: Option<OutputFormat>, cfg: Option<&Config>) -> OutputFormat {
    flag.unwrap_or_else(|| match cfg.and_then(Config::default_format) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Text,
    })
}

// `start` is the page offset, so row numbers stay stable across pages.
fn print_nodes(nodes: &[&Node], start: usize, format: OutputFormat) -> Result<(), i32> {
    let rows: Vec<NodeRow<'_>> = nodes.iter().map(|n| NodeRow::from(*n)).collect();
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&rows) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("JSON encode error: {e}");
                return Err(1);
            }
        },
        OutputFormat::Text => {
            let body: Vec<Vec<String>> = rows
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    vec![
                        (start + i + 1).to_string(),
                        r.id.to_string(),
                        r.node.to_string(),
                        r.kind.unwrap_or("").to_string(),
                    ]
                })
                .collect();
            println!("{}", crate::utils::table::render(&["#", "Id", "Node", "Kind"], &body));
        }
    }
    Ok(())
}
