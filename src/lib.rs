//! depquery: query engine over a resolved build dependency graph.
//!
//! A graph snapshot holds targets (build rule instances) and the raw files
//! they consume. Queries walk it forward (`deps`), backward (`dependsOn`),
//! filter by rule kind (`kind`) or edge kind (`filterByKind`), and map targets
//! to their build outputs (`outputs`) or direct file inputs (`files`).
//!
//! # Quickstart (Library)
//! ```no_run
//! use depquery::graph::BuildGraph;
//! use depquery::query::eval::QueryEngine;
//!
//! let graph = BuildGraph::load_json(std::path::Path::new("build-graph.json")).expect("load graph");
//! let engine = QueryEngine::new(&graph);
//! if let Some(files) = engine.evaluate("files(deps(//app:main))") {
//!     for node in files {
//!         println!("{}", node.id());
//!     }
//! }
//! ```
//!
//! # Quickstart (CLI)
//! ```text
//! depquery query 'kind("go_.*", deps(//app:main))' --graph build-graph.json
//! depquery targets //app/... --graph build-graph.json --format json
//! ```
//!
//! `evaluate` is all-or-nothing: a pattern that matches nothing, a malformed
//! query or a failing rule is logged and yields `None`. Use `try_evaluate` to
//! get the error instead.
pub mod app;
pub mod cli;
pub mod errors;
pub mod graph;
pub mod query;
pub mod utils;
