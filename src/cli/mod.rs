use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::graph::resolver::ALL_TARGETS;

#[derive(Debug, Parser)]
#[command(
    name = "depquery",
    version,
    about = "Query a build dependency graph",
    long_about = "Load a resolved build-graph snapshot (JSON) and evaluate queries over it: deps, dependsOn, kind, filterByKind, outputs and files, combined with lists and the set operators +, - and ^."
)]
pub struct Cli {
    /// Suppress the result summary line
    #[arg(short, long, global = true, default_value_t = false)]
    pub quiet: bool,
    /// Log debug detail to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate a query expression
    Query {
        /// Query text, e.g. 'files(deps(//app:main))'
        expr: String,
        /// Graph snapshot JSON file
        #[arg(long, env = "DEPQUERY_GRAPH")]
        graph: Option<PathBuf>,
        /// Path to a TOML configuration file (default: ./depquery.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format (default: config, then text)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Build kind for outputs(x) without an explicit kind
        #[arg(long)]
        build_kind: Option<String>,
        /// Skip the first N results
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Show at most N results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the nodes a target pattern resolves to
    Targets {
        /// Target pattern
        #[arg(default_value = ALL_TARGETS)]
        pattern: String,
        /// Graph snapshot JSON file
        #[arg(long, env = "DEPQUERY_GRAPH")]
        graph: Option<PathBuf>,
        /// Path to a TOML configuration file (default: ./depquery.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format (default: config, then text)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn targets_pattern_defaults_to_everything() {
        let cli = Cli::try_parse_from(["depquery", "targets", "--graph", "g.json"]).unwrap();
        match cli.command {
            Commands::Targets { pattern, .. } => assert_eq!(pattern, ALL_TARGETS),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["depquery", "query", "//a:b", "--format", "json", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Query { format: Some(OutputFormat::Json), .. }));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["depquery", "query", "//a:b", "--format", "xml"]).is_err());
    }
}
