use depquery::app::run_cli;
use depquery::cli::{Cli, Commands, OutputFormat};
use std::path::PathBuf;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/build-graph.json")
}

fn query(expr: &str, graph: Option<PathBuf>) -> Cli {
    Cli {
        quiet: true,
        verbose: false,
        command: Commands::Query {
            expr: expr.to_string(),
            graph,
            config: None,
            format: Some(OutputFormat::Json),
            build_kind: None,
            offset: 0,
            limit: None,
        },
    }
}

#[test]
fn query_succeeds_in_process() {
    assert_eq!(run_cli(query("deps(//app:main)", Some(fixture_path()))), 0);
}

#[test]
fn failing_query_returns_1() {
    assert_eq!(run_cli(query("kind('(', //...)", Some(fixture_path()))), 1);
    assert_eq!(run_cli(query("//app:main", Some(PathBuf::from("/nonexistent/graph.json")))), 1);
}

#[test]
fn offset_past_the_end_is_an_empty_page() {
    let mut cli = query("//...", Some(fixture_path()));
    if let Commands::Query { offset, limit, .. } = &mut cli.command {
        *offset = 100;
        *limit = Some(5);
    }
    assert_eq!(run_cli(cli), 0);
}

#[test]
fn targets_in_process() {
    let cli = Cli {
        quiet: false,
        verbose: false,
        command: Commands::Targets {
            pattern: "//native:all".into(),
            graph: Some(fixture_path()),
            config: None,
            format: Some(OutputFormat::Text),
        },
    };
    assert_eq!(run_cli(cli), 0);
}

#[test]
fn huge_limit_with_offset_does_not_overflow() {
    let mut cli = query("//...", Some(fixture_path()));
    if let Commands::Query { offset, limit, .. } = &mut cli.command {
        *offset = 1;
        *limit = Some(usize::MAX);
    }
    assert_eq!(run_cli(cli), 0);
}
