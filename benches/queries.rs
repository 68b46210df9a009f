use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use depquery::graph::{BuildGraph, GraphSnapshot, RuleDecl, TargetDecl};
use depquery::query::eval::QueryEngine;
use depquery::query::{DependsOnQuery, DepsQuery, Query};

// Layered graph: each target depends on the next `fanout` targets and owns two sources.
fn synthetic_graph(targets: usize, fanout: usize) -> BuildGraph {
    let decls = (0..targets)
        .map(|i| {
            let mut inputs: Vec<String> =
                (1..=fanout).filter(|d| i + d < targets).map(|d| format!("//pkg{}:t{}", (i + d) % 16, i + d)).collect();
            inputs.push(format!("pkg{}/t{i}.go", i % 16));
            inputs.push(format!("pkg{}/t{i}_extra.go", i % 16));
            TargetDecl {
                id: format!("//pkg{}:t{i}", i % 16),
                rule: Some(RuleDecl {
                    config_name: Some(if i % 3 == 0 { "go_binary" } else { "go_library" }.to_string()),
                    builds: [("build".to_string(), vec![format!("out/t{i}")])].into_iter().collect(),
                }),
                inputs,
                ..TargetDecl::default()
            }
        })
        .collect();
    BuildGraph::from_snapshot(GraphSnapshot { targets: decls, files: vec![] }).expect("synthetic graph")
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    for size in [200usize, 2000] {
        let graph = synthetic_graph(size, 4);
        let root = graph.get("//pkg0:t0").expect("root target");
        let leaf = graph.get("pkg1/t1.go").expect("leaf file");

        group.bench_function(BenchmarkId::new("deps", size), |b| {
            b.iter(|| black_box(DepsQuery::new(vec![root]).run(black_box(&graph)).len()))
        });

        group.bench_function(BenchmarkId::new("depends_on", size), |b| {
            b.iter(|| black_box(DependsOnQuery::new(vec![leaf]).run(black_box(&graph)).len()))
        });

        let engine = QueryEngine::new(&graph);
        group.bench_function(BenchmarkId::new("evaluate_composed", size), |b| {
            b.iter(|| {
                let res = engine.evaluate(black_box("outputs(kind('go_binary', deps(//pkg0:t0)))"));
                black_box(res.map_or(0, |r| r.len()))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
