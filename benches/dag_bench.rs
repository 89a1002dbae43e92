use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pdag::*;

// Scenario programs are the demos shipped with the repo.

const BLUR: &str = include_str!("../demos/blur.hpl");
const HISTOGRAM: &str = include_str!("../demos/histogram.hpl");
const UNSHARP: &str = include_str!("../demos/unsharp.hpl");

fn scenarios() -> [(&'static str, &'static str); 3] {
    [
        ("blur", BLUR),
        ("histogram", HISTOGRAM),
        ("unsharp", UNSHARP),
    ]
}

/// A chain of `n` 3-tap stencils, alternating between the two axes.
fn generate_stencil_chain(n: usize) -> String {
    let mut src = String::from("input uint16 in(x, y)\n");
    for i in 0..n {
        let prev = if i == 0 {
            "in".to_string()
        } else {
            format!("s{}", i - 1)
        };
        let (lo, hi) = if i % 2 == 0 {
            ("x - 1, y", "x + 1, y")
        } else {
            ("x, y - 1", "x, y + 1")
        };
        src.push_str(&format!(
            "func s{i}(x, y) = {prev}({lo}) + {prev}(x, y) + {prev}({hi})\n"
        ));
    }
    src.push_str(&format!(
        "output s{} estimate(x = [0, 1024], y = [0, 1024])\n",
        n - 1
    ));
    src
}

fn build(source: &str) -> dag::FunctionDAG {
    match driver::analyze_source(source, &target::Target::default()) {
        Ok(a) => a.dag,
        Err(diags) => panic!("benchmark scenario must analyze: {:?}", diags),
    }
}

// Parser latency for the demo programs.
fn bench_parse_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_latency");

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let result = parser::parse(black_box(source));
                black_box(&result.program);
            });
        });
    }

    group.finish();
}

// Graph construction from a lowered pipeline.
fn bench_dag_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_construction");
    let target = target::Target::default();

    for (name, source) in scenarios() {
        let (_, pipeline) = driver::lower_source(source).expect("scenario must lower");
        group.bench_with_input(BenchmarkId::from_parameter(name), &pipeline, |b, p| {
            b.iter(|| black_box(dag::FunctionDAG::new(black_box(p), &target)));
        });
    }

    group.finish();
}

// Construction cost as the pipeline grows.
fn bench_dag_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_scaling");
    let target = target::Target::default();

    for n in [4usize, 16, 64] {
        let source = generate_stencil_chain(n);
        let (_, pipeline) = driver::lower_source(&source).expect("chain must lower");
        group.bench_with_input(BenchmarkId::from_parameter(n), &pipeline, |b, p| {
            b.iter(|| black_box(dag::FunctionDAG::new(black_box(p), &target)));
        });
    }

    group.finish();
}

// Footprint expansion and region propagation with everything at root.
fn bench_bounds_at_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounds_at_root");

    for (name, source) in scenarios() {
        let d = build(source);
        group.bench_function(name, |b| {
            b.iter(|| black_box(d.bounds_at_root().len()));
        });
    }

    let chain = build(&generate_stencil_chain(32));
    group.bench_function("stencil_chain_32", |b| {
        b.iter(|| black_box(chain.bounds_at_root().len()));
    });

    group.finish();
}

// Pooled bound tuples: checkout, write, release.
fn bench_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena");
    let layout = arena::Layout::new(3, &[4, 5]);

    group.bench_function("make_release", |b| {
        b.iter(|| {
            let mut bound = layout.make();
            *bound.region_required_mut(0) = span::Span::new(0, 63, true);
            black_box(bound.region_required(0).extent());
        });
    });

    group.bench_function("copy_on_write", |b| {
        let base = layout.make();
        b.iter_batched(
            || base.clone(),
            |mut shared| {
                *shared.region_computed_mut(1) = span::Span::new(-1, 64, false);
                black_box(shared)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_latency,
    bench_dag_construction,
    bench_dag_scaling,
    bench_bounds_at_root,
    bench_arena,
);
criterion_main!(benches);
