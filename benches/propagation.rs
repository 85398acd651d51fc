//! Benchmark: tick throughput over linear chains and fan-outs, comparing
//! the always-propagate and on-change policies.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tickflow::{unconnected, Connectable, Graph, NodeHandle, OnChange};

fn bump(x: i64) -> i64 {
    x + 1
}

fn chain_always(graph: &Graph, depth: usize) -> NodeHandle<tickflow::Node<tickflow::Always, fn(i64) -> i64, (i64,)>> {
    let head = graph.node().connect(bump as fn(i64) -> i64, (unconnected(),));
    let mut tail = head.clone();
    for _ in 1..depth {
        tail = graph.node().connect(bump as fn(i64) -> i64, (tail.source(),));
    }
    while graph.tick(None) {}
    head
}

fn chain_on_change(graph: &Graph, depth: usize) -> NodeHandle<tickflow::Node<OnChange, fn(i64) -> i64, (i64,)>> {
    let head = graph
        .node()
        .propagate::<OnChange>()
        .connect(bump as fn(i64) -> i64, (unconnected(),));
    let mut tail = head.clone();
    for _ in 1..depth {
        tail = graph
            .node()
            .propagate::<OnChange>()
            .connect(bump as fn(i64) -> i64, (tail.source(),));
    }
    while graph.tick(None) {}
    head
}

fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for depth in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("always", depth), &depth, |b, &depth| {
            let graph = Graph::new();
            let head = chain_always(&graph, depth);
            let (input,) = head.inputs();
            let mut value = 0i64;
            b.iter(|| {
                value += 1;
                input.append(&graph, black_box(value));
                while graph.tick(None) {}
            });
        });

        group.bench_with_input(BenchmarkId::new("on_change", depth), &depth, |b, &depth| {
            let graph = Graph::new();
            let head = chain_on_change(&graph, depth);
            let (input,) = head.inputs();
            let mut value = 0i64;
            b.iter(|| {
                value += 1;
                input.append(&graph, black_box(value));
                while graph.tick(None) {}
            });
        });

        // an unchanged input cuts the chain off at the first node
        group.bench_with_input(BenchmarkId::new("on_change_repeat", depth), &depth, |b, &depth| {
            let graph = Graph::new();
            let head = chain_on_change(&graph, depth);
            let (input,) = head.inputs();
            b.iter(|| {
                input.append(&graph, black_box(7));
                while graph.tick(None) {}
            });
        });
    }

    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("always", width), &width, |b, &width| {
            let graph = Graph::new();
            let source = graph.node().connect(bump as fn(i64) -> i64, (unconnected(),));
            let leaves: Vec<_> = (0..width)
                .map(|_| graph.node().connect(bump as fn(i64) -> i64, (source.source(),)))
                .collect();
            while graph.tick(None) {}

            let (input,) = source.inputs();
            let mut value = 0i64;
            b.iter(|| {
                value += 1;
                input.append(&graph, black_box(value));
                while graph.tick(None) {}
            });
            drop(leaves);
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_chain, benchmark_fan_out);
criterion_main!(benches);
