use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshwatch_core::{build_graph, Aggregator, NodeId, NodeRecord};

fn records(count: u32) -> BTreeMap<NodeId, NodeRecord> {
    (2..count + 2)
        .filter_map(NodeId::new)
        .map(|id| {
            let mut record = NodeRecord::new(id, 0);
            record.routing.parent = NodeId::new(1 + id.get() / 4);
            (id, record)
        })
        .collect()
}

/// Benchmark a full edge rebuild
fn bench_build_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_graph");

    for count in [10u32, 100, 1000].iter() {
        let records = records(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| build_graph(black_box(records)));
        });
    }
    group.finish();
}

/// Benchmark repeated reads with no change in between
fn bench_cached_reads(c: &mut Criterion) {
    let aggregator = Aggregator::builder().build().unwrap();
    for id in 2..202 {
        aggregator.ingest_unit(&format!(
            r#"{{"type":"node_data","nodeId":{id},"parentNode":{}}}"#,
            1 + id / 4
        ));
    }

    c.bench_function("topology_cached_read", |b| {
        b.iter(|| black_box(aggregator.topology()));
    });
}

/// Benchmark a read following every change
fn bench_read_after_change(c: &mut Criterion) {
    let aggregator = Aggregator::builder().build().unwrap();
    for id in 2..202 {
        aggregator.ingest_unit(&format!(r#"{{"type":"node_data","nodeId":{id}}}"#));
    }

    c.bench_function("topology_read_after_change", |b| {
        b.iter(|| {
            aggregator.ingest_unit(r#"{"type":"node_data","nodeId":2,"parentNode":3}"#);
            black_box(aggregator.topology())
        });
    });
}

criterion_group!(
    benches,
    bench_build_graph,
    bench_cached_reads,
    bench_read_after_change,
);
criterion_main!(benches);
