use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshwatch_core::{classify, Aggregator, Ingress, Normalizer, NodeId, SourceProfile};

const NODE_LINE: &str = r#"{"type":"node_data","nodeId":7,"parentNode":3,"hopDistance":2,"rssi":-81,"snr":6.5,"temp":21.4,"humidity":48.0,"pressure":1012.6,"lat":51.5072,"lng":-0.1276,"satellites":9,"timeSource":"GPS"}"#;

/// Benchmark splitting a unit into record or console text
fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_record", |b| {
        b.iter(|| classify(black_box(NODE_LINE)));
    });

    c.bench_function("classify_console", |b| {
        b.iter(|| classify(black_box("[MESH] beacon sent, seq=1042")));
    });
}

/// Benchmark record normalization alone
fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::new(NodeId::new(1).unwrap(), SourceProfile::Serial);
    let Ingress::Record(record) = classify(NODE_LINE) else {
        panic!("benchmark line must be a record");
    };

    c.bench_function("normalize_node_data", |b| {
        b.iter(|| normalizer.normalize(black_box(&record)));
    });
}

/// Benchmark the full ingest path with varying subscriber counts
fn bench_ingest_unit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_unit");

    for subscribers in [0usize, 1, 10].iter() {
        let aggregator = Aggregator::builder().build().unwrap();
        let mut viewers: Vec<_> = (0..*subscribers).map(|_| aggregator.subscribe()).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, _| {
                b.iter(|| {
                    aggregator.ingest_unit(black_box(NODE_LINE));
                    for viewer in viewers.iter_mut() {
                        while viewer.try_recv().is_some() {}
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark ingest across a growing node population
fn bench_ingest_population(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_population");

    for nodes in [10u32, 50, 200].iter() {
        let aggregator = Aggregator::builder().build().unwrap();
        let lines: Vec<String> = (2..nodes + 2)
            .map(|id| {
                format!(
                    r#"{{"type":"node_data","nodeId":{id},"parentNode":{},"rssi":-70}}"#,
                    1 + id / 4
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(nodes), nodes, |b, _| {
            b.iter(|| {
                for line in &lines {
                    aggregator.ingest_unit(black_box(line));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_classify,
    bench_normalize,
    bench_ingest_unit,
    bench_ingest_population,
);
criterion_main!(benches);
