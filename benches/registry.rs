//! Benchmarks for the registry hot path and exposition encoding.

use criterion::{criterion_group, criterion_main, Criterion};
use pulse_exporter::config::MetricConfig;
use pulse_exporter::registry::{DescriptorTable, MetricsRegistry};
use std::hint::black_box;

fn metric(name: &str, kind: &str, labels: &[&str]) -> MetricConfig {
    MetricConfig {
        name: name.to_string(),
        kind: kind.to_string(),
        help: format!("{name} help"),
        labels: labels.iter().map(|s| (*s).to_string()).collect(),
        ..MetricConfig::default()
    }
}

fn bench_registry() -> MetricsRegistry {
    MetricsRegistry::new(
        "bench",
        DescriptorTable::from_config(&[
            metric("requests", "counter", &[]),
            metric("inflight", "gauge", &["chain", "node"]),
            metric("throughput", "window_sum", &[]),
        ]),
    )
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/set");

    let registry = bench_registry();
    group.bench_function("counter_existing_series", |b| {
        b.iter(|| {
            registry.set(black_box("requests"), black_box(1.0), &[]);
        });
    });

    group.bench_function("gauge_labeled", |b| {
        b.iter(|| {
            registry.set(black_box("inflight"), 3.0, &["qos", "node0"]);
        });
    });

    group.bench_function("window_sum_accumulate", |b| {
        b.iter(|| {
            registry.set(black_box("throughput"), 2.0, &[]);
        });
    });

    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/collect");

    let registry = bench_registry();
    registry.set("requests", 100.0, &[]);
    for node in 0..32 {
        let node = format!("node{node}");
        registry.set("inflight", 1.0, &["qos", &node]);
    }

    group.bench_function("collect_33_series", |b| {
        b.iter(|| {
            black_box(registry.collect());
        });
    });

    group.bench_function("encode_text_33_series", |b| {
        b.iter(|| {
            black_box(registry.encode_text());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_collect);
criterion_main!(benches);
