// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the write path, context queries and synchronization.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use serde_json::json;
use tempfile::TempDir;

use codi_perf::analytics::{AggregateFilter, AnalyticsStore, GroupBy};
use codi_perf::record::{bounded_json, layers, ExecutionRecord};
use codi_perf::store::RecordStore;
use codi_perf::sync::Synchronizer;

fn sample_record(i: usize) -> ExecutionRecord {
    ExecutionRecord::new(layers::TOOL, format!("tool_{}", i % 8))
        .with_duration_ms((i % 250) as f64)
        .with_memory_mb((i % 32) as f64)
        .with_metadata("attempt", i as u64)
}

/// Benchmark single-record durable writes.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_store/write");
    let temp = TempDir::new().unwrap();
    let store = RecordStore::open(&temp.path().join("records.redb")).unwrap();

    let mut i = 0;
    group.bench_function("write", |b| {
        b.iter(|| {
            i += 1;
            store.write(black_box(sample_record(i))).unwrap()
        });
    });

    let large = json!({ "rows": (0..1000).collect::<Vec<_>>(), "text": "x".repeat(10_000) });
    group.bench_function("bounded_json/large", |b| {
        b.iter(|| bounded_json(black_box(&large)));
    });

    group.finish();
}

/// Benchmark context lookups over a populated store.
fn bench_query_by_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_store/query_by_context");
    let temp = TempDir::new().unwrap();
    let store = RecordStore::open(&temp.path().join("records.redb")).unwrap();
    for i in 0..2_000 {
        store.write(sample_record(i)).unwrap();
    }

    for limit in [10, 100, 250] {
        group.bench_with_input(BenchmarkId::new("limit", limit), &limit, |b, &limit| {
            b.iter(|| store.query_by_context(layers::TOOL, "tool_3", black_box(limit)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark draining a backlog into the analytics store.
fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");
    group.sample_size(10);

    for batch_size in [50, 500] {
        group.bench_with_input(
            BenchmarkId::new("drain_1000", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        let temp = TempDir::new().unwrap();
                        let records =
                            Arc::new(RecordStore::open(&temp.path().join("records.redb")).unwrap());
                        for i in 0..1_000 {
                            records.write(sample_record(i)).unwrap();
                        }
                        let analytics = Arc::new(AnalyticsStore::open_in_memory().unwrap());
                        let sync = Synchronizer::new(records, analytics).with_batch_size(batch_size);
                        (temp, sync)
                    },
                    |(_temp, sync)| sync.run().unwrap(),
                    BatchSize::PerIteration,
                );
            },
        );
    }

    let analytics = AnalyticsStore::open_in_memory().unwrap();
    let rows: Vec<ExecutionRecord> = (0..5_000)
        .map(|i| sample_record(i).with_id(format!("r{}", i)))
        .collect();
    analytics.upsert_batch(&rows).unwrap();
    group.bench_function("aggregate/component", |b| {
        b.iter(|| {
            analytics
                .aggregate(black_box(&AggregateFilter::all()), GroupBy::Component)
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_query_by_context, bench_sync);
criterion_main!(benches);
