//! Benchmarks for the reactor dispatch path.
//!
//! Run with: cargo bench -p ripple-core -- dispatch

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use ripple_core::Reactor;

// ---------------------------------------------------------------------------
// 1. Notify with a flat listener list
// ---------------------------------------------------------------------------

fn bench_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/notify");

    for count in [1usize, 8, 64, 512] {
        group.throughput(Throughput::Elements(count as u64));

        let reactor: Reactor<u64> = Reactor::new();
        let sum = Rc::new(Cell::new(0u64));
        let mut conns = Vec::with_capacity(count);
        for _ in 0..count {
            let sum = Rc::clone(&sum);
            conns.push(reactor.connect(move |v| sum.set(sum.get().wrapping_add(*v))));
        }

        group.bench_with_input(BenchmarkId::new("listeners", count), &(), |b, _| {
            b.iter(|| {
                reactor.notify(1);
                black_box(sum.get())
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Connect + close churn
// ---------------------------------------------------------------------------

fn bench_connect_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/connect_close");

    for count in [8usize, 64, 512] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("churn", count), &(), |b, _| {
            b.iter(|| {
                let reactor: Reactor<u64> = Reactor::new();
                let conns: Vec<_> = (0..count).map(|_| reactor.connect(|_| {})).collect();
                for conn in &conns {
                    conn.close();
                }
                black_box(reactor.has_connections())
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Prioritized insertion (sorted position search)
// ---------------------------------------------------------------------------

fn bench_prioritized_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/prioritized_connect");
    let count = 256usize;
    group.throughput(Throughput::Elements(count as u64));

    group.bench_function("interleaved", |b| {
        b.iter(|| {
            let reactor: Reactor<u64> = Reactor::new();
            let conns: Vec<_> = (0..count)
                // Deterministic scatter over a small priority band.
                .map(|i| {
                    reactor
                        .connect(|_| {})
                        .at_prio((i.wrapping_mul(7) % 16) as i32)
                })
                .collect();
            black_box(conns.len())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_notify,
    bench_connect_close,
    bench_prioritized_connect,
);
criterion_main!(benches);
