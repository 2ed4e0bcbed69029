// Track / release throughput.
//
// Measures the compare-and-swap context with no-op dispose actions, so only
// the bookkeeping cost shows up.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nebula_dispose::{
    Collector, DisposeAction, FinalizationHost, ResourceContext, gc_track_with, stack_release,
    stack_track, with_scope,
};

fn scope_track_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_track_drain");
    for size in [1usize, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                with_scope(|| {
                    for i in 0..size {
                        stack_track(Arc::new(i), DisposeAction::noop()).unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

fn track_then_release(c: &mut Criterion) {
    c.bench_function("track_then_release", |b| {
        b.iter(|| {
            with_scope(|| {
                let item = stack_track(Arc::new(0u64), DisposeAction::noop()).unwrap();
                stack_release(black_box(&item)).unwrap();
            });
        });
    });
}

fn contended_context(c: &mut Criterion) {
    c.bench_function("contended_context_4_threads", |b| {
        b.iter(|| {
            let ctx = Arc::new(ResourceContext::new());
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let ctx = Arc::clone(&ctx);
                    s.spawn(move || {
                        for i in 0..64u32 {
                            let item = ctx.track(Arc::new(i), DisposeAction::noop()).unwrap();
                            ctx.release(&item).unwrap();
                        }
                    });
                }
            });
            black_box(ctx.len())
        });
    });
}

fn gc_register_collect(c: &mut Criterion) {
    c.bench_function("gc_register_collect_64", |b| {
        let collector = Collector::with_sweep_interval(None);
        b.iter(|| {
            for i in 0..64u32 {
                drop(gc_track_with(&collector, Arc::new(i), DisposeAction::noop()));
            }
            black_box(collector.collect().finalized)
        });
    });
}

criterion_group!(
    benches,
    scope_track_drain,
    track_then_release,
    contended_context,
    gc_register_collect
);
criterion_main!(benches);
