//! GC tracking, the combined GC + stack registration, and lifetime chaining.
//!
//! Tests that need exact control over when collection passes run use their own
//! `Collector`; the global one is shared by every test in this binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nebula_dispose::{
    Collector, DisposeAction, Error, FinalizationHost, TrackOptions, TrackType, chain, gc_track,
    gc_track_and_stack_track_with, track, with_scope,
};

fn counting(hits: &Arc<AtomicUsize>) -> DisposeAction {
    let hits = Arc::clone(hits);
    DisposeAction::from_fn(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

fn private_host() -> Arc<dyn FinalizationHost> {
    Arc::new(Collector::with_sweep_interval(None))
}

#[test]
fn global_gc_track_fires_after_unreachable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let item = gc_track(Arc::new(vec![0u8; 64]), counting(&hits));

    Collector::global().collect();
    assert_eq!(hits.load(Ordering::SeqCst), 0, "reachable items are never finalized");

    drop(item);
    Collector::global().collect();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Collector::global().collect();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn auto_outside_scope_uses_gc() {
    let hits = Arc::new(AtomicUsize::new(0));
    let item = track(
        Arc::new(String::from("texture")),
        TrackOptions::new().dispose_action(counting(&hits)),
    )
    .unwrap();

    drop(item);
    Collector::global().collect();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn explicit_gc_inside_scope_is_not_drained() {
    let hits = Arc::new(AtomicUsize::new(0));
    let item = with_scope(|| {
        track(
            Arc::new(5u16),
            TrackOptions::new()
                .track_type(TrackType::Gc)
                .dispose_action(counting(&hits)),
        )
        .unwrap()
    });
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    drop(item);
    Collector::global().collect();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn gc_requires_explicit_action() {
    let err = with_scope(|| {
        track(
            Arc::new(5u16),
            TrackOptions::new().track_type(TrackType::Gc),
        )
        .unwrap_err()
    });
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn scope_release_cancels_finalizer() {
    let host = private_host();
    let hits = Arc::new(AtomicUsize::new(0));

    let item = with_scope(|| {
        gc_track_and_stack_track_with(&host, Arc::new("socket"), counting(&hits)).unwrap()
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1, "scope exit runs the action");
    assert_eq!(host.pending(), 0);

    drop(item);
    assert_eq!(host.collect().finalized, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn finalizer_first_makes_scope_release_a_noop() {
    let host = private_host();
    let hits = Arc::new(AtomicUsize::new(0));

    with_scope(|| {
        let item =
            gc_track_and_stack_track_with(&host, Arc::new("socket"), counting(&hits)).unwrap();
        drop(item);
        assert_eq!(host.collect().finalized, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    });

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn chain_keeps_parent_until_child_finalized() {
    let parent = Arc::new(String::from("device"));
    let parent_weak = Arc::downgrade(&parent);
    let child = Arc::new(String::from("command buffer"));

    chain(&child, parent);

    // the original owner dropped its reference, the chain still holds it
    Collector::global().collect();
    assert!(parent_weak.upgrade().is_some());

    drop(child);
    Collector::global().collect();
    assert!(parent_weak.upgrade().is_none());
}

#[test]
fn chained_parent_finalizer_needs_another_pass() {
    let collector = Collector::with_sweep_interval(None);
    let hits = Arc::new(AtomicUsize::new(0));

    let parent = nebula_dispose::gc_track_with(&collector, Arc::new(1u64), counting(&hits));
    let child = Arc::new(2u64);
    nebula_dispose::chain_with(&collector, &child, parent);

    drop(child);
    assert_eq!(collector.collect().finalized, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert_eq!(collector.collect().finalized, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
