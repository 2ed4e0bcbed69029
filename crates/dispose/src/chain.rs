//! Keeping a parent resource alive for as long as a derived one

use std::sync::Arc;

use crate::action::DisposeAction;
use crate::gc::{self, Collector, FinalizationHost};

/// Keep `old_resource` reachable at least as long as `new_resource` is.
///
/// Registers a finalizer for `new_resource` whose only job is to own
/// `old_resource`. The host holds that finalizer until it fires, so the strong
/// edge to `old_resource` lives until a collection pass runs after
/// `new_resource` became unreachable. Only then can `old_resource` be reclaimed,
/// and if it is itself tracked, its own finalizer needs yet another pass.
///
/// Every link therefore delays the parent by at least one pass; deep chains
/// can outpace how often passes run.
pub fn chain<N, O>(new_resource: &Arc<N>, old_resource: Arc<O>)
where
    N: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    chain_with(Collector::global().as_ref(), new_resource, old_resource);
}

/// [`chain`] against an explicit host.
pub fn chain_with<H, N, O>(host: &H, new_resource: &Arc<N>, old_resource: Arc<O>)
where
    H: FinalizationHost + ?Sized,
    N: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    let keep_alive = DisposeAction::from_fn(move || drop(old_resource));
    gc::gc_track_with(host, Arc::clone(new_resource), keep_alive);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_outlives_child_until_pass() {
        let collector = Collector::with_sweep_interval(None);
        let parent = Arc::new(String::from("device"));
        let child = Arc::new(String::from("buffer"));
        let parent_weak = Arc::downgrade(&parent);

        chain_with(&collector, &child, parent);
        collector.collect();
        assert!(parent_weak.upgrade().is_some());

        drop(child);
        assert!(parent_weak.upgrade().is_some());

        collector.collect();
        assert!(parent_weak.upgrade().is_none());
    }
}
