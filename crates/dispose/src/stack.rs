//! Stack tracking against the ambient context
//!
//! These functions act on the context bound by the innermost open scope.
//! Outside any scope they fall back to a per-thread detached context that is
//! never drained automatically, and tracking into it logs a warning.

use std::sync::Arc;

use crate::action::{Dispose, DisposeAction};
use crate::binding;
use crate::entry::Entry;
use crate::error::{Error, Result};

/// Track `item` in the active scope, to be disposed by `action`.
///
/// Fails with [`Error::DuplicateTrack`] if the debug double-free flag is set
/// and `item` is already tracked in the active context.
pub fn stack_track<T>(item: Arc<T>, action: DisposeAction) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let (ctx, bound) = binding::active();
    if !bound {
        tracing::warn!(
            item = std::any::type_name::<T>(),
            "stack-tracked with no open scope; nothing will dispose it deterministically"
        );
    }
    ctx.track(item, action)
}

/// Track `item` in the active scope, disposed by its own [`Dispose`] impl.
pub fn stack_track_disposable<T>(item: Arc<T>) -> Result<Arc<T>>
where
    T: Dispose + Send + Sync + 'static,
{
    let action = DisposeAction::of(Arc::clone(&item));
    stack_track(item, action)
}

/// Stop tracking `item` without disposing it.
pub fn stack_ignore<T: ?Sized>(item: Arc<T>) -> Arc<T> {
    let (ctx, _) = binding::active();
    let removed = ctx.ignore(&item);
    tracing::trace!(removed = removed.len(), "stack ignore");
    item
}

/// Stop tracking every entry matching `predicate`; returns them undisposed.
pub fn stack_ignore_matching<P>(predicate: P) -> Vec<Entry>
where
    P: Fn(&Entry) -> bool,
{
    let (ctx, _) = binding::active();
    ctx.ignore_matching(predicate)
}

/// Dispose the first entry tracking `item`. Does nothing if it is not tracked.
pub fn stack_release<T: ?Sized>(item: &Arc<T>) -> Result<()> {
    let (ctx, _) = binding::active();
    ctx.release(item)
}

/// Dispose every entry in the active context matching `predicate`.
///
/// Returns the failures; none are raised.
pub fn release_all_matching<P>(predicate: P) -> Vec<Error>
where
    P: Fn(&Entry) -> bool,
{
    let (ctx, _) = binding::active();
    ctx.release_all(predicate)
}

/// Dispose every entry in the active context.
pub fn release_all() -> Vec<Error> {
    release_all_matching(|_| true)
}
