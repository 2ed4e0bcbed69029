//! Scoped contexts that are drained when the scope ends
//!
//! [`with_scope`] binds a fresh [`ResourceContext`] for the duration of a
//! closure and disposes everything still tracked in it before returning, on
//! normal return and on unwind alike. [`with_scope_capturing`] hands the
//! remaining entries back to the caller instead.

use std::sync::Arc;

use crate::binding;
use crate::context::ResourceContext;
use crate::entry::Entry;
use crate::error::Error;

/// Drains its context when closed or dropped.
struct ScopeGuard {
    ctx: Arc<ResourceContext>,
    armed: bool,
}

impl ScopeGuard {
    fn new(ctx: Arc<ResourceContext>) -> Self {
        tracing::debug!(seeded = ctx.len(), "scope opened");
        Self { ctx, armed: true }
    }

    /// Drain now and report failures.
    fn close(mut self) -> Vec<Error> {
        self.armed = false;
        drain_fully(&self.ctx)
    }

    /// Leave the context as it is.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.armed {
            // The binding may already be gone (cancelled async scope), so
            // rebind: actions that track sub-resources must land here.
            // Failures are already logged; the unwinding error takes precedence.
            let ctx = Arc::clone(&self.ctx);
            let errors = binding::with_context_sync(ctx, || drain_fully(&self.ctx));
            tracing::debug!(
                discarded = errors.len(),
                panicking = std::thread::panicking(),
                "scope drained on abnormal exit"
            );
        }
    }
}

/// Dispose until the context stays empty.
///
/// Dispose actions may track new entries into the context being drained;
/// those are picked up by the next round.
fn drain_fully(ctx: &ResourceContext) -> Vec<Error> {
    let mut drained = 0usize;
    let mut errors = Vec::new();
    loop {
        let batch = ctx.take();
        if batch.is_empty() {
            break;
        }
        drained += batch.len();
        for entry in batch {
            let item = entry.type_name();
            if let Err(err) = entry.dispose() {
                tracing::warn!(item, error = %err, "dispose action failed");
                errors.push(err);
            }
        }
    }
    tracing::debug!(drained, failed = errors.len(), "scope closed");
    errors
}

/// Run `body` in a fresh scope and drain it before returning.
///
/// Disposal failures are logged and discarded. If `body` panics, the scope is
/// drained during unwinding and the original panic continues. A dispose action
/// that panics during that drain is caught and collected like any other
/// failure. Only a panic raised outside any action, such as from the `Drop` of
/// the tracked item itself, aborts the process.
pub fn with_scope<R>(body: impl FnOnce() -> R) -> R {
    with_scope_report(body).0
}

/// Like [`with_scope`], but also returns the disposal failures from the drain.
pub fn with_scope_report<R>(body: impl FnOnce() -> R) -> (R, Vec<Error>) {
    let ctx = Arc::new(ResourceContext::new());
    binding::with_context_sync(Arc::clone(&ctx), move || {
        let guard = ScopeGuard::new(ctx);
        let value = body();
        let errors = guard.close();
        (value, errors)
    })
}

/// Result of [`with_scope_capturing`].
#[derive(Debug)]
pub struct Captured<R> {
    /// What the body returned
    pub value: R,
    /// Entries still tracked when the body finished, newest first
    pub entries: Vec<Entry>,
}

/// Run `body` in a scope seeded with `initial`, without draining it.
///
/// The entries still tracked when `body` returns are handed back, transferring
/// the obligation to dispose them to the caller. If `body` panics, the scope is
/// drained before the panic continues.
pub fn with_scope_capturing<R>(
    initial: impl IntoIterator<Item = Entry>,
    body: impl FnOnce() -> R,
) -> Captured<R> {
    let ctx = Arc::new(ResourceContext::with_entries(initial));
    binding::with_context_sync(Arc::clone(&ctx), move || {
        let guard = ScopeGuard::new(Arc::clone(&ctx));
        let value = body();
        guard.disarm();
        Captured {
            value,
            entries: ctx.take(),
        }
    })
}

/// Run the future `body` in a fresh scope and drain it when it completes.
///
/// The scope stays bound across `.await` points. If the future panics or is
/// dropped before completion, the scope is drained at that point.
#[cfg(feature = "async")]
pub async fn with_scope_async<F>(body: F) -> F::Output
where
    F: std::future::Future,
{
    let ctx = Arc::new(ResourceContext::new());
    let guard = ScopeGuard::new(Arc::clone(&ctx));
    let value = binding::with_context(Arc::clone(&ctx), body).await;
    binding::with_context_sync(ctx, move || guard.close());
    value
}
