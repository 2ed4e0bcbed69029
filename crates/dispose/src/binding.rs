//! Ambient binding of the active [`ResourceContext`]
//!
//! # Storage
//!
//! When the `async` feature is enabled, the binding uses `tokio::task_local!`
//! storage and survives across `.await` points in multi-thread Tokio runtimes.
//!
//! When the `async` feature is disabled, the binding uses `thread_local!`
//! storage (suitable for synchronous code or single-thread runtimes).
//!
//! Either way a nested scope restores the previous binding on exit, including
//! when the scope unwinds.

use std::sync::Arc;

use crate::context::ResourceContext;

thread_local! {
    /// Context used by stack tracking outside any scope. No scope drains it.
    static DETACHED: Arc<ResourceContext> = Arc::new(ResourceContext::new());
}

#[cfg(feature = "async")]
mod storage {
    use super::*;
    use std::future::Future;

    tokio::task_local! {
        static CURRENT: Arc<ResourceContext>;
    }

    #[inline]
    pub fn current() -> Option<Arc<ResourceContext>> {
        CURRENT.try_with(Arc::clone).ok()
    }

    pub fn with_context_sync<R>(ctx: Arc<ResourceContext>, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(ctx, f)
    }

    pub async fn with_context<F: Future>(ctx: Arc<ResourceContext>, f: F) -> F::Output {
        CURRENT.scope(ctx, f).await
    }
}

#[cfg(not(feature = "async"))]
mod storage {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static CURRENT: RefCell<Option<Arc<ResourceContext>>> = const { RefCell::new(None) };
    }

    /// Puts the previous binding back when dropped.
    struct Restore(Option<Arc<ResourceContext>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0.take();
            CURRENT.with(|cell| *cell.borrow_mut() = prev);
        }
    }

    #[inline]
    pub fn current() -> Option<Arc<ResourceContext>> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    pub fn with_context_sync<R>(ctx: Arc<ResourceContext>, f: impl FnOnce() -> R) -> R {
        let prev = CURRENT.with(|cell| cell.borrow_mut().replace(ctx));
        let _restore = Restore(prev);
        f()
    }
}

pub(crate) use storage::*;

/// Whether a scope is open on the current thread (or task, with `async`).
#[inline]
pub fn is_scope_open() -> bool {
    current().is_some()
}

/// The context bound by the innermost open scope, if any.
pub fn current_context() -> Option<Arc<ResourceContext>> {
    current()
}

/// The context stack operations act on: the bound one, or this thread's
/// detached context when no scope is open.
pub(crate) fn active() -> (Arc<ResourceContext>, bool) {
    match current() {
        Some(ctx) => (ctx, true),
        None => (detached(), false),
    }
}

/// This thread's detached context.
pub(crate) fn detached() -> Arc<ResourceContext> {
    DETACHED.with(Arc::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_by_default() {
        assert!(!is_scope_open());
        assert!(current_context().is_none());
        let (ctx, bound) = active();
        assert!(!bound);
        assert!(Arc::ptr_eq(&ctx, &detached()));
    }

    #[test]
    fn nested_binding_restores_outer() {
        let outer = Arc::new(ResourceContext::new());
        let inner = Arc::new(ResourceContext::new());
        with_context_sync(Arc::clone(&outer), || {
            with_context_sync(Arc::clone(&inner), || {
                assert!(Arc::ptr_eq(&current().unwrap(), &inner));
            });
            assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        });
        assert!(!is_scope_open());
    }

    #[test]
    fn binding_restored_after_panic() {
        let outer = Arc::new(ResourceContext::new());
        with_context_sync(Arc::clone(&outer), || {
            let result = std::panic::catch_unwind(|| {
                with_context_sync(Arc::new(ResourceContext::new()), || panic!("inner"));
            });
            assert!(result.is_err());
            assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        });
    }
}
