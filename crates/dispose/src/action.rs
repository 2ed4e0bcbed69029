//! Dispose actions and the `Dispose` trait

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{BoxError, Error, Result};

type Callback = Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>;

/// Resources that know how to release themselves.
///
/// Implementing this makes the item usable as its own default dispose action
/// when stack-tracked. GC tracking never uses it implicitly, because the
/// default action would hold the item strongly and keep it reachable forever.
pub trait Dispose {
    /// Release the underlying resource.
    fn dispose(&self) -> std::result::Result<(), BoxError>;
}

/// A zero-argument callable that releases one resource.
///
/// The action is consumed when it runs, so it can fire at most once.
pub struct DisposeAction {
    callback: Callback,
}

impl DisposeAction {
    /// Create an action from a fallible closure.
    pub fn new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            callback: Box::new(move || f().map_err(Into::into)),
        }
    }

    /// Create an action from a closure that cannot fail.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Box::new(move || {
                f();
                Ok(())
            }),
        }
    }

    /// An action that does nothing.
    pub fn noop() -> Self {
        Self::from_fn(|| {})
    }

    /// The item's own [`Dispose`] implementation as an action.
    ///
    /// The returned action holds `item` strongly.
    pub fn of<T>(item: Arc<T>) -> Self
    where
        T: Dispose + Send + Sync + 'static,
    {
        Self::new(move || item.dispose())
    }

    /// Run the action, turning both `Err` returns and panics into [`Error`].
    ///
    /// `item` is the type name used in the resulting error and log fields.
    pub(crate) fn run(self, item: &'static str) -> Result<()> {
        match panic::catch_unwind(AssertUnwindSafe(self.callback)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(Error::disposal(item, source)),
            Err(payload) => Err(Error::DisposePanicked {
                item,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for DisposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeAction").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Dispose for Counter {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn from_fn_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_c = Arc::clone(&hits);
        let action = DisposeAction::from_fn(move || {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });
        action.run("test").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn err_becomes_disposal_error() {
        let action = DisposeAction::new(|| Err("boom"));
        let err = action.run("Socket").unwrap_err();
        assert!(matches!(err, Error::Disposal { item: "Socket", .. }));
    }

    #[test]
    fn panic_becomes_disposal_error() {
        let action = DisposeAction::from_fn(|| panic!("handle poisoned"));
        let err = action.run("Socket").unwrap_err();
        match err {
            Error::DisposePanicked { message, .. } => assert_eq!(message, "handle poisoned"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn of_uses_dispose_impl() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        DisposeAction::of(Arc::clone(&counter)).run("Counter").unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
