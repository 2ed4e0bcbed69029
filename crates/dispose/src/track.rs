//! The `track` entry point
//!
//! Resolves the requested [`TrackType`], validates the dispose action, and
//! dispatches to stack or GC tracking.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::action::{Dispose, DisposeAction};
use crate::binding;
use crate::error::{Error, Result};
use crate::gc;
use crate::stack;

/// How a resource's release is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrackType {
    /// After the item becomes unreachable and a collection pass runs
    Gc,
    /// When the enclosing scope ends or the item is released
    Stack,
    /// `Stack` inside an open scope, `Gc` otherwise
    #[default]
    Auto,
}

impl TrackType {
    /// Resolve `Auto` against the ambient scope state.
    #[must_use]
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if binding::is_scope_open() => Self::Stack,
            Self::Auto => Self::Gc,
            other => other,
        }
    }

    /// The lowercase name of this tracking type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gc => "gc",
            Self::Stack => "stack",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gc" => Ok(Self::Gc),
            "stack" => Ok(Self::Stack),
            "auto" => Ok(Self::Auto),
            other => Err(Error::configuration(format!(
                "unknown track type '{other}', expected one of: gc, stack, auto"
            ))),
        }
    }
}

/// Options for [`track`] and [`track_disposable`].
#[derive(Debug, Default)]
pub struct TrackOptions {
    /// Requested tracking type
    pub track_type: TrackType,
    /// Explicit dispose action
    pub dispose_action: Option<DisposeAction>,
}

impl TrackOptions {
    /// Auto tracking with no explicit action.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tracking type
    pub fn track_type(mut self, track_type: TrackType) -> Self {
        self.track_type = track_type;
        self
    }

    /// Set the dispose action
    pub fn dispose_action(mut self, action: DisposeAction) -> Self {
        self.dispose_action = Some(action);
        self
    }

    /// Set the dispose action from an infallible closure
    pub fn dispose_with<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispose_action(DisposeAction::from_fn(f))
    }
}

/// Track `item` according to `options`.
///
/// `item` has no dispose action of its own, so one must always be supplied;
/// otherwise this fails with [`Error::Configuration`].
pub fn track<T>(item: Arc<T>, options: TrackOptions) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    dispatch(item, options, None)
}

/// Track a [`Dispose`] item according to `options`.
///
/// Stack tracking defaults to the item's own `dispose`. GC tracking still
/// requires an explicit action, since the default would hold the item strongly
/// and keep it from ever becoming unreachable.
pub fn track_disposable<T>(item: Arc<T>, options: TrackOptions) -> Result<Arc<T>>
where
    T: Dispose + Send + Sync + 'static,
{
    let fallback = DisposeAction::of(Arc::clone(&item));
    dispatch(item, options, Some(fallback))
}

fn dispatch<T>(
    item: Arc<T>,
    options: TrackOptions,
    fallback: Option<DisposeAction>,
) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let resolved = options.track_type.resolve();
    tracing::trace!(
        item = std::any::type_name::<T>(),
        requested = %options.track_type,
        resolved = %resolved,
        "track"
    );

    match (resolved, options.dispose_action) {
        (TrackType::Gc, Some(action)) => Ok(gc::gc_track(item, action)),
        (TrackType::Gc, None) => Err(Error::configuration(
            "gc tracking requires an explicit dispose action that does not capture the item",
        )),
        (_, Some(action)) => stack::stack_track(item, action),
        (_, None) => match fallback {
            Some(action) => stack::stack_track(item, action),
            None => Err(Error::configuration(format!(
                "'{}' is not disposable and no dispose action was supplied",
                std::any::type_name::<T>()
            ))),
        },
    }
}
