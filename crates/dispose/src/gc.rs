//! Reachability-triggered disposal
//!
//! A [`FinalizationHost`] holds weak references to tracked items together with
//! their dispose actions. Once nothing holds an item strongly, the next
//! collection pass removes its registration and runs the action exactly once.
//! When that happens is up to whoever drives the passes: [`Collector`] runs one
//! on [`collect`](FinalizationHost::collect) and, opportunistically, every
//! `sweep_interval` registrations. Registrations still pending when the
//! collector is dropped never run.
//!
//! # Dispose actions must not capture the item
//!
//! The host keeps each action alive until it fires. An action holding an
//! `Arc` to its own item therefore keeps the item reachable forever, and the
//! action never runs. Capture only the underlying handle (file descriptor,
//! native pointer, ...) that needs releasing.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::action::DisposeAction;
use crate::config::DEFAULT_SWEEP_INTERVAL;
use crate::error::{Error, Result};
use crate::stack;

/// Handle to one pending finalizer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Outcome of a collection pass.
#[derive(Debug, Default)]
pub struct CollectReport {
    /// Registrations whose target was unreachable and whose action ran
    pub finalized: usize,
    /// Failures raised by those actions
    pub errors: Vec<Error>,
}

/// Weak-reference finalization facility.
///
/// "Associate a weak handle to X with callback C; C runs at most once, at an
/// unspecified later time, after X becomes unreachable, possibly never."
pub trait FinalizationHost: Send + Sync {
    /// Register `action` to run after `target` loses its last strong reference.
    fn register(
        &self,
        target: Weak<dyn Any + Send + Sync>,
        type_name: &'static str,
        action: DisposeAction,
    ) -> RegistrationId;

    /// Cancel a pending registration, handing back its action.
    ///
    /// Returns `None` if the registration already fired or was cancelled.
    fn unregister(&self, id: RegistrationId) -> Option<DisposeAction>;

    /// Whether `id` is still waiting for its target to become unreachable.
    fn is_pending(&self, id: RegistrationId) -> bool;

    /// Number of pending registrations.
    fn pending(&self) -> usize;

    /// Run the actions of every registration whose target is unreachable.
    fn collect(&self) -> CollectReport;
}

struct Pending {
    target: Weak<dyn Any + Send + Sync>,
    type_name: &'static str,
    action: DisposeAction,
}

static GLOBAL: LazyLock<Arc<Collector>> = LazyLock::new(|| Arc::new(Collector::new()));

/// The built-in [`FinalizationHost`].
///
/// Pending registrations live in a liveness set until their pass fires them.
pub struct Collector {
    live: Mutex<HashMap<RegistrationId, Pending>>,
    next_id: AtomicU64,
    /// `0` disables opportunistic passes
    sweep_interval: AtomicUsize,
    since_sweep: AtomicUsize,
}

impl Collector {
    /// Create a collector sweeping every [`DEFAULT_SWEEP_INTERVAL`]
    /// registrations.
    pub fn new() -> Self {
        Self::with_sweep_interval(Some(DEFAULT_SWEEP_INTERVAL))
    }

    /// Create a collector with the given sweep interval (`None`: only explicit
    /// [`collect`](FinalizationHost::collect) calls run finalizers).
    pub fn with_sweep_interval(interval: Option<usize>) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sweep_interval: AtomicUsize::new(interval.unwrap_or(0)),
            since_sweep: AtomicUsize::new(0),
        }
    }

    /// The process-wide collector used by [`gc_track`] and
    /// [`chain`](crate::chain).
    pub fn global() -> &'static Arc<Collector> {
        &GLOBAL
    }

    /// Change how often registration triggers a collection pass.
    pub fn set_sweep_interval(&self, interval: Option<usize>) {
        self.sweep_interval
            .store(interval.unwrap_or(0), Ordering::Relaxed);
    }

    fn maybe_sweep(&self) {
        let interval = self.sweep_interval.load(Ordering::Relaxed);
        if interval == 0 {
            return;
        }
        let since = self.since_sweep.fetch_add(1, Ordering::AcqRel) + 1;
        if since >= interval {
            self.since_sweep.store(0, Ordering::Release);
            self.collect();
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("pending", &self.pending())
            .field("sweep_interval", &self.sweep_interval.load(Ordering::Relaxed))
            .finish()
    }
}

impl FinalizationHost for Collector {
    fn register(
        &self,
        target: Weak<dyn Any + Send + Sync>,
        type_name: &'static str,
        action: DisposeAction,
    ) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.lock().insert(
            id,
            Pending {
                target,
                type_name,
                action,
            },
        );
        tracing::trace!(item = type_name, registration = id.0, "gc-tracked");
        self.maybe_sweep();
        id
    }

    fn unregister(&self, id: RegistrationId) -> Option<DisposeAction> {
        self.live.lock().remove(&id).map(|pending| pending.action)
    }

    fn is_pending(&self, id: RegistrationId) -> bool {
        self.live.lock().contains_key(&id)
    }

    fn pending(&self) -> usize {
        self.live.lock().len()
    }

    fn collect(&self) -> CollectReport {
        // Pull the dead registrations out under the lock, run them after.
        let dead: Vec<Pending> = {
            let mut live = self.live.lock();
            live.extract_if(|_, pending| pending.target.strong_count() == 0)
                .map(|(_, pending)| pending)
                .collect()
        };

        let mut report = CollectReport {
            finalized: dead.len(),
            errors: Vec::new(),
        };
        for pending in dead {
            if let Err(err) = pending.action.run(pending.type_name) {
                tracing::warn!(item = pending.type_name, error = %err, "finalizer failed");
                report.errors.push(err);
            }
        }

        tracing::debug!(
            finalized = report.finalized,
            failed = report.errors.len(),
            pending = self.pending(),
            "collection pass"
        );
        report
    }
}

/// A GC registration that can also be released deterministically.
///
/// Disposing it cancels the pending finalizer and runs the dispose action
/// immediately. If the finalizer already fired, disposing does nothing.
pub struct Registration {
    id: RegistrationId,
    type_name: &'static str,
    host: Arc<dyn FinalizationHost>,
}

impl Registration {
    /// The underlying registration id.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Whether the finalizer has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.host.is_pending(self.id)
    }

    /// Cancel the finalizer without running the action.
    pub fn cancel(&self) -> bool {
        self.host.unregister(self.id).is_some()
    }

    /// Cancel the finalizer and run the action now.
    pub fn dispose_now(&self) -> Result<()> {
        match self.host.unregister(self.id) {
            Some(action) => action.run(self.type_name),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn register<T, H>(host: &H, item: &Arc<T>, action: DisposeAction) -> RegistrationId
where
    T: Send + Sync + 'static,
    H: FinalizationHost + ?Sized,
{
    let weak: Weak<T> = Arc::downgrade(item);
    let target: Weak<dyn Any + Send + Sync> = weak;
    host.register(target, std::any::type_name::<T>(), action)
}

/// Run `action` after `item` becomes unreachable, using the global collector.
///
/// `action` must not hold `item` strongly (see the module docs).
pub fn gc_track<T>(item: Arc<T>, action: DisposeAction) -> Arc<T>
where
    T: Send + Sync + 'static,
{
    gc_track_with(Collector::global().as_ref(), item, action)
}

/// [`gc_track`] against an explicit host.
pub fn gc_track_with<T, H>(host: &H, item: Arc<T>, action: DisposeAction) -> Arc<T>
where
    T: Send + Sync + 'static,
    H: FinalizationHost + ?Sized,
{
    register(host, &item, action);
    item
}

/// GC-track `item` and stack-track the registration in the active scope.
///
/// Whichever comes first wins: a scope release runs the action immediately
/// and cancels the finalizer, a collection pass after `item` becomes
/// unreachable runs it and turns the scope release into a no-op.
pub fn gc_track_and_stack_track<T>(item: Arc<T>, action: DisposeAction) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let host: Arc<dyn FinalizationHost> = Collector::global().clone();
    gc_track_and_stack_track_with(&host, item, action)
}

/// [`gc_track_and_stack_track`] against an explicit host.
pub fn gc_track_and_stack_track_with<T>(
    host: &Arc<dyn FinalizationHost>,
    item: Arc<T>,
    action: DisposeAction,
) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let id = register(&**host, &item, action);
    let registration = Arc::new(Registration {
        id,
        type_name: std::any::type_name::<T>(),
        host: Arc::clone(host),
    });

    let handle = Arc::clone(&registration);
    let release = DisposeAction::new(move || handle.dispose_now());
    if let Err(err) = stack::stack_track(registration, release) {
        host.unregister(id);
        return Err(err);
    }
    Ok(item)
}
