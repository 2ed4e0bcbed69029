//! Lock-free context of stack-tracked entries
//!
//! A [`ResourceContext`] holds an immutable, newest-first sequence of entries
//! behind an [`ArcSwap`]. Every mutation reads the current sequence, builds a
//! replacement, and installs it with compare-and-swap, retrying on conflict.
//! Draining partitions the sequence first and disposes afterwards, so a dispose
//! action may itself track or release entries in the same context.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::action::DisposeAction;
use crate::config;
use crate::entry::{Entry, EntryInner, ItemId};
use crate::error::{Error, Result};

type Entries = Vec<Entry>;

/// An ordered collection of `(item, dispose action)` entries.
///
/// Usually reached through the ambient binding set up by
/// [`with_scope`](crate::with_scope), but it can also be created and threaded
/// through calls explicitly.
pub struct ResourceContext {
    entries: ArcSwap<Entries>,
}

impl ResourceContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Create a context seeded with `entries`, in the given order.
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: ArcSwap::from_pointee(entries.into_iter().collect()),
        }
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Whether `item` is tracked (by identity).
    pub fn contains<T: ?Sized>(&self, item: &Arc<T>) -> bool {
        let id = ItemId::of(item);
        self.entries.load().iter().any(|e| e.id() == id)
    }

    /// Identities of the tracked items, newest first.
    pub fn ids(&self) -> Vec<ItemId> {
        self.entries.load().iter().map(Entry::id).collect()
    }

    /// Start tracking `item`, disposed later by `action`.
    ///
    /// With the debug double-free flag set, tracking an item that is already
    /// present fails with [`Error::DuplicateTrack`] and leaves the context
    /// untouched.
    pub fn track<T>(&self, item: Arc<T>, action: DisposeAction) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let entry = Entry(EntryInner::new(Arc::clone(&item), action));
        let id = entry.id();
        let reject_duplicates = config::debug_double_free();

        self.update(|current| {
            if reject_duplicates && current.iter().any(|e| e.id() == id) {
                return Err(Error::DuplicateTrack {
                    item: entry.type_name(),
                    item_id: id,
                });
            }
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(entry.share());
            next.extend(current.iter().map(Entry::share));
            Ok((Some(next), ()))
        })?;

        tracing::trace!(item = entry.type_name(), item_id = %id, "tracked");
        Ok(item)
    }

    /// Stop tracking every entry matching `predicate` and return them,
    /// newest first, without disposing them.
    pub fn ignore_matching<P>(&self, predicate: P) -> Vec<Entry>
    where
        P: Fn(&Entry) -> bool,
    {
        self.update(|current| {
            let (matched, rest): (Entries, Entries) = current
                .iter()
                .map(Entry::share)
                .partition(|e| predicate(e));
            if matched.is_empty() {
                return Ok((None, matched));
            }
            Ok((Some(rest), matched))
        })
        .unwrap_or_default()
    }

    /// Stop tracking `item` without disposing it.
    ///
    /// Every entry for `item` is removed.
    pub fn ignore<T: ?Sized>(&self, item: &Arc<T>) -> Vec<Entry> {
        let id = ItemId::of(item);
        self.ignore_matching(|e| e.id() == id)
    }

    /// Remove the first entry for `item` and run its dispose action.
    ///
    /// Does nothing when `item` is not tracked. Only one entry is released
    /// even if `item` was tracked more than once.
    pub fn release<T: ?Sized>(&self, item: &Arc<T>) -> Result<()> {
        let id = ItemId::of(item);
        let removed = self
            .update(|current| {
                let Some(pos) = current.iter().position(|e| e.id() == id) else {
                    return Ok((None, None));
                };
                let next = current
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, e)| e.share())
                    .collect();
                Ok((Some(next), Some(current[pos].share())))
            })
            .unwrap_or_default();

        match removed {
            Some(entry) => entry.dispose(),
            None => Ok(()),
        }
    }

    /// Dispose every entry matching `predicate`.
    ///
    /// One failing action never stops the others; every failure is logged and
    /// returned.
    pub fn release_all<P>(&self, predicate: P) -> Vec<Error>
    where
        P: Fn(&Entry) -> bool,
    {
        let matched = self.ignore_matching(predicate);
        let mut errors = Vec::new();
        for entry in matched {
            let item = entry.type_name();
            if let Err(err) = entry.dispose() {
                tracing::warn!(item, error = %err, "dispose action failed");
                errors.push(err);
            }
        }
        errors
    }

    /// Dispose every entry.
    pub fn drain(&self) -> Vec<Error> {
        self.release_all(|_| true)
    }

    /// Remove every entry without disposing it.
    pub fn take(&self) -> Vec<Entry> {
        self.ignore_matching(|_| true)
    }

    /// Read / rebuild / compare-and-swap loop.
    ///
    /// `f` returns `None` to leave the context as it is. It may be called
    /// several times; only the result computed from the winning snapshot is
    /// returned.
    fn update<R, F>(&self, mut f: F) -> Result<R>
    where
        F: FnMut(&[Entry]) -> Result<(Option<Entries>, R)>,
    {
        let mut current = self.entries.load_full();
        loop {
            let (next, out) = f(current.as_slice())?;
            let Some(next) = next else {
                return Ok(out);
            };
            let prev = self.entries.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &current) {
                return Ok(out);
            }
            current = Guard::into_inner(prev);
        }
    }
}

impl Default for ResourceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceContext")
            .field("entries", &self.entries.load().len())
            .finish()
    }
}
