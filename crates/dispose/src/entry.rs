//! Tracked entries and item identity

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::DisposeAction;
use crate::error::Result;

/// Identity of a tracked item: the address of its shared allocation.
///
/// Two value-equal items in separate allocations have different ids. An id is
/// only meaningful while something keeps the allocation alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

impl ItemId {
    /// Identity of the allocation behind `item`.
    #[inline]
    pub fn of<T: ?Sized>(item: &Arc<T>) -> Self {
        Self(Arc::as_ptr(item).cast::<()>().addr())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

pub(crate) struct EntryInner {
    id: ItemId,
    type_name: &'static str,
    item: Arc<dyn Any + Send + Sync>,
    action: Mutex<Option<DisposeAction>>,
}

impl EntryInner {
    pub(crate) fn new<T>(item: Arc<T>, action: DisposeAction) -> Arc<Self>
    where
        T: Send + Sync + 'static,
    {
        Arc::new(Self {
            id: ItemId::of(&item),
            type_name: std::any::type_name::<T>(),
            item,
            action: Mutex::new(Some(action)),
        })
    }

    /// Take the action out of its slot and run it. A second call is a no-op.
    pub(crate) fn dispose(&self) -> Result<()> {
        let action = self.action.lock().take();
        match action {
            Some(action) => {
                tracing::trace!(item = self.type_name, item_id = %self.id, "disposing entry");
                action.run(self.type_name)
            }
            None => Ok(()),
        }
    }
}

/// A tracked `(item, dispose action)` pair.
///
/// Entries are handed out by operations that stop tracking without disposing
/// (`ignore_matching`, `with_scope_capturing`). Whoever holds an entry owns the
/// obligation to dispose it, or to seed it into another scope.
pub struct Entry(pub(crate) Arc<EntryInner>);

impl Entry {
    /// Another handle to the same entry, for rebuilding context snapshots.
    pub(crate) fn share(&self) -> Self {
        Self(Arc::clone(&self.0))
    }

    /// Identity of the tracked item.
    pub fn id(&self) -> ItemId {
        self.0.id
    }

    /// Type name of the tracked item.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    /// The tracked item, type-erased.
    pub fn item(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.0.item
    }

    /// Whether this entry tracks exactly `item` (identity, not equality).
    pub fn is<T: ?Sized>(&self, item: &Arc<T>) -> bool {
        self.0.id == ItemId::of(item)
    }

    /// The tracked item, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.item.downcast_ref::<T>()
    }

    /// Whether the dispose action has already run.
    pub fn is_disposed(&self) -> bool {
        self.0.action.lock().is_none()
    }

    /// Run the dispose action now.
    pub fn dispose(self) -> Result<()> {
        self.0.dispose()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.0.id)
            .field("type_name", &self.0.type_name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_not_equality() {
        let a = Arc::new(7u32);
        let b = Arc::new(7u32);
        assert_ne!(ItemId::of(&a), ItemId::of(&b));
        assert_eq!(ItemId::of(&a), ItemId::of(&Arc::clone(&a)));
    }

    #[test]
    fn entry_disposes_at_most_once() {
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits_c = Arc::clone(&hits);
        let inner = EntryInner::new(
            Arc::new("buffer"),
            DisposeAction::from_fn(move || {
                hits_c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        inner.dispose().unwrap();
        inner.dispose().unwrap();
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn downcast_and_is() {
        let item = Arc::new(String::from("texture"));
        let entry = Entry(EntryInner::new(Arc::clone(&item), DisposeAction::noop()));
        assert!(entry.is(&item));
        assert_eq!(entry.downcast_ref::<String>().map(String::as_str), Some("texture"));
        assert!(entry.downcast_ref::<u32>().is_none());
        assert!(!entry.is_disposed());
        entry.dispose().unwrap();
    }
}
