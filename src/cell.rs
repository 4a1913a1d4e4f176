use std::{
    any::type_name,
    fmt,
    marker::PhantomPinned,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering::*},
    },
};

use crate::violation;

// === ObserverCell === //

/// The count shared between one [`Tracker`] and all of its [`Observer`]s.
///
/// The cell is reference-counted separately from the observer count so that an observer can
/// always touch the counter, even one that outlived its owner in a process that is about to
/// abort.
struct ObserverCell {
    count: AtomicUsize,
}

// === Tracker === //

/// The owner's view of an observer count.
///
/// Dropping a `Tracker` while any [`Observer`] derived from it is still alive aborts the process.
/// Types which hand out back-references to their own data embed a `Tracker` and declare it
/// *before* the fields it guards so that the check runs before those fields are dropped.
///
/// `Tracker` is `!Unpin`, so pinning a type that embeds one pins its address for good.
pub struct Tracker {
    cell: Arc<ObserverCell>,
    type_name: &'static str,
    _pinned: PhantomPinned,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("type_name", &self.type_name)
            .field("observers", &self.observers())
            .finish()
    }
}

impl Tracker {
    /// Creates an unobserved tracker labelled with the name of `T`.
    pub fn new<T: ?Sized>() -> Self {
        Self::with_name(type_name::<T>())
    }

    pub fn with_name(type_name: &'static str) -> Self {
        Self {
            cell: Arc::new(ObserverCell {
                count: AtomicUsize::new(0),
            }),
            type_name,
            _pinned: PhantomPinned,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn observers(&self) -> usize {
        self.cell.count.load(Relaxed)
    }

    pub fn is_observed(&self) -> bool {
        self.observers() != 0
    }

    /// Registers a new observer.
    pub fn observe(&self) -> Observer {
        self.cell.count.fetch_add(1, Relaxed);

        Observer {
            cell: self.cell.clone(),
        }
    }

    pub fn same_cell(&self, observer: &Observer) -> bool {
        Arc::ptr_eq(&self.cell, &observer.cell)
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // Pairs with the `Release` decrement in `Observer::drop` so that every access made
        // through a departed observer happens-before the guarded value is torn down.
        let observers = self.cell.count.load(Acquire);

        if observers != 0 {
            violation::dangling_back_references(self.type_name, observers);
        }
    }
}

// === Observer === //

/// An observer's view of an observer count. Each live `Observer` accounts for exactly one unit of
/// the count.
pub struct Observer {
    cell: Arc<ObserverCell>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("observers", &self.observers())
            .finish()
    }
}

impl Observer {
    pub fn observers(&self) -> usize {
        self.cell.count.load(Relaxed)
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Clone for Observer {
    fn clone(&self) -> Self {
        // Increment observer count.
        self.cell.count.fetch_add(1, Relaxed);

        Self {
            cell: self.cell.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.ptr_eq(source) {
            return;
        }

        // The new cell is incremented before the old one is released.
        *self = source.clone();
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        // Decrement observer count.
        self.cell.count.fetch_sub(1, Release);
    }
}
