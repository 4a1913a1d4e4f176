use std::{fmt, mem, ops::Deref};

use crate::{BackReference, Borrowed, Owned, StillObserved, Storage, Tracker, Trackable};

// === Aliases === //

/// A container which owns its value and counts the [`BackReference`]s bound to it.
pub type ValueContainer<T> = Container<Owned<T>>;

/// A container which refers to a value owned elsewhere and counts the [`BackReference`]s bound to
/// it. Its value can never be reassigned.
pub type ValueContainerBase<T> = Container<Borrowed<T>>;

// === Container === //

/// A value slot which knows how many [`BackReference`]s point at it.
///
/// The count does not keep the value alive. Instead, dropping a container which is still observed
/// aborts the process: a handle outliving its target is a use-after-free waiting to happen.
///
/// ```
/// use backref::ValueContainer;
///
/// let container = ValueContainer::new(42);
///
/// let first = container.back_ref();
/// let second = first.clone();
/// assert_eq!(container.observers(), 2);
/// assert_eq!(*second, 42);
///
/// drop((first, second));
/// assert_eq!(container.observers(), 0);
/// ```
pub struct Container<S: Storage> {
    // Declared first so that the observer check runs before the value is dropped.
    tracker: Tracker,
    storage: S,
}

impl<S> fmt::Debug for Container<S>
where
    S: Storage<Target: fmt::Debug>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("value", &self.get())
            .field("observers", &self.observers())
            .finish()
    }
}

/// Copying a container copies (or, for [`Borrowed`] storage, rebinds) the value only. The copy
/// starts out unobserved regardless of how many handles point at the original.
impl<S: Storage + Clone> Clone for Container<S> {
    fn clone(&self) -> Self {
        Self {
            tracker: Tracker::with_name(self.tracker.type_name()),
            storage: self.storage.clone(),
        }
    }

    /// Copies `source`'s value into this container in place, leaving both observer counts alone.
    ///
    /// ## Panics
    ///
    /// Panics, leaving `self` untouched, if any back-reference is bound to `self`. See
    /// [`Container::try_assign_from`] for a fallible version.
    #[track_caller]
    fn clone_from(&mut self, source: &Self) {
        if self.is_observed() {
            panic!("{}", self.still_observed(()));
        }

        self.storage.clone_from(&source.storage);
    }
}

impl<S: Storage> Deref for Container<S> {
    type Target = S::Target;

    fn deref(&self) -> &Self::Target {
        self.storage.get()
    }
}

impl<S: Storage> Container<S> {
    pub fn with_storage(storage: S) -> Self {
        Self {
            tracker: Tracker::new::<S::Target>(),
            storage,
        }
    }

    pub fn get(&self) -> &S::Target {
        self.storage.get()
    }

    pub fn observers(&self) -> usize {
        self.tracker.observers()
    }

    pub fn is_observed(&self) -> bool {
        self.tracker.is_observed()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Binds a new [`BackReference`] to this container.
    pub fn back_ref(&self) -> BackReference<S::Target> {
        BackReference::new(self)
    }

    fn still_observed<P>(&self, payload: P) -> StillObserved<P> {
        StillObserved::new(payload, self.observers(), self.tracker.type_name())
    }
}

unsafe impl<S: Storage> Trackable for Container<S> {
    type Target = S::Target;

    fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn value(&self) -> &Self::Target {
        self.storage.get()
    }
}

// === ValueContainer === //

impl<T> Container<Owned<T>> {
    pub fn new(value: T) -> Self {
        Self::with_storage(Owned::new(value))
    }

    /// Constructs the value in place from `init`.
    pub fn from_fn(init: impl FnOnce() -> T) -> Self {
        Self::new(init())
    }

    /// Replaces the value, leaving the observer count untouched.
    ///
    /// Fails, handing `value` back, if any back-reference is still bound since those could be
    /// reading the old value.
    pub fn replace(&mut self, value: T) -> Result<T, StillObserved<T>> {
        if self.is_observed() {
            return Err(self.still_observed(value));
        }

        // SAFETY: no back-reference is bound and none can be bound while we hold `&mut self`.
        Ok(mem::replace(unsafe { self.storage.get_mut_unchecked() }, value))
    }

    /// Moves the value out of an unobserved container.
    pub fn try_into_inner(self) -> Result<T, StillObserved<Self>> {
        if self.is_observed() {
            return Err(self.still_observed_self());
        }

        let Self { tracker, storage } = self;
        drop(tracker);

        Ok(storage.into_inner())
    }

    fn still_observed_self(self) -> StillObserved<Self> {
        let observers = self.observers();
        let type_name = self.tracker.type_name();

        StillObserved::new(self, observers, type_name)
    }
}

impl<T: Clone> Container<Owned<T>> {
    /// Copies `other`'s value into this container. The observer counts of both containers are
    /// left untouched.
    pub fn try_assign_from(&mut self, other: &Self) -> Result<(), StillObserved<()>> {
        if self.is_observed() {
            return Err(self.still_observed(()));
        }

        self.storage.clone_from(&other.storage);

        Ok(())
    }
}

impl<T: ?Sized> Container<Owned<T>> {
    pub fn from_box(value: Box<T>) -> Self {
        Self::with_storage(Owned::from_box(value))
    }

    /// Borrows the value mutably, provided that no back-reference is bound to it.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.is_observed() {
            return None;
        }

        // SAFETY: back-references are the only other way to reach the value and there are none.
        // New ones cannot be bound while we hold `&mut self`.
        Some(unsafe { self.storage.get_mut_unchecked() })
    }

    /// Borrows the value mutably even while back-references are bound to it.
    ///
    /// ## Safety
    ///
    /// No back-reference bound to this container may be dereferenced while the returned borrow is
    /// live, on this or any other thread.
    ///
    pub unsafe fn get_mut_unchecked(&mut self) -> &mut T {
        unsafe { self.storage.get_mut_unchecked() }
    }
}

impl<T: Default> Default for Container<Owned<T>> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Container<Owned<T>> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

// === ValueContainerBase === //

impl<T: ?Sized> Container<Borrowed<T>> {
    /// Binds a container to a value owned by someone else.
    ///
    /// ## Safety
    ///
    /// `value` must outlive this container and every container cloned from it, and those
    /// containers must be dropped rather than leaked. See [`Trackable`] for a safe way to anchor
    /// back-references in a type which owns its data.
    ///
    pub unsafe fn new(value: &T) -> Self {
        Self {
            tracker: Tracker::new::<T>(),
            storage: unsafe { Borrowed::new(value) },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn count_follows_live_handles() {
        let container = ValueContainer::new(42);
        assert_eq!(container.observers(), 0);

        let h1 = container.back_ref();
        assert_eq!(container.observers(), 1);

        let h2 = h1.clone();
        assert_eq!(container.observers(), 2);
        assert_eq!(*h2, 42);

        drop(h2);
        assert_eq!(container.observers(), 1);

        drop(h1);
        assert_eq!(container.observers(), 0);
    }

    #[test]
    fn clone_starts_unobserved() {
        let original = ValueContainer::new(String::from("slot"));
        let _h = original.back_ref();

        let copy = original.clone();

        assert_eq!(original.observers(), 1);
        assert_eq!(copy.observers(), 0);
        assert_eq!(copy.get(), "slot");
        assert_ne!(copy.get().as_ptr(), original.get().as_ptr());
    }

    #[test]
    fn move_keeps_handles_valid() {
        let container = ValueContainer::new(vec![1, 2, 3]);
        let handle = container.back_ref();

        let moved = Box::new(container);

        assert_eq!(handle.as_slice(), moved.get().as_slice());
        assert_eq!(moved.observers(), 1);

        drop(handle);
    }

    #[test]
    fn replace_requires_exclusive_access() {
        let mut container = ValueContainer::new(1);
        assert_eq!(container.replace(2).unwrap(), 1);

        let handle = container.back_ref();
        let err = container.replace(3).unwrap_err();
        assert_eq!(err.observers(), 1);
        assert_eq!(err.into_inner(), 3);
        assert!(container.get_mut().is_none());

        drop(handle);
        *container.get_mut().unwrap() += 10;
        assert_eq!(*container.get(), 12);
    }

    #[test]
    fn assign_from_copies_value_only() {
        let mut target = ValueContainer::new(1);
        let source = ValueContainer::new(5);
        let _source_ref = source.back_ref();

        target.try_assign_from(&source).unwrap();
        assert_eq!(*target.get(), 5);
        assert_eq!(target.observers(), 0);
        assert_eq!(source.observers(), 1);

        let _target_ref = target.back_ref();
        assert!(target.try_assign_from(&source).is_err());
    }

    #[test]
    fn interior_mutation_through_handles() {
        let container = ValueContainer::new(Cell::new(0));
        let a = container.back_ref();
        let b = container.back_ref();

        a.set(a.get() + 1);
        b.set(b.get() + 1);

        assert_eq!(container.get().get(), 2);
    }

    #[test]
    fn unchecked_mutation_while_observed() {
        let mut container = ValueContainer::new(10);
        let handle = container.back_ref();

        // SAFETY: `handle` is not dereferenced until the borrow ends.
        *unsafe { container.get_mut_unchecked() } = 11;

        assert_eq!(*handle, 11);
        assert_eq!(container.observers(), 1);
    }

    #[test]
    fn into_inner() {
        let container = ValueContainer::from_fn(|| String::from("owned"));
        let handle = container.back_ref();

        let container = container.try_into_inner().unwrap_err().into_inner();
        drop(handle);

        assert_eq!(container.try_into_inner().unwrap(), "owned");
    }

    #[test]
    fn base_refers_to_external_value() {
        let value = 7u32;

        {
            // SAFETY: `value` outlives the container and the container is dropped at scope end.
            let base = unsafe { ValueContainerBase::new(&value) };
            let copy = base.clone();
            let handle = copy.back_ref();

            assert!(std::ptr::eq(base.get(), &value));
            assert!(std::ptr::eq(&*handle, &value));
            assert_eq!(base.observers(), 0);
            assert_eq!(copy.observers(), 1);
        }
    }

    #[test]
    fn clone_from_copies_in_place() {
        let mut target = ValueContainer::new(String::from("target"));
        let source = ValueContainer::new(String::from("source"));
        let _source_ref = source.back_ref();
        let before = target.get() as *const String;

        target.clone_from(&source);

        assert_eq!(target.get(), "source");
        assert!(std::ptr::eq(target.get(), before));
        assert_eq!((target.observers(), source.observers()), (0, 1));
    }

    #[test]
    fn clone_from_observed_panics_without_destroying() {
        let mut target = ValueContainer::new(1);
        let source = ValueContainer::new(2);
        let handle = target.back_ref();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            target.clone_from(&source);
        }));

        let message = *result.unwrap_err().downcast::<String>().unwrap();
        assert_eq!(message, "i32 is still observed by 1 back-reference(s)");
        assert_eq!(*handle, 1);
        assert_eq!(target.observers(), 1);

        drop(handle);
        target.clone_from(&source);
        assert_eq!(*target.get(), 2);
    }

    #[test]
    fn base_clone_from_rebinds() {
        let (first, second) = (1u8, 2u8);

        // SAFETY: both values outlive the containers, which are dropped at scope end.
        let mut base = unsafe { ValueContainerBase::new(&first) };
        let other = unsafe { ValueContainerBase::new(&second) };

        base.clone_from(&other);

        assert!(std::ptr::eq(base.get(), &second));
        assert_eq!(base.observers(), 0);
    }

    #[test]
    fn deref_reaches_value() {
        let container = ValueContainer::new(vec![1, 2, 3]);

        assert_eq!(container.len(), 3);
        assert_eq!(container[1], 2);
        assert!(std::ptr::eq(&*container, container.get()));
    }

    #[test]
    fn debug_and_conversions() {
        let container: ValueContainer<u8> = 3.into();
        assert_eq!(format!("{container:?}"), "Container { value: 3, observers: 0 }");

        let container = ValueContainer::<Vec<u8>>::default();
        assert!(container.get().is_empty());
        assert!(container.tracker().type_name().ends_with("Vec<u8>"));
    }
}
