use std::{fmt, ops::Deref, pin::Pin, ptr::NonNull};

use crate::{Container, Observer, Storage, Trackable};

// === BackReference === //

/// A counted, non-owning handle to a value held by a [`Container`] or a [`Trackable`] type.
///
/// Every live handle accounts for exactly one unit of its target's observer count: binding or
/// cloning adds one, dropping removes one. Moving a handle transfers its unit. The handle never
/// keeps its target alive; destroying a target which still has handles bound to it aborts the
/// process, which is what makes dereferencing a handle safe.
///
/// A handle only grants shared access. Values mutated through handles need interior mutability.
pub struct BackReference<T: ?Sized> {
    value: NonNull<T>,
    observer: Observer,
}

// `BackReference` behaves like a `&T`.
unsafe impl<T: ?Sized + Sync> Send for BackReference<T> {}

unsafe impl<T: ?Sized + Sync> Sync for BackReference<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for BackReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BackReference")
            .field(&BackReference::get(self))
            .finish()
    }
}

impl<T: ?Sized> Clone for BackReference<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value,
            observer: self.observer.clone(),
        }
    }

    /// Rebinds this handle to whatever `source` points at. The observer count is only touched if
    /// `source` is bound to a different target.
    fn clone_from(&mut self, source: &Self) {
        if !BackReference::ptr_eq(self, source) {
            tracing::trace!(
                from = BackReference::observers(self),
                to = BackReference::observers(source),
                "rebinding back-reference"
            );
        }

        // Same-target projections still differ in `value`.
        self.value = source.value;
        self.observer.clone_from(&source.observer);
    }
}

impl<T: ?Sized> Deref for BackReference<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        BackReference::get(self)
    }
}

impl<S: Storage> From<&Container<S>> for BackReference<S::Target> {
    fn from(target: &Container<S>) -> Self {
        Self::new(target)
    }
}

impl<T: ?Sized> BackReference<T> {
    pub fn new<S>(target: &Container<S>) -> Self
    where
        S: Storage<Target = T>,
    {
        let observer = target.tracker().observe();

        tracing::trace!(observers = observer.observers(), "binding back-reference");

        Self {
            value: target.storage().as_ptr(),
            observer,
        }
    }

    pub fn pinned<W>(target: Pin<&W>) -> Self
    where
        W: ?Sized + Trackable<Target = T>,
    {
        let target = target.get_ref();
        let observer = target.tracker().observe();

        tracing::trace!(observers = observer.observers(), "binding pinned back-reference");

        Self {
            value: NonNull::from(target.value()),
            observer,
        }
    }

    pub fn get(me: &Self) -> &T {
        // SAFETY: the target aborts the process rather than being destroyed while `me` is bound
        // to it, and its storage contract keeps the value at this address until then.
        unsafe { me.value.as_ref() }
    }

    /// The observer count of this handle's target, this handle included.
    pub fn observers(me: &Self) -> usize {
        me.observer.observers()
    }

    /// Whether both handles are bound to the same target.
    pub fn ptr_eq<U: ?Sized>(me: &Self, other: &BackReference<U>) -> bool {
        me.observer.ptr_eq(&other.observer)
    }

    /// Rebinds this handle to `target`, releasing its unit of the old target's count.
    pub fn rebind<S>(me: &mut Self, target: &Container<S>)
    where
        S: Storage<Target = T>,
    {
        if target.tracker().same_cell(&me.observer) {
            // The handle may still point at a projection of the target's value.
            me.value = target.storage().as_ptr();
            return;
        }

        tracing::trace!(
            from = BackReference::observers(me),
            to = target.observers(),
            "rebinding back-reference"
        );

        *me = Self::new(target);
    }

    /// Converts this handle into one pointing at a part of its value, keeping its unit of the
    /// observer count. This is also how a handle is converted to a trait object.
    ///
    /// ```
    /// use std::fmt::Display;
    ///
    /// use backref::{BackReference, ValueContainer};
    ///
    /// let pair = ValueContainer::new((1u8, String::from("two")));
    /// let second: BackReference<dyn Display> =
    ///     BackReference::map(pair.back_ref(), |(_, s)| s as &dyn Display);
    ///
    /// assert_eq!(second.to_string(), "two");
    /// assert_eq!(pair.observers(), 1);
    /// # drop(second);
    /// ```
    pub fn map<U: ?Sized>(me: Self, f: impl FnOnce(&T) -> &U) -> BackReference<U>
    where
        T: 'static,
    {
        let Self { value, observer } = me;

        // SAFETY: see `get`. `T: 'static` ensures that anything `f` can reach lives at least as
        // long as the target itself.
        let value = NonNull::from(f(unsafe { value.as_ref() }));

        BackReference { value, observer }
    }
}
