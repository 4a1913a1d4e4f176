use std::{fmt, ptr::NonNull};

use derive_where::derive_where;

// === Storage === //

/// An ownership strategy for a [`Container`](crate::Container).
///
/// ## Safety
///
/// The pointer returned by [`Storage::as_ptr`] must be valid for shared access and must keep the
/// same address for as long as the storage is alive, including across moves of the storage value
/// itself.
///
pub unsafe trait Storage {
    type Target: ?Sized;

    fn as_ptr(&self) -> NonNull<Self::Target>;

    fn get(&self) -> &Self::Target {
        // SAFETY: guaranteed by the trait contract for the duration of the borrow of `self`.
        unsafe { self.as_ptr().as_ref() }
    }
}

// === Owned === //

/// Owns its value outright. The value lives on the heap so that back-references remain valid when
/// the owning container is moved.
pub struct Owned<T: ?Sized>(Box<T>);

impl<T: ?Sized + fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<T: Clone> Clone for Owned<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }

    fn clone_from(&mut self, source: &Self) {
        // Reuse the existing allocation so that the value keeps its address.
        (*self.0).clone_from(&source.0);
    }
}

impl<T> Owned<T> {
    pub fn new(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn into_inner(self) -> T {
        *self.0
    }
}

impl<T: ?Sized> Owned<T> {
    pub fn from_box(value: Box<T>) -> Self {
        Self(value)
    }

    /// ## Safety
    ///
    /// No other reference to the value may be live for the duration of the returned borrow.
    ///
    pub(crate) unsafe fn get_mut_unchecked(&mut self) -> &mut T {
        &mut self.0
    }
}

unsafe impl<T: ?Sized> Storage for Owned<T> {
    type Target = T;

    fn as_ptr(&self) -> NonNull<T> {
        NonNull::from(&*self.0)
    }
}

// === Borrowed === //

/// Refers to a value owned elsewhere.
#[derive_where(Copy, Clone, Debug)]
pub struct Borrowed<T: ?Sized>(NonNull<T>);

// `Borrowed` behaves like a `&T`.
unsafe impl<T: ?Sized + Sync> Send for Borrowed<T> {}

unsafe impl<T: ?Sized + Sync> Sync for Borrowed<T> {}

impl<T: ?Sized> Borrowed<T> {
    /// ## Safety
    ///
    /// `value` must outlive this storage and every storage cloned from it. Containers built on top
    /// of it must be dropped, not leaked, before `value` goes away.
    ///
    pub unsafe fn new(value: &T) -> Self {
        Self(NonNull::from(value))
    }
}

unsafe impl<T: ?Sized> Storage for Borrowed<T> {
    type Target = T;

    fn as_ptr(&self) -> NonNull<T> {
        self.0
    }
}
