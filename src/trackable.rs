use std::pin::Pin;

use crate::{BackReference, Tracker};

// === Trackable === //

/// A type which owns a value and lets [`BackReference`]s point into it.
///
/// Implementors embed a [`Tracker`], declared before the fields that it guards. The tracker's
/// destructor is the destruction hook: it aborts the process if any back-reference is still bound
/// when the implementor is dropped. Since `Tracker` is `!Unpin`, back-references can only be bound
/// through a pinned reference, which guarantees that the value stays put until that check runs.
///
/// ```
/// use std::pin::pin;
///
/// use backref::{Trackable, Tracker};
///
/// struct Window {
///     tracker: Tracker,
///     title: String,
/// }
///
/// unsafe impl Trackable for Window {
///     type Target = str;
///
///     fn tracker(&self) -> &Tracker {
///         &self.tracker
///     }
///
///     fn value(&self) -> &str {
///         &self.title
///     }
/// }
///
/// let window = pin!(Window { tracker: Tracker::new::<Window>(), title: "main".into() });
/// let title = window.as_ref().back_ref();
///
/// assert_eq!(&*title, "main");
/// assert_eq!(window.observers(), 1);
/// # drop(title);
/// ```
///
/// ## Safety
///
/// While `self` is pinned and has not yet been dropped, [`Trackable::value`] must always return a
/// reference to the same, still valid, value and [`Trackable::tracker`] must always return the
/// same tracker. The value must be owned by `self` (directly or through owned indirection) or
/// live for `'static`.
///
/// An implementor's own `Drop::drop` runs before its tracker's observer check. It must neither
/// mutate nor invalidate the value returned by [`Trackable::value`], since back-references may
/// still be reading it at that point.
///
pub unsafe trait Trackable {
    type Target: ?Sized;

    fn tracker(&self) -> &Tracker;

    fn value(&self) -> &Self::Target;

    fn observers(&self) -> usize {
        self.tracker().observers()
    }

    /// Binds a new [`BackReference`] to this value.
    fn back_ref(self: Pin<&Self>) -> BackReference<Self::Target> {
        BackReference::pinned(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::{Pin, pin},
        sync::atomic::{AtomicU32, Ordering::*},
    };

    use super::*;

    trait Shape: Sync {
        fn area(&self) -> u32;
    }

    struct Square(u32);

    impl Shape for Square {
        fn area(&self) -> u32 {
            self.0 * self.0
        }
    }

    struct Rect(u32, u32);

    impl Shape for Rect {
        fn area(&self) -> u32 {
            self.0 * self.1
        }
    }

    struct Node<S> {
        tracker: Tracker,
        hits: AtomicU32,
        shape: S,
    }

    impl<S: Shape + 'static> Node<S> {
        fn new(shape: S) -> Self {
            Self {
                tracker: Tracker::new::<Self>(),
                hits: AtomicU32::new(0),
                shape,
            }
        }
    }

    unsafe impl<S: Shape + 'static> Trackable for Node<S> {
        type Target = dyn Shape;

        fn tracker(&self) -> &Tracker {
            &self.tracker
        }

        fn value(&self) -> &Self::Target {
            self.hits.fetch_add(1, Relaxed);
            &self.shape
        }
    }

    #[test]
    fn polymorphic_anchors() {
        let square = pin!(Node::new(Square(3)));
        let rect = pin!(Node::new(Rect(2, 5)));

        let anchors: [Pin<&dyn Trackable<Target = dyn Shape>>; 2] = [square.as_ref(), rect.as_ref()];
        let refs = anchors.map(|anchor| anchor.back_ref());

        assert_eq!(refs.iter().map(|r| r.area()).sum::<u32>(), 19);
        assert_eq!(square.observers(), 1);
        assert_eq!(rect.observers(), 1);
        assert_eq!(square.hits.load(Relaxed), 1);

        drop(refs);

        assert_eq!(square.observers(), 0);
        assert_eq!(rect.observers(), 0);
    }

    #[test]
    fn pinned_constructor_and_clones() {
        let node = pin!(Node::new(Square(4)));

        let first = BackReference::pinned(node.as_ref());
        let second = first.clone();

        assert!(BackReference::ptr_eq(&first, &second));
        assert_eq!(second.area(), 16);
        assert_eq!(node.observers(), 2);

        drop(first);
        drop(second);
        assert_eq!(node.tracker().observers(), 0);
    }

    #[test]
    fn boxed_anchor() {
        let node = Box::pin(Node::new(Rect(1, 1)));
        let handle = node.as_ref().back_ref();

        assert_eq!(BackReference::observers(&handle), 1);

        drop(handle);
        drop(node);
    }
}
