//! Counted back-references which catch dangling handles deterministically.
//!
//! A [`Container`] owns (or refers to) a value and keeps an atomic count of the
//! [`BackReference`]s bound to it. Unlike `Rc` or `Arc`, the count does not control the value's
//! lifetime: the owner drops its value whenever it likes. If it does so while any handle is still
//! bound, the process aborts instead of letting that handle read freed memory.
//!
//! ```
//! use std::cell::Cell;
//!
//! use backref::ValueContainer;
//!
//! let hits = ValueContainer::new(Cell::new(0u32));
//!
//! let handle = hits.back_ref();
//! handle.set(handle.get() + 1);
//! assert_eq!(hits.observers(), 1);
//!
//! drop(handle);
//! assert_eq!(hits.get().get(), 1);
//! ```
//!
//! Types which own their data can anchor handles themselves by embedding a [`Tracker`] and
//! implementing [`Trackable`].

mod back_ref;
pub use self::back_ref::*;

mod cell;
pub use self::cell::*;

mod container;
pub use self::container::*;

mod storage;
pub use self::storage::*;

mod trackable;
pub use self::trackable::*;

mod violation;
pub use self::violation::StillObserved;
