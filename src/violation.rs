use std::{io::Write as _, process};

use derive_where::derive_where;
use thiserror::Error;

// === Fatal path === //

/// Terminates the process because a container holding `observers` live back-references is being
/// destroyed.
///
/// This never unwinds, so it is safe to reach from a destructor that is itself running during a
/// panic.
#[cold]
#[inline(never)]
pub(crate) fn dangling_back_references(type_name: &'static str, observers: usize) -> ! {
    #[cfg(debug_assertions)]
    tracing::error!(
        target_type = type_name,
        observers,
        "container destroyed while back-references are still live"
    );

    // Ignore write errors: we are about to abort regardless.
    _ = writeln!(
        std::io::stderr().lock(),
        "fatal: {type_name} destroyed while {observers} back-reference(s) still point at it",
    );

    process::abort();
}

// === StillObserved === //

/// An owner operation that needs exclusive access to its value was attempted while back-references
/// were still bound to it.
///
/// The rejected payload is handed back through [`StillObserved::into_inner`].
#[derive_where(Debug)]
#[derive(Error)]
#[error("{type_name} is still observed by {observers} back-reference(s)")]
pub struct StillObserved<P> {
    #[derive_where(skip)]
    payload: P,
    observers: usize,
    type_name: &'static str,
}

impl<P> StillObserved<P> {
    pub(crate) fn new(payload: P, observers: usize, type_name: &'static str) -> Self {
        Self {
            payload,
            observers,
            type_name,
        }
    }

    /// The observer count at the time the operation was rejected.
    pub fn observers(&self) -> usize {
        self.observers
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn into_inner(self) -> P {
        self.payload
    }
}
