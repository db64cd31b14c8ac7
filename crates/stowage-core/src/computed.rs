#![forbid(unsafe_code)]

//! Lazy computed values that auto-update from an [`Observable`] source.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. An internal watch on the source marks
//! the cache dirty on every mutation batch (including mutations of nested
//! objects). The next call to [`get()`](Computed::get) recomputes and caches
//! the result.
//!
//! The compute function holds the source weakly, so a computed field attached
//! to its own source does not keep that source alive.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of the
//!    source (no stale reads after a mutation completes).
//! 2. The compute function is called at most once per dependency change cycle
//!    (memoization).
//! 3. If the source has not changed, `get()` returns the cached value.
//! 4. Version increments by exactly 1 per recomputation.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the cached value remains from the last
//!   successful computation and the dirty flag stays set.
//! - **Source dropped**: the compute function yields `T::default()` on its
//!   next run; the subscription becomes inert, so this happens at most once.
//! - **Compute function reads its own field**: re-entrant borrow panic, the
//!   same as any self-referential computation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::observable::{Observable, Subscription};

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    /// `None` only before the first computation.
    cached: Option<T>,
    dirty: Cell<bool>,
    version: u64,
    /// Keeps the dirty-marking callback registered.
    _subscriptions: Vec<Subscription>,
}

/// A lazily-evaluated, memoized value derived from an [`Observable`].
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Computed")
                .field("cached", &inner.cached)
                .field("dirty", &inner.dirty.get())
                .field("version", &inner.version)
                .finish(),
            Err(_) => f.write_str("Computed(<computing>)"),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value derived from an observable object.
    ///
    /// `map` receives the source object and may read any of its fields.
    pub fn from_observable(source: &Observable, map: impl Fn(&Observable) -> T + 'static) -> Self
    where
        T: Default,
    {
        let weak_source = source.downgrade();
        let compute = move || match weak_source.upgrade() {
            Some(src) => map(&src),
            None => T::default(),
        };

        let inner = Rc::new(RefCell::new(ComputedInner {
            compute: Box::new(compute),
            cached: None,
            dirty: Cell::new(true),
            version: 0,
            _subscriptions: Vec::new(),
        }));

        let weak_inner = Rc::downgrade(&inner);
        let sub = source.watch(move |_| {
            if let Some(strong) = weak_inner.upgrade()
                && let Ok(inner) = strong.try_borrow()
            {
                inner.dirty.set(true);
            }
        });

        inner.borrow_mut()._subscriptions.push(sub);

        Self { inner }
    }

    /// Get the current value, recomputing if the source has changed.
    #[must_use]
    pub fn get(&self) -> T {
        let mut inner = self.inner.borrow_mut();
        if !inner.dirty.get()
            && let Some(value) = &inner.cached
        {
            return value.clone();
        }
        let value = (inner.compute)();
        inner.cached = Some(value.clone());
        inner.dirty.set(false);
        inner.version += 1;
        value
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty.get()
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }
}
