#![forbid(unsafe_code)]

//! Teardown collection behind `Store::unsubscribe`.
//!
//! # Invariants
//!
//! 1. Teardowns run in registration order.
//! 2. Firing is idempotent: the second and later calls do nothing.
//! 3. A teardown registered after firing runs immediately.

use std::cell::{Cell, RefCell};
use std::fmt;

use stowage_core::Subscription;

/// A one-shot cleanup callback.
pub struct Teardown(Box<dyn FnOnce()>);

impl Teardown {
    #[must_use]
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)();
    }
}

impl From<Subscription> for Teardown {
    fn from(subscription: Subscription) -> Self {
        Self::new(move || subscription.unsubscribe())
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown(..)")
    }
}

/// Teardowns owned by a single store instance.
#[derive(Default)]
pub struct UnsubscribeRegistry {
    teardowns: RefCell<Vec<Teardown>>,
    fired: Cell<bool>,
}

impl UnsubscribeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, teardown: Teardown) {
        if self.fired.get() {
            teardown.run();
            return;
        }
        self.teardowns.borrow_mut().push(teardown);
    }

    /// Run every collected teardown once. Returns how many ran.
    pub fn fire(&self) -> usize {
        if self.fired.replace(true) {
            return 0;
        }
        let teardowns = std::mem::take(&mut *self.teardowns.borrow_mut());
        let count = teardowns.len();
        for teardown in teardowns {
            teardown.run();
        }
        count
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.teardowns.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teardowns.borrow().is_empty()
    }
}

impl fmt::Debug for UnsubscribeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeRegistry")
            .field("pending", &self.len())
            .field("fired", &self.fired.get())
            .finish()
    }
}
