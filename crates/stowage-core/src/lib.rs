#![forbid(unsafe_code)]

//! Observable state primitives for Stowage.
//!
//! This crate provides the change-tracking layer that stores are assembled on:
//!
//! - [`Observable`]: a shared, version-tracked object of named fields with
//!   change notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Computed`]: a lazily-evaluated, memoized value derived from an
//!   `Observable`, used to attach read-only computed fields.
//! - [`Snapshot`]: an immutable point-in-time copy of an object tree.
//! - [`Opaque`]: a non-reactive reference stored and copied by identity.
//!
//! # Architecture
//!
//! `Observable` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` pointers and cleaned up lazily during
//! notification. Objects stored inside other objects forward their mutations
//! to the parent with the field name prefixed to the op path.
//!
//! Deferred subscribers are batched through a thread-local queue that is
//! drained by [`flush`]; synchronous subscribers run inside the write.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes a field.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a field to a value equal to the current value is a no-op (no
//!    version bump, no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Reading a computed field never returns a value older than the last
//!    completed mutation of its source.

pub mod computed;
pub mod error;
pub mod observable;
pub mod scheduler;
pub mod snapshot;
pub mod value;

pub use computed::Computed;
pub use error::ReactiveError;
pub use observable::{
    Observable, Op, OpKind, SubscribeOptions, Subscription, WeakObservable, subscribe_key,
};
pub use scheduler::{flush, pending};
pub use snapshot::{Snapshot, snapshot};
pub use value::{Opaque, Value};
