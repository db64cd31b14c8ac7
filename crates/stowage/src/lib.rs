#![forbid(unsafe_code)]

//! Composable, hierarchical observable stores.
//!
//! A [`Factory`] is an immutable template assembled by chaining builder
//! calls: a [`State`] shape (plain defaults and nested factories),
//! [`Actions`], [`DerivedProps`], subscriptions and `on_create` hooks.
//! [`Factory::create`] turns the template into a live [`Store`] tree that
//! shares one context value across every level.
//!
//! ```
//! use stowage::prelude::*;
//!
//! let counter = Factory::new(State::new().value("count", 0))
//!     .derive("doubled", |s: &Observable| {
//!         s.get("count").and_then(|v| v.as_i64()).unwrap_or(0) * 2
//!     })
//!     .action("increment", |s, _| {
//!         let n: i64 = s.get_as("count")?;
//!         s.set("count", n + 1)?;
//!         Ok(Value::Null)
//!     });
//!
//! let store = counter.create(()).unwrap();
//! store.call("increment", &[]).unwrap();
//! assert_eq!(store.get_as::<i64>("doubled").unwrap(), 2);
//! ```
//!
//! # Invariants
//!
//! 1. Builder methods never modify the receiver.
//! 2. Every `create` produces an independent store tree, with its own
//!    teardown registry per store.
//! 3. Every store in one tree shares the same context (`Rc::ptr_eq`).
//! 4. `parent()` is `None` only for the root of a tree.
//! 5. Derived values observed from a subscription callback reflect the
//!    mutation that triggered it.

pub mod actions;
pub mod derived;
pub mod error;
pub mod factory;
pub mod registry;
pub mod state;
pub mod store;

pub use actions::{ActionFn, ActionResult, Actions, compose_actions};
pub use derived::{DerivedFn, DerivedProps, combine_derived_props, create_derived};
pub use error::{Result, StoreError};
pub use factory::{Factory, LiveSubscriptionFn, OnCreateFn, SnapshotSubscriptionFn};
pub use registry::{Teardown, UnsubscribeRegistry};
pub use state::{InitialState, Seed, State, StateField};
pub use store::{CONTEXT_KEY, Store, WeakStore, context_of, is_reserved};

pub use stowage_core as core;

pub mod prelude {
    pub use crate::{
        Actions, DerivedProps, Factory, InitialState, State, Store, StoreError, Teardown,
        context_of,
    };
    pub use stowage_core::{
        Observable, Op, OpKind, Opaque, Snapshot, SubscribeOptions, Subscription, Value, flush,
        subscribe_key,
    };
}
