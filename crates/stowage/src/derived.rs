#![forbid(unsafe_code)]

//! Derived properties: named pure functions of the base state.
//!
//! [`create_derived`] layers each function onto a base object as a read-only
//! computed field. The layered object forwards every read and write of a
//! base field to the base (they are the same object), so a write is visible
//! both to direct reads and to the next recomputation. Derived values are
//! recomputed lazily: a mutation batch marks them dirty and the next read
//! evaluates them, which keeps them consistent at every notification
//! boundary.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use stowage_core::{Computed, Observable, Value};

use crate::error::StoreError;

/// A derived property. Receives the base object, reserved fields included,
/// and must not mutate it.
pub type DerivedFn = Rc<dyn Fn(&Observable) -> Value>;

/// An ordered map of derived property names to functions.
#[derive(Clone, Default)]
pub struct DerivedProps {
    fns: IndexMap<String, DerivedFn>,
}

impl fmt::Debug for DerivedProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fns.keys()).finish()
    }
}

impl DerivedProps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property. A later function with the same name replaces the earlier.
    #[must_use]
    pub fn with<F, V>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Observable) -> V + 'static,
        V: Into<Value>,
    {
        let derived: DerivedFn = Rc::new(move |state: &Observable| -> Value { f(state).into() });
        self.fns.insert(name.into(), derived);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DerivedFn> {
        self.fns.get(name)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DerivedFn)> {
        self.fns.iter().map(|(k, f)| (k.as_str(), f))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

/// Merge two derived-property maps; on collision `d2` wins.
#[must_use]
pub fn combine_derived_props(d1: &DerivedProps, d2: &DerivedProps) -> DerivedProps {
    let mut merged = d1.clone();
    for (name, f) in &d2.fns {
        merged.fns.insert(name.clone(), Rc::clone(f));
    }
    merged
}

/// Layer `props` onto `state` as computed fields and return the layered
/// object.
///
/// Fails if a property name is already a stored field of `state`.
pub fn create_derived(state: &Observable, props: &DerivedProps) -> Result<Observable, StoreError> {
    for (name, f) in props.iter() {
        let f = Rc::clone(f);
        let computed = Computed::from_observable(state, move |base| f(base));
        state.define_computed(name, computed)?;
    }
    Ok(state.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::{ReactiveError, SubscribeOptions, flush};
    use std::cell::RefCell;

    fn x_of(state: &Observable) -> i64 {
        state.get("x").and_then(|v| v.as_i64()).unwrap_or_default()
    }

    #[test]
    fn exposes_base_and_derived_fields() {
        let base = Observable::from_fields([("x", 1)]);
        let view = create_derived(
            &base,
            &DerivedProps::new().with("y", |s: &Observable| (x_of(s) * 2).to_string()),
        )
        .unwrap();
        assert_eq!(view.get("x"), Some(Value::Int(1)));
        assert_eq!(view.get("y"), Some(Value::from("2")));
    }

    #[test]
    fn writes_through_view_reach_base_and_recomputation() {
        let base = Observable::from_fields([("x", 1)]);
        let view = create_derived(
            &base,
            &DerivedProps::new().with("y", |s: &Observable| (x_of(s) * 2).to_string()),
        )
        .unwrap();

        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let watched = view.clone();
        let _sub = view.subscribe(
            move |_| {
                let snap = watched.snapshot();
                *sink.borrow_mut() = Some((snap.get("x").cloned(), snap.get("y").cloned()));
            },
            SubscribeOptions::deferred(),
        );

        view.set("x", 2).unwrap();
        assert_eq!(base.get("x"), Some(Value::Int(2)));
        assert_eq!(view.get("x"), Some(Value::Int(2)));

        flush();
        assert_eq!(
            *seen.borrow(),
            Some((Some(Value::Int(2)), Some(Value::from("4"))))
        );
    }

    #[test]
    fn derived_fields_are_read_only() {
        let base = Observable::from_fields([("x", 1)]);
        let view = create_derived(&base, &DerivedProps::new().with("y", x_of)).unwrap();
        let err = view.set("y", 0).unwrap_err();
        assert_eq!(err, ReactiveError::ReadOnly { key: "y".into() });
    }

    #[test]
    fn derived_name_colliding_with_base_field_fails() {
        let base = Observable::from_fields([("x", 1)]);
        let err = create_derived(&base, &DerivedProps::new().with("x", x_of)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Reactive(ReactiveError::Shadowed { .. })
        ));
    }

    #[test]
    fn combine_keeps_both_and_second_wins() {
        let state = Observable::from_fields([("x", 1)]);
        let d1 = DerivedProps::new()
            .with("y", |s: &Observable| (x_of(s) * 2).to_string())
            .with("z", |_: &Observable| "first");
        let d2 = DerivedProps::new()
            .with("even", |s: &Observable| x_of(s) % 2 == 0)
            .with("z", |_: &Observable| "second");

        let d = combine_derived_props(&d1, &d2);
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["y", "z", "even"]);
        assert_eq!((d.get("y").unwrap())(&state), Value::from("2"));
        assert_eq!((d.get("even").unwrap())(&state), Value::Bool(false));
        assert_eq!((d.get("z").unwrap())(&state), Value::from("second"));
    }
}
