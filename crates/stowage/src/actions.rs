#![forbid(unsafe_code)]

//! Named action handlers and their composition.
//!
//! An action receives the store it is called on (the Rust rendition of a
//! `this`-bound method) and its arguments, and may read or write any field,
//! call other actions, or reach the context and parent store.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use stowage_core::Value;

use crate::error::StoreError;
use crate::store::Store;

pub type ActionResult = Result<Value, StoreError>;

pub type ActionFn<C> = Rc<dyn Fn(&Store<C>, &[Value]) -> ActionResult>;

/// An ordered map of action names to handlers.
pub struct Actions<C> {
    handlers: IndexMap<String, ActionFn<C>>,
}

impl<C> Clone for Actions<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<C> Default for Actions<C> {
    fn default() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }
}

impl<C> fmt::Debug for Actions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl<C> Actions<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. A later handler with the same name replaces the earlier.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Store<C>, &[Value]) -> ActionResult + 'static,
    {
        self.handlers.insert(name.into(), Rc::new(handler));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionFn<C>> {
        self.handlers.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Merge two action maps.
///
/// Every name from both maps is kept; for names present in both, the handler
/// from `a2` wins. Names keep the position of their first appearance.
#[must_use]
pub fn compose_actions<C>(a1: &Actions<C>, a2: &Actions<C>) -> Actions<C> {
    let mut merged = a1.clone();
    for (name, handler) in &a2.handlers {
        merged.handlers.insert(name.clone(), Rc::clone(handler));
    }
    merged
}
