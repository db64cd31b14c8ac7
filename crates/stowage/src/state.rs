#![forbid(unsafe_code)]

//! State declarations and initial-state seeds.

use std::fmt;

use indexmap::IndexMap;
use stowage_core::Value;

use crate::factory::Factory;

/// A declared state field: a plain default value or a nested factory.
pub enum StateField<C> {
    Value(Value),
    Nested(Factory<C>),
}

impl<C> Clone for StateField<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Nested(f) => Self::Nested(f.clone()),
        }
    }
}

impl<C> fmt::Debug for StateField<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Nested(factory) => f.debug_tuple("Nested").field(factory).finish(),
        }
    }
}

/// The ordered state shape of a factory.
pub struct State<C> {
    fields: IndexMap<String, StateField<C>>,
}

impl<C> Clone for State<C> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
        }
    }
}

impl<C> Default for State<C> {
    fn default() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }
}

impl<C> fmt::Debug for State<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

impl<C> State<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a plain field with its default value.
    #[must_use]
    pub fn value(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields
            .insert(key.into(), StateField::Value(default.into()));
        self
    }

    /// Declare a field instantiated from a nested factory.
    #[must_use]
    pub fn nested(mut self, key: impl Into<String>, factory: Factory<C>) -> Self {
        self.fields.insert(key.into(), StateField::Nested(factory));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StateField<C>> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateField<C>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A caller-supplied override for one field at `create` time.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed {
    Value(Value),
    /// Partial initial state for a nested-factory field.
    Nested(InitialState),
}

/// Partial initial state passed to `create_with`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialState {
    fields: IndexMap<String, Seed>,
}

impl InitialState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), Seed::Value(value.into()));
        self
    }

    #[must_use]
    pub fn nested(mut self, key: impl Into<String>, seed: InitialState) -> Self {
        self.fields.insert(key.into(), Seed::Nested(seed));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Seed> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Seed> {
        self.fields.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
