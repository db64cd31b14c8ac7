#![forbid(unsafe_code)]

//! Immutable point-in-time copies of observable objects.
//!
//! A [`Snapshot`] is a deep copy: nested objects become nested snapshots,
//! computed fields are evaluated and stored as plain values, and opaque
//! references pass through by identity. Cloning a snapshot is O(1).

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::observable::Observable;
use crate::value::Value;

/// A frozen copy of an object's fields.
#[derive(Clone, Default)]
pub struct Snapshot {
    fields: Rc<IndexMap<String, Value>>,
    version: u64,
}

impl Snapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Follow a path through nested snapshots.
    ///
    /// An empty path yields `None`.
    #[must_use]
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for key in parents {
            current = current.get(key)?.as_snapshot()?;
        }
        current.get(last)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
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

    /// Version of the source object when the snapshot was taken.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.fields, &other.fields) || self.fields == other.fields
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

/// Take an immutable deep copy of `observable`.
#[must_use]
pub fn snapshot(observable: &Observable) -> Snapshot {
    let (stored, computed, version) = observable.parts();
    let mut fields = IndexMap::with_capacity(stored.len() + computed.len());
    for (key, value) in stored {
        fields.insert(key, freeze(value));
    }
    for key in computed {
        if let Some(value) = observable.get(&key) {
            fields.insert(key, freeze(value));
        }
    }
    Snapshot {
        fields: Rc::new(fields),
        version,
    }
}

fn freeze(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Frozen(snapshot(&obj)),
        Value::List(items) => Value::List(items.into_iter().map(freeze).collect()),
        other => other,
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter())
    }
}
