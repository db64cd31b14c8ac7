#![forbid(unsafe_code)]

//! Observable objects with change notification.
//!
//! # Design
//!
//! [`Observable`] is a handle to an insertion-ordered map of named fields held
//! in shared, reference-counted storage. Every effective write produces an
//! [`Op`] that is delivered to subscribers:
//!
//! - **Synchronous** subscribers ([`SubscribeOptions::sync`]) are called once
//!   per op, inside the write.
//! - **Deferred** subscribers (the default) accumulate ops and are called once
//!   per batch when [`flush`](crate::scheduler::flush) runs.
//!
//! An object stored as a field of another object forwards its ops to the
//! container with the field name prefixed to the op path, so subscribing to
//! the root of a tree observes every mutation below it.
//!
//! Internal listeners (forwarding links and computed dirty-markers) are
//! delivered before any subscriber, so a subscriber reading a computed
//! field anywhere up the tree sees the write that triggered it.
//!
//! # Failure Modes
//!
//! - **Cyclic containment**: storing an object inside itself, directly or
//!   through a descendant, would forward ops forever. Such writes are
//!   rejected with [`ReactiveError::SelfReference`].
//! - **Subscriber mutates during notification**: allowed. No borrow is held
//!   while callbacks run; the nested write notifies recursively.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::computed::Computed;
use crate::error::ReactiveError;
use crate::scheduler;
use crate::snapshot::{self, Snapshot};
use crate::value::Value;

/// Kind of mutation described by an [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Set,
    Delete,
}

/// A single field mutation.
///
/// `path` starts at the object the subscriber is attached to; ops forwarded
/// from nested objects carry one extra leading segment per level.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub kind: OpKind,
    pub path: Vec<String>,
    pub value: Value,
    pub previous: Value,
}

impl Op {
    /// First path segment: the field of the subscribed object that changed.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }

    /// Whether this op changed `key` or something nested below it.
    #[must_use]
    pub fn touches(&self, key: &str) -> bool {
        self.key() == Some(key)
    }

    fn prefixed(&self, key: &str) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.push(key.to_owned());
        path.extend(self.path.iter().cloned());
        Self {
            kind: self.kind,
            path,
            value: self.value.clone(),
            previous: self.previous.clone(),
        }
    }
}

/// Delivery options for a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Deliver each op immediately instead of batching until the next flush.
    pub notify_in_sync: bool,
}

impl SubscribeOptions {
    /// Immediate, per-op delivery.
    #[must_use]
    pub const fn sync() -> Self {
        Self {
            notify_in_sync: true,
        }
    }

    /// Batched delivery on [`flush`](crate::scheduler::flush).
    #[must_use]
    pub const fn deferred() -> Self {
        Self {
            notify_in_sync: false,
        }
    }
}

/// A registered callback. Objects hold it weakly; the [`Subscription`]
/// guard holds the only strong reference.
pub(crate) struct Listener {
    callback: Box<dyn Fn(&[Op])>,
    notify_in_sync: bool,
    internal: bool,
    pending: RefCell<Vec<Op>>,
    queued: Cell<bool>,
}

impl Listener {
    fn notify(self: &Rc<Self>, op: &Op) {
        if self.notify_in_sync {
            (self.callback)(std::slice::from_ref(op));
            return;
        }
        self.pending.borrow_mut().push(op.clone());
        if !self.queued.replace(true) {
            scheduler::enqueue(Rc::downgrade(self));
        }
    }

    /// Deliver every op accumulated since the last drain.
    pub(crate) fn drain(&self) {
        self.queued.set(false);
        let ops = std::mem::take(&mut *self.pending.borrow_mut());
        if !ops.is_empty() {
            (self.callback)(&ops);
        }
    }
}

/// RAII guard for a subscriber callback.
///
/// The callback stays registered for as long as this guard is alive.
#[must_use = "dropping a Subscription detaches its callback"]
pub struct Subscription {
    listener: Rc<Listener>,
}

impl Subscription {
    /// Detach the callback. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the callback is currently waiting in the deferred queue.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.listener.queued.get()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("notify_in_sync", &self.listener.notify_in_sync)
            .field("queued", &self.listener.queued.get())
            .finish()
    }
}

struct ObservableInner {
    fields: IndexMap<String, Value>,
    computed: IndexMap<String, Computed<Value>>,
    listeners: Vec<Weak<Listener>>,
    /// Forwarding subscriptions on nested objects, keyed by field.
    links: AHashMap<String, Subscription>,
    version: u64,
}

/// A shared object of named fields whose writes are observable.
///
/// Cloning an `Observable` creates a new handle to the **same** object.
#[derive(Clone)]
pub struct Observable {
    inner: Rc<RefCell<ObservableInner>>,
}

/// Non-owning handle to an [`Observable`].
#[derive(Clone)]
pub struct WeakObservable {
    inner: Weak<RefCell<ObservableInner>>,
}

impl WeakObservable {
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

impl fmt::Debug for WeakObservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObservable")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                fields: IndexMap::new(),
                computed: IndexMap::new(),
                listeners: Vec::new(),
                links: AHashMap::new(),
                version: 0,
            })),
        }
    }

    /// Create an object from initial fields. No notifications are emitted.
    ///
    /// Later duplicates of a key replace earlier ones.
    #[must_use]
    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let obj = Self::new();
        for (key, value) in fields {
            let key = key.into();
            let value = value.into();
            let link = match &value {
                Value::Object(child) => Some(obj.link(&key, child)),
                _ => None,
            };
            let mut inner = obj.inner.borrow_mut();
            match link {
                Some(link) => {
                    inner.links.insert(key.clone(), link);
                }
                None => {
                    inner.links.remove(&key);
                }
            }
            inner.fields.insert(key, value);
        }
        obj
    }

    /// Read a stored field, or evaluate a computed one.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let computed = {
            let inner = self.inner.borrow();
            if let Some(value) = inner.fields.get(key) {
                return Some(value.clone());
            }
            inner.computed.get(key)?.clone()
        };
        Some(computed.get())
    }

    /// Whether `key` names a stored or computed field.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let inner = self.inner.borrow();
        inner.fields.contains_key(key) || inner.computed.contains_key(key)
    }

    /// Whether `key` names a computed field.
    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.inner.borrow().computed.contains_key(key)
    }

    /// Stored field names in insertion order, followed by computed names.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.borrow();
        inner
            .fields
            .keys()
            .chain(inner.computed.keys())
            .cloned()
            .collect()
    }

    /// Write a field.
    ///
    /// Writing a value equal to the current one is a no-op.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let value = value.into();
        if let Value::Object(child) = &value
            && (child.ptr_eq(self) || child.contains(self))
        {
            return Err(ReactiveError::SelfReference {
                key: key.to_owned(),
            });
        }
        let previous = {
            let inner = self.inner.borrow();
            if inner.computed.contains_key(key) {
                return Err(ReactiveError::ReadOnly {
                    key: key.to_owned(),
                });
            }
            match inner.fields.get(key) {
                Some(current) if *current == value => return Ok(()),
                current => current.cloned().unwrap_or_default(),
            }
        };
        let link = match &value {
            Value::Object(child) => Some(self.link(key, child)),
            _ => None,
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.fields.insert(key.to_owned(), value.clone());
            match link {
                Some(link) => {
                    inner.links.insert(key.to_owned(), link);
                }
                None => {
                    inner.links.remove(key);
                }
            }
        }
        self.emit(Op {
            kind: OpKind::Set,
            path: vec![key.to_owned()],
            value,
            previous,
        });
        Ok(())
    }

    /// Replace a field with a value computed from its current one.
    ///
    /// A missing field is passed to `f` as [`Value::Null`].
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> Result<(), ReactiveError> {
        let current = self.get(key).unwrap_or_default();
        self.set(key, f(&current))
    }

    /// Remove a stored field, returning its last value.
    ///
    /// Computed fields cannot be removed; `None` is returned for them.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            let previous = inner.fields.shift_remove(key)?;
            inner.links.remove(key);
            previous
        };
        self.emit(Op {
            kind: OpKind::Delete,
            path: vec![key.to_owned()],
            value: Value::Null,
            previous: previous.clone(),
        });
        Some(previous)
    }

    /// Attach a read-only computed field.
    ///
    /// Replaces an existing computed field of the same name.
    pub fn define_computed(
        &self,
        key: &str,
        computed: Computed<Value>,
    ) -> Result<(), ReactiveError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fields.contains_key(key) {
            return Err(ReactiveError::Shadowed {
                key: key.to_owned(),
            });
        }
        inner.computed.insert(key.to_owned(), computed);
        Ok(())
    }

    /// Register a callback for mutation batches.
    ///
    /// The callback is detached when the returned guard is dropped.
    pub fn subscribe(
        &self,
        callback: impl Fn(&[Op]) + 'static,
        options: SubscribeOptions,
    ) -> Subscription {
        self.attach(callback, options.notify_in_sync, false)
    }

    /// Register a synchronous callback delivered ahead of every subscriber.
    pub(crate) fn watch(&self, callback: impl Fn(&[Op]) + 'static) -> Subscription {
        self.attach(callback, true, true)
    }

    fn attach(
        &self,
        callback: impl Fn(&[Op]) + 'static,
        notify_in_sync: bool,
        internal: bool,
    ) -> Subscription {
        let listener = Rc::new(Listener {
            callback: Box::new(callback),
            notify_in_sync,
            internal,
            pending: RefCell::new(Vec::new()),
            queued: Cell::new(false),
        });
        self.inner
            .borrow_mut()
            .listeners
            .push(Rc::downgrade(&listener));
        Subscription { listener }
    }

    /// Number of live subscribers. Forwarding links and computed watches
    /// are not counted.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|l| !l.internal)
            .count()
    }

    /// Monotonic mutation counter covering this object and its descendants.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Immutable deep copy of the current fields.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        snapshot::snapshot(self)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObservable {
        WeakObservable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Stored fields, computed names and version, for snapshotting.
    pub(crate) fn parts(&self) -> (Vec<(String, Value)>, Vec<String>, u64) {
        let inner = self.inner.borrow();
        let stored = inner
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let computed = inner.computed.keys().cloned().collect();
        (stored, computed, inner.version)
    }

    /// Copy the stored fields into a new, unsubscribed object. Nested
    /// objects (including those inside lists) are copied recursively;
    /// computed fields are not carried over.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let (stored, _, _) = self.parts();
        Self::from_fields(stored.into_iter().map(|(k, v)| (k, v.deep_clone())))
    }

    /// Whether `target` is reachable through nested object fields.
    fn contains(&self, target: &Observable) -> bool {
        let children: Vec<Observable> = self
            .inner
            .borrow()
            .fields
            .values()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        children
            .iter()
            .any(|child| child.ptr_eq(target) || child.contains(target))
    }

    fn link(&self, key: &str, child: &Observable) -> Subscription {
        let parent = self.downgrade();
        let key = key.to_owned();
        child.watch(move |ops| {
            if let Some(parent) = parent.upgrade() {
                for op in ops {
                    parent.emit(op.prefixed(&key));
                }
            }
        })
    }

    fn emit(&self, op: Op) {
        let listeners: Vec<Rc<Listener>> = {
            let mut inner = self.inner.borrow_mut();
            inner.version += 1;
            inner.listeners.retain(|l| l.strong_count() > 0);
            inner.listeners.iter().filter_map(Weak::upgrade).collect()
        };
        let (internal, external): (Vec<_>, Vec<_>) =
            listeners.into_iter().partition(|l| l.internal);
        for listener in internal.iter().chain(&external) {
            listener.notify(&op);
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Observable")
                .field("fields", &inner.fields)
                .field("computed", &inner.computed.keys().collect::<Vec<_>>())
                .field("version", &inner.version)
                .finish(),
            Err(_) => f.write_str("Observable(<borrowed>)"),
        }
    }
}

/// Subscribe to changes of a single field.
///
/// `callback` receives the field's current value once per delivered batch
/// that touched `key` (including mutations nested below it).
pub fn subscribe_key(
    observable: &Observable,
    key: &str,
    callback: impl Fn(&Value) + 'static,
    options: SubscribeOptions,
) -> Subscription {
    let source = observable.downgrade();
    let key = key.to_owned();
    observable.subscribe(
        move |ops| {
            if !ops.iter().any(|op| op.touches(&key)) {
                return;
            }
            if let Some(source) = source.upgrade() {
                callback(&source.get(&key).unwrap_or_default());
            }
        },
        options,
    )
}
