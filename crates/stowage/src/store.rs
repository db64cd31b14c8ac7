#![forbid(unsafe_code)]

//! The live store produced by [`Factory::create`](crate::Factory::create).
//!
//! A [`Store`] is a handle to one assembled node of a store tree: its
//! observable state (declared fields, nested store objects, derived fields
//! and the `$context` reference), its bound actions, its nested child stores,
//! the shared context, a lazily resolved parent pointer, and the registry of
//! teardowns collected during assembly.
//!
//! Parents own their children; children hold their parent weakly through a
//! write-once cell that the parent fills right after it is constructed.

use std::cell::OnceCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use stowage_core::{Observable, Op, ReactiveError, Snapshot, SubscribeOptions, Subscription, Value};

use crate::actions::{ActionResult, Actions};
use crate::error::{Result, StoreError};
use crate::registry::UnsubscribeRegistry;

/// Field holding the shared context as an opaque reference.
pub const CONTEXT_KEY: &str = "$context";

/// Whether `key` is reserved for store bookkeeping (`$context`,
/// `$unsubscribe`, `$getParent` and any other `$`-prefixed name).
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    key.starts_with('$')
}

/// Read the context stored in a store's base object.
///
/// Intended for derived functions, which only see the base object.
#[must_use]
pub fn context_of<C: 'static>(state: &Observable) -> Option<Rc<C>> {
    state.get(CONTEXT_KEY)?.as_opaque()?.downcast::<C>()
}

/// Write-once slot through which a child store reaches its parent.
pub(crate) struct ParentCell<C>(Rc<OnceCell<WeakStore<C>>>);

impl<C> Clone for ParentCell<C> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<C> ParentCell<C> {
    pub(crate) fn new() -> Self {
        Self(Rc::new(OnceCell::new()))
    }

    /// Point every child holding this cell at `parent`. Later calls are ignored.
    pub(crate) fn fill(&self, parent: &Store<C>) {
        let _ = self.0.set(parent.downgrade());
    }

    fn resolve(&self) -> Option<Store<C>> {
        self.0.get()?.upgrade()
    }
}

pub(crate) struct StoreInner<C> {
    pub(crate) state: Observable,
    pub(crate) actions: Actions<C>,
    pub(crate) children: IndexMap<String, Store<C>>,
    pub(crate) context: Rc<C>,
    pub(crate) parent: ParentCell<C>,
    pub(crate) registry: UnsubscribeRegistry,
}

/// A live store.
///
/// Cloning a `Store` creates a new handle to the **same** store.
pub struct Store<C> {
    inner: Rc<StoreInner<C>>,
}

impl<C> Clone for Store<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Store`].
pub struct WeakStore<C> {
    inner: Weak<StoreInner<C>>,
}

impl<C> Clone for WeakStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C> WeakStore<C> {
    #[must_use]
    pub fn upgrade(&self) -> Option<Store<C>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<C> Store<C> {
    pub(crate) fn from_inner(inner: StoreInner<C>) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn registry(&self) -> &UnsubscribeRegistry {
        &self.inner.registry
    }

    /// Read a field: declared state, a nested store object, a derived value
    /// or `$context`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.get(key)
    }

    /// Read a field and convert it.
    pub fn get_as<T>(&self, key: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = ReactiveError>,
    {
        let value = self
            .get(key)
            .ok_or_else(|| StoreError::unknown_field(key))?;
        T::try_from(value).map_err(|source| StoreError::Field {
            key: key.to_owned(),
            source,
        })
    }

    /// Write a state field.
    ///
    /// Reserved, derived and nested-store fields cannot be written.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.check_writable(key)?;
        self.inner
            .state
            .set(key, value)
            .map_err(|source| StoreError::Field {
                key: key.to_owned(),
                source,
            })
    }

    /// Replace a state field with a value computed from its current one.
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> Result<()> {
        self.check_writable(key)?;
        self.inner
            .state
            .update(key, f)
            .map_err(|source| StoreError::Field {
                key: key.to_owned(),
                source,
            })
    }

    /// Invoke an action with this store bound as its receiver.
    pub fn call(&self, name: &str, args: &[Value]) -> ActionResult {
        let handler = self
            .inner
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                name: name.to_owned(),
            })?;
        tracing::trace!(message = "store.action", name);
        handler(self, args)
    }

    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.inner.actions.contains(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.names()
    }

    /// Nested store created from the nested factory declared at `key`.
    #[must_use]
    pub fn child(&self, key: &str) -> Option<Store<C>> {
        self.inner.children.get(key).cloned()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Store<C>)> {
        self.inner.children.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// The context shared by every store in the tree.
    #[must_use]
    pub fn context(&self) -> &Rc<C> {
        &self.inner.context
    }

    /// The immediately enclosing store, or `None` for a root store.
    #[must_use]
    pub fn parent(&self) -> Option<Store<C>> {
        self.inner.parent.resolve()
    }

    /// Tear down every subscription and `on_create` cleanup registered by
    /// the factory chain. Idempotent; subscriptions attached directly with
    /// [`subscribe`](Self::subscribe) are not affected.
    pub fn unsubscribe(&self) {
        let ran = self.inner.registry.fire();
        if ran > 0 {
            tracing::debug!(message = "store.unsubscribe", teardowns = ran);
        }
    }

    /// Attach a subscription outside the factory chain. The caller owns the
    /// returned guard.
    pub fn subscribe(
        &self,
        callback: impl Fn(&[Op]) + 'static,
        options: SubscribeOptions,
    ) -> Subscription {
        self.inner.state.subscribe(callback, options)
    }

    /// Immutable deep copy of the store's fields, derived values included.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.snapshot()
    }

    /// The underlying observable object.
    #[must_use]
    pub fn observable(&self) -> &Observable {
        &self.inner.state
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakStore<C> {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if is_reserved(key) {
            return Err(StoreError::ReservedField {
                key: key.to_owned(),
            });
        }
        if self.inner.children.contains_key(key) {
            return Err(StoreError::NestedStore {
                key: key.to_owned(),
            });
        }
        Ok(())
    }
}

impl<C> fmt::Debug for Store<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.inner.state)
            .field("actions", &self.inner.actions)
            .field(
                "children",
                &self.inner.children.keys().collect::<Vec<_>>(),
            )
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use crate::state::State;

    #[test]
    fn reserved_keys() {
        assert!(is_reserved("$context"));
        assert!(is_reserved("$getParent"));
        assert!(!is_reserved("count"));
    }

    #[test]
    fn get_as_reports_missing_and_mismatched_fields() {
        let store = Factory::new(State::new().value("name", "ada"))
            .create(())
            .unwrap();
        assert!(matches!(
            store.get_as::<i64>("missing"),
            Err(StoreError::UnknownField { .. })
        ));
        assert!(matches!(
            store.get_as::<i64>("name"),
            Err(StoreError::Field { .. })
        ));
        assert_eq!(store.get_as::<String>("name").unwrap(), "ada");
    }

    #[test]
    fn action_lookup_follows_registration_order() {
        let store = Factory::<()>::new(State::new())
            .action("b", |_, _| Ok(Value::Null))
            .action("a", |_, _| Ok(Value::Null))
            .action("b", |_, _| Ok(Value::Int(2)))
            .create(())
            .unwrap();
        assert!(store.has_action("a"));
        assert!(!store.has_action("c"));
        assert_eq!(store.action_names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(store.call("b", &[]).unwrap(), Value::Int(2));
    }

    #[test]
    fn writes_to_reserved_fields_are_rejected() {
        let store = Factory::new(State::new().value("x", 0)).create(()).unwrap();
        assert!(matches!(
            store.set("$context", 1),
            Err(StoreError::ReservedField { .. })
        ));
    }

    #[test]
    fn writes_to_nested_store_fields_are_rejected() {
        let child = Factory::new(State::new().value("i", 0));
        let root = Factory::new(State::new().nested("child", child))
            .create(())
            .unwrap();
        assert!(matches!(
            root.set("child", 1),
            Err(StoreError::NestedStore { .. })
        ));
    }

    #[test]
    fn unknown_action_is_an_error() {
        let store = Factory::new(State::<()>::new()).create(()).unwrap();
        assert!(matches!(
            store.call("nope", &[]),
            Err(StoreError::UnknownAction { .. })
        ));
    }

    #[test]
    fn context_of_reads_the_context_field() {
        let store = Factory::<String>::new(State::new())
            .create(String::from("ctx"))
            .unwrap();
        let ctx = context_of::<String>(store.observable()).unwrap();
        assert!(Rc::ptr_eq(&ctx, store.context()));
        assert!(context_of::<u8>(store.observable()).is_none());
    }

    #[test]
    fn weak_handle_does_not_keep_store_alive() {
        let store = Factory::new(State::new().value("x", 0)).create(()).unwrap();
        let weak = store.downgrade();
        assert!(weak.upgrade().is_some());
        drop(store);
        assert!(weak.upgrade().is_none());
    }
}
