#![forbid(unsafe_code)]

//! Immutable factory chains and store assembly.
//!
//! A [`Factory`] is a template: every builder method returns a new factory
//! with one part of its configuration extended, and leaves the receiver
//! untouched. [`Factory::create`] instantiates the template into a [`Store`].
//!
//! # Assembly order
//!
//! 1. Derived-property names are stripped from the initial state.
//! 2. Declared defaults are merged with the initial state (shallow).
//! 3. Nested factories are created depth-first with the same context, their
//!    slice of the initial state, and a parent cell for this level.
//! 4. The base object is built from the merged fields plus `$context`.
//! 5. Derived properties are layered on; the store now exists and the parent
//!    cell handed to the children is filled.
//! 6. Subscriptions are attached in registration order.
//! 7. `on_create` hooks run in registration order.
//!
//! Errors propagate to the caller of `create` without rollback. Anything
//! already attached belongs to the partially built stores, which are
//! dropped with the error and detach their subscriptions as they go.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use stowage_core::{Observable, Op, Opaque, Snapshot, SubscribeOptions, Subscription, Value};

use crate::actions::{ActionResult, Actions, compose_actions};
use crate::derived::{DerivedProps, combine_derived_props, create_derived};
use crate::error::{Result, StoreError};
use crate::registry::{Teardown, UnsubscribeRegistry};
use crate::state::{InitialState, Seed, State, StateField};
use crate::store::{CONTEXT_KEY, ParentCell, Store, StoreInner, is_reserved};

pub type LiveSubscriptionFn<C> = Rc<dyn Fn(&Store<C>, &C, &[Op])>;
pub type SnapshotSubscriptionFn<C> = Rc<dyn Fn(&Snapshot, &C, &[Op])>;
pub type OnCreateFn<C> = Rc<dyn Fn(&Store<C>) -> Result<Option<Teardown>>>;

enum SubscriptionCallback<C> {
    Live(LiveSubscriptionFn<C>),
    Snapshot(SnapshotSubscriptionFn<C>),
}

struct SubscriptionDescriptor<C> {
    callback: SubscriptionCallback<C>,
    options: SubscribeOptions,
}

impl<C> Clone for SubscriptionDescriptor<C> {
    fn clone(&self) -> Self {
        let callback = match &self.callback {
            SubscriptionCallback::Live(f) => SubscriptionCallback::Live(Rc::clone(f)),
            SubscriptionCallback::Snapshot(f) => SubscriptionCallback::Snapshot(Rc::clone(f)),
        };
        Self {
            callback,
            options: self.options,
        }
    }
}

impl<C: 'static> SubscriptionDescriptor<C> {
    fn attach(&self, store: &Store<C>) -> Subscription {
        let weak = store.downgrade();
        match &self.callback {
            SubscriptionCallback::Live(f) => {
                let f = Rc::clone(f);
                store.observable().subscribe(
                    move |ops| {
                        if let Some(store) = weak.upgrade() {
                            f(&store, store.context().as_ref(), ops);
                        }
                    },
                    self.options,
                )
            }
            SubscriptionCallback::Snapshot(f) => {
                let f = Rc::clone(f);
                store.observable().subscribe(
                    move |ops| {
                        if let Some(store) = weak.upgrade() {
                            f(&store.snapshot(), store.context().as_ref(), ops);
                        }
                    },
                    self.options,
                )
            }
        }
    }
}

struct FactoryConfig<C> {
    base_state: State<C>,
    base_actions: Actions<C>,
    base_derived: DerivedProps,
    base_subscriptions: Vec<SubscriptionDescriptor<C>>,
    on_create: Vec<OnCreateFn<C>>,
}

impl<C> Clone for FactoryConfig<C> {
    fn clone(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_actions: self.base_actions.clone(),
            base_derived: self.base_derived.clone(),
            base_subscriptions: self.base_subscriptions.clone(),
            on_create: self.on_create.clone(),
        }
    }
}

/// An immutable store template.
///
/// Cloning a `Factory` is cheap and shares the configuration.
pub struct Factory<C = ()> {
    config: Rc<FactoryConfig<C>>,
}

impl<C> Clone for Factory<C> {
    fn clone(&self) -> Self {
        Self {
            config: Rc::clone(&self.config),
        }
    }
}

impl<C> fmt::Debug for Factory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("state", &self.config.base_state)
            .field("actions", &self.config.base_actions)
            .field("derived", &self.config.base_derived)
            .field("subscriptions", &self.config.base_subscriptions.len())
            .field("on_create", &self.config.on_create.len())
            .finish()
    }
}

impl<C: 'static> Factory<C> {
    /// Start a chain from a state declaration.
    #[must_use]
    pub fn new(state: State<C>) -> Self {
        Self {
            config: Rc::new(FactoryConfig {
                base_state: state,
                base_actions: Actions::new(),
                base_derived: DerivedProps::new(),
                base_subscriptions: Vec::new(),
                on_create: Vec::new(),
            }),
        }
    }

    fn extend(&self, f: impl FnOnce(&mut FactoryConfig<C>)) -> Self {
        let mut config = (*self.config).clone();
        f(&mut config);
        Self {
            config: Rc::new(config),
        }
    }

    /// Add action handlers; on name collisions the new handlers win.
    #[must_use]
    pub fn actions(&self, actions: Actions<C>) -> Self {
        self.extend(|config| {
            config.base_actions = compose_actions(&config.base_actions, &actions);
        })
    }

    /// Add a single action handler.
    #[must_use]
    pub fn action<F>(&self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Store<C>, &[Value]) -> ActionResult + 'static,
    {
        self.actions(Actions::new().with(name, handler))
    }

    /// Add derived properties; on name collisions the new functions win.
    ///
    /// A derived name must not repeat a state field name. The check runs in
    /// [`validate`](Self::validate) and at the start of `create`.
    #[must_use]
    pub fn derived(&self, props: DerivedProps) -> Self {
        self.extend(|config| {
            config.base_derived = combine_derived_props(&config.base_derived, &props);
        })
    }

    /// Add a single derived property.
    #[must_use]
    pub fn derive<F, V>(&self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Observable) -> V + 'static,
        V: Into<Value>,
    {
        self.derived(DerivedProps::new().with(name, f))
    }

    /// Subscribe to the live store on every delivered mutation batch.
    #[must_use]
    pub fn subscribe<F>(&self, f: F, options: SubscribeOptions) -> Self
    where
        F: Fn(&Store<C>, &C, &[Op]) + 'static,
    {
        let descriptor = SubscriptionDescriptor {
            callback: SubscriptionCallback::Live(Rc::new(f)),
            options,
        };
        self.extend(|config| config.base_subscriptions.push(descriptor))
    }

    /// Subscribe to a fresh snapshot of the store on every delivered
    /// mutation batch.
    #[must_use]
    pub fn subscribe_snapshot<F>(&self, f: F, options: SubscribeOptions) -> Self
    where
        F: Fn(&Snapshot, &C, &[Op]) + 'static,
    {
        let descriptor = SubscriptionDescriptor {
            callback: SubscriptionCallback::Snapshot(Rc::new(f)),
            options,
        };
        self.extend(|config| config.base_subscriptions.push(descriptor))
    }

    /// Run `f` with the finished store at the end of `create`. A returned
    /// teardown runs on `Store::unsubscribe`.
    #[must_use]
    pub fn on_create<F>(&self, f: F) -> Self
    where
        F: Fn(&Store<C>) -> Option<Teardown> + 'static,
    {
        self.try_on_create(move |store| Ok(f(store)))
    }

    /// Like [`on_create`](Self::on_create), for hooks that can fail. An
    /// error aborts `create` and is returned to its caller.
    #[must_use]
    pub fn try_on_create<F>(&self, f: F) -> Self
    where
        F: Fn(&Store<C>) -> Result<Option<Teardown>> + 'static,
    {
        self.extend(|config| config.on_create.push(Rc::new(f)))
    }

    #[must_use]
    pub fn state(&self) -> &State<C> {
        &self.config.base_state
    }

    #[must_use]
    pub fn declared_actions(&self) -> &Actions<C> {
        &self.config.base_actions
    }

    #[must_use]
    pub fn derived_props(&self) -> &DerivedProps {
        &self.config.base_derived
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.config.base_subscriptions.len()
    }

    #[must_use]
    pub fn on_create_count(&self) -> usize {
        self.config.on_create.len()
    }

    /// Check the configuration of this factory and every nested factory.
    pub fn validate(&self) -> Result<()> {
        self.check_names()?;
        for (_, field) in self.config.base_state.iter() {
            if let StateField::Nested(factory) = field {
                factory.validate()?;
            }
        }
        Ok(())
    }

    /// Create a store with the declared defaults.
    pub fn create(&self, context: impl Into<Rc<C>>) -> Result<Store<C>> {
        self.create_with(context, InitialState::new())
    }

    /// Create a store, overriding declared defaults with `initial`.
    pub fn create_with(&self, context: impl Into<Rc<C>>, initial: InitialState) -> Result<Store<C>> {
        self.assemble(context.into(), initial, ParentCell::new())
    }

    fn check_names(&self) -> Result<()> {
        let config = &self.config;
        for key in config.base_state.keys() {
            if is_reserved(key) {
                return Err(StoreError::ReservedField {
                    key: key.to_owned(),
                });
            }
        }
        for key in config.base_derived.keys() {
            if is_reserved(key) {
                return Err(StoreError::ReservedField {
                    key: key.to_owned(),
                });
            }
            if config.base_state.contains_key(key) {
                return Err(StoreError::DerivedShadowsState {
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn assemble(
        &self,
        context: Rc<C>,
        mut initial: InitialState,
        parent: ParentCell<C>,
    ) -> Result<Store<C>> {
        let config = &*self.config;
        self.check_names()?;

        for key in config.base_derived.keys() {
            if initial.remove(key).is_some() {
                tracing::debug!(message = "store.initial_state.derived_stripped", key);
            }
        }

        let own_cell = ParentCell::new();
        let mut fields = Vec::with_capacity(config.base_state.len() + 1);
        let mut children = IndexMap::new();
        for (key, field) in config.base_state.iter() {
            let seed = initial.remove(key);
            match field {
                StateField::Value(default) => {
                    let value = match seed {
                        Some(Seed::Value(value)) => value,
                        Some(Seed::Nested(_)) => {
                            tracing::debug!(
                                message = "store.initial_state.ignored",
                                key,
                                reason = "nested seed for a plain field"
                            );
                            default.deep_clone()
                        }
                        None => default.deep_clone(),
                    };
                    fields.push((key.to_owned(), value));
                }
                StateField::Nested(factory) => {
                    let slice = match seed {
                        Some(Seed::Nested(slice)) => slice,
                        Some(Seed::Value(_)) => {
                            tracing::debug!(
                                message = "store.initial_state.ignored",
                                key,
                                reason = "plain seed for a nested factory"
                            );
                            InitialState::new()
                        }
                        None => InitialState::new(),
                    };
                    let child = factory.assemble(Rc::clone(&context), slice, own_cell.clone())?;
                    fields.push((key.to_owned(), Value::Object(child.observable().clone())));
                    children.insert(key.to_owned(), child);
                }
            }
        }
        for key in initial.keys() {
            tracing::debug!(
                message = "store.initial_state.ignored",
                key,
                reason = "undeclared field"
            );
        }

        fields.push((
            CONTEXT_KEY.to_owned(),
            Value::Opaque(Opaque::from_rc(Rc::clone(&context))),
        ));
        let base = Observable::from_fields(fields);
        let state = create_derived(&base, &config.base_derived)?;

        let child_count = children.len();
        let store = Store::from_inner(StoreInner {
            state,
            actions: config.base_actions.clone(),
            children,
            context,
            parent,
            registry: UnsubscribeRegistry::new(),
        });
        own_cell.fill(&store);

        for descriptor in &config.base_subscriptions {
            let subscription = descriptor.attach(&store);
            store.registry().push(subscription.into());
        }
        for hook in &config.on_create {
            if let Some(teardown) = hook(&store)? {
                store.registry().push(teardown);
            }
        }

        tracing::debug!(
            message = "store.create",
            fields = config.base_state.len(),
            children = child_count,
            actions = config.base_actions.len(),
            derived = config.base_derived.len(),
            subscriptions = config.base_subscriptions.len(),
            teardowns = store.registry().len(),
        );
        Ok(store)
    }
}
