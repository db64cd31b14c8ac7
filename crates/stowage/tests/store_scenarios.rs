//! End-to-end store scenarios: nesting, context, parents and lifecycle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use stowage::prelude::*;

fn int(s: &Observable, key: &str) -> i64 {
    s.get(key).and_then(|v| v.as_i64()).unwrap_or_default()
}

fn bump(key: &'static str, by: i64) -> impl Fn(&Store<()>, &[Value]) -> stowage::ActionResult {
    move |s, _| {
        let n: i64 = s.get_as(key)?;
        s.set(key, n + by)?;
        Ok(Value::Null)
    }
}

#[test]
fn counter_with_snapshot_subscription() {
    let recorded = Rc::new(Cell::new(-1));
    let sink = Rc::clone(&recorded);
    let store = Factory::new(State::new().value("count", 0))
        .action("inc", bump("count", 1))
        .subscribe_snapshot(
            move |snap, _, _| sink.set(snap.get("count").and_then(Value::as_i64).unwrap_or(-1)),
            SubscribeOptions::sync(),
        )
        .create(())
        .unwrap();

    store.call("inc", &[]).unwrap();
    store.call("inc", &[]).unwrap();

    assert_eq!(recorded.get(), 2);
    assert_eq!(store.get_as::<i64>("count").unwrap(), 2);
}

#[test]
fn sibling_reached_through_parent() {
    let foo = Factory::new(State::new().value("i", 0)).action("inc", bump("i", 1));
    let bar = Factory::new(State::new().value("x", 10)).action("dec", |s, _| {
        let parent = s
            .parent()
            .ok_or_else(|| StoreError::action("bar is not nested"))?;
        let foo = parent
            .child("foo")
            .ok_or_else(|| StoreError::unknown_field("foo"))?;
        let i: i64 = foo.get_as("i")?;
        let x: i64 = s.get_as("x")?;
        s.set("x", x - i)?;
        Ok(Value::Null)
    });
    let root = Factory::new(State::new().nested("foo", foo).nested("bar", bar))
        .create(())
        .unwrap();

    let foo = root.child("foo").unwrap();
    let bar = root.child("bar").unwrap();
    foo.call("inc", &[]).unwrap();
    foo.call("inc", &[]).unwrap();
    bar.call("dec", &[]).unwrap();

    assert_eq!(bar.get_as::<i64>("x").unwrap(), 8);
    assert_eq!(root.snapshot().at(&["bar", "x"]), Some(&Value::Int(8)));
}

struct AppContext {
    next_number: Box<dyn Fn() -> i64>,
}

fn app_model() -> Factory<AppContext> {
    let user = Factory::<AppContext>::new(State::new().value("user", Value::Null))
        .action("reset", |s, _| {
            s.set("user", Value::Null)?;
            Ok(Value::Null)
        })
        .action("set_user", |s, args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::action("set_user expects a name"))?;
            s.set("user", name)?;
            Ok(Value::Null)
        });

    let counter = Factory::<AppContext>::new(State::new().value("count", 0))
        .action("reset", |s, _| {
            s.set("count", 0)?;
            Ok(Value::Null)
        })
        .action("inc", |s, _| {
            let n: i64 = s.get_as("count")?;
            s.set("count", n + (s.context().next_number)())?;
            Ok(Value::Null)
        })
        .derive("current_count_message", |s: &Observable| {
            format!("The current count is {}!", int(s, "count"))
        });

    Factory::new(State::new().nested("user", user).nested("counter", counter)).action(
        "reset",
        |s, _| {
            for key in ["counter", "user"] {
                let child = s
                    .child(key)
                    .ok_or_else(|| StoreError::unknown_field(key))?;
                child.call("reset", &[])?;
            }
            Ok(Value::Null)
        },
    )
}

#[test]
fn composed_model_actions_and_root_reset() {
    let store = app_model()
        .create(AppContext {
            next_number: Box::new(|| 3),
        })
        .unwrap();
    let counter = store.child("counter").unwrap();
    let user = store.child("user").unwrap();

    counter.call("inc", &[]).unwrap();
    user.call("set_user", &[Value::from("ada")]).unwrap();
    assert_eq!(counter.get_as::<i64>("count").unwrap(), 3);
    assert_eq!(
        counter.get_as::<String>("current_count_message").unwrap(),
        "The current count is 3!"
    );
    assert_eq!(user.get_as::<String>("user").unwrap(), "ada");

    store.call("reset", &[]).unwrap();
    assert_eq!(counter.get_as::<i64>("count").unwrap(), 0);
    assert!(user.get("user").unwrap().is_null());
}

#[test]
fn nested_derived_values_appear_in_root_snapshot() {
    let store = app_model()
        .create(AppContext {
            next_number: Box::new(|| 1),
        })
        .unwrap();
    store.child("counter").unwrap().call("inc", &[]).unwrap();
    let snap = store.snapshot();
    assert_eq!(
        snap.at(&["counter", "current_count_message"]),
        Some(&Value::from("The current count is 1!"))
    );
}

#[test]
fn context_is_shared_by_reference() {
    let ctx = Rc::new(AppContext {
        next_number: Box::new(|| 1),
    });
    let store = app_model().create(Rc::clone(&ctx)).unwrap();
    let counter = store.child("counter").unwrap();

    assert!(Rc::ptr_eq(store.context(), &ctx));
    assert!(Rc::ptr_eq(counter.context(), &ctx));
    let stored = stowage::context_of::<AppContext>(counter.observable()).unwrap();
    assert!(Rc::ptr_eq(&stored, &ctx));
}

#[test]
fn parent_resolution() {
    let leaf = Factory::new(State::new().value("v", 0));
    let middle = Factory::new(State::new().nested("leaf", leaf));
    let root = Factory::new(State::new().nested("middle", middle))
        .create(())
        .unwrap();
    let middle = root.child("middle").unwrap();
    let leaf = middle.child("leaf").unwrap();

    assert!(root.parent().is_none());
    assert!(middle.parent().unwrap().ptr_eq(&root));
    assert!(leaf.parent().unwrap().ptr_eq(&middle));
}

#[test]
fn nested_initial_state_reaches_children() {
    let foo = Factory::new(State::new().value("i", 0).value("j", 1));
    let root = Factory::new(State::new().nested("foo", foo).value("top", 0))
        .create_with(
            (),
            InitialState::new()
                .set("top", 7)
                .nested("foo", InitialState::new().set("i", 5)),
        )
        .unwrap();
    let foo = root.child("foo").unwrap();
    assert_eq!(root.get_as::<i64>("top").unwrap(), 7);
    assert_eq!(foo.get_as::<i64>("i").unwrap(), 5);
    assert_eq!(foo.get_as::<i64>("j").unwrap(), 1);
}

#[test]
fn derived_seed_is_stripped() {
    let store = Factory::new(State::new().value("count", 2))
        .derive("doubled", |s: &Observable| int(s, "count") * 2)
        .create_with((), InitialState::new().set("doubled", 999))
        .unwrap();
    assert_eq!(store.get_as::<i64>("doubled").unwrap(), 4);
}

#[test]
fn later_actions_override_earlier_ones() {
    let store = Factory::new(State::new().value("count", 0))
        .action("a", bump("count", 1))
        .action("a", bump("count", 100))
        .create(())
        .unwrap();
    store.call("a", &[]).unwrap();
    assert_eq!(store.get_as::<i64>("count").unwrap(), 100);
}

#[test]
fn later_derived_override_earlier_ones() {
    let store = Factory::new(State::new().value("count", 3))
        .derive("d", |s: &Observable| int(s, "count"))
        .derive("d", |s: &Observable| int(s, "count") * 10)
        .create(())
        .unwrap();
    assert_eq!(store.get_as::<i64>("d").unwrap(), 30);
}

#[test]
fn instances_are_isolated() {
    let factory = Factory::new(State::new().nested(
        "inner",
        Factory::new(State::new().value("n", 0)).action("inc", bump("n", 1)),
    ));
    let a = factory.create(()).unwrap();
    let b = factory.create(()).unwrap();
    a.child("inner").unwrap().call("inc", &[]).unwrap();
    assert_eq!(a.snapshot().at(&["inner", "n"]), Some(&Value::Int(1)));
    assert_eq!(b.snapshot().at(&["inner", "n"]), Some(&Value::Int(0)));
}

#[test]
fn object_defaults_are_not_shared() {
    let notified = Rc::new(Cell::new(0));
    let sink = Rc::clone(&notified);
    let factory = Factory::new(State::new().value("meta", Observable::from_fields([("n", 0)])))
        .subscribe(move |_, _, _| sink.set(sink.get() + 1), SubscribeOptions::sync());
    let a = factory.create(()).unwrap();
    let b = factory.create(()).unwrap();

    let meta_of = |s: &Store<()>| s.get("meta").and_then(|v| v.as_object().cloned()).unwrap();
    assert!(!meta_of(&a).ptr_eq(&meta_of(&b)));

    meta_of(&a).set("n", 5).unwrap();
    assert_eq!(a.snapshot().at(&["meta", "n"]), Some(&Value::Int(5)));
    assert_eq!(b.snapshot().at(&["meta", "n"]), Some(&Value::Int(0)));
    assert_eq!(notified.get(), 1);

    let c = factory.create(()).unwrap();
    assert_eq!(c.snapshot().at(&["meta", "n"]), Some(&Value::Int(0)));
}

#[test]
fn root_subscription_sees_nested_mutations() {
    let paths = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&paths);
    let counter = Factory::new(State::new().value("count", 0)).action("inc", bump("count", 1));
    let root = Factory::new(State::new().nested("counter", counter))
        .subscribe(
            move |_, _, ops| {
                for op in ops {
                    sink.borrow_mut().push(op.path.join("."));
                }
            },
            SubscribeOptions::sync(),
        )
        .create(())
        .unwrap();
    root.child("counter").unwrap().call("inc", &[]).unwrap();
    assert_eq!(*paths.borrow(), vec!["counter.count".to_string()]);
}

#[test]
fn derived_values_are_current_inside_callbacks() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let store = Factory::new(State::new().value("count", 0))
        .derive("doubled", |s: &Observable| int(s, "count") * 2)
        .action("inc", bump("count", 1))
        .subscribe(
            move |s, _, _| {
                let pair = (
                    s.get_as::<i64>("count").unwrap_or(-1),
                    s.get_as::<i64>("doubled").unwrap_or(-1),
                );
                sink.borrow_mut().push(pair);
            },
            SubscribeOptions::sync(),
        )
        .create(())
        .unwrap();
    store.call("inc", &[]).unwrap();
    store.call("inc", &[]).unwrap();
    assert_eq!(*seen.borrow(), vec![(1, 2), (2, 4)]);
}

#[test]
fn parent_derived_values_are_current_inside_child_callbacks() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let child = Factory::new(State::new().value("i", 0)).subscribe(
        move |s, _, _| {
            let total = s
                .parent()
                .and_then(|p| p.get_as::<i64>("total").ok())
                .unwrap_or(-1);
            sink.borrow_mut().push(total);
        },
        SubscribeOptions::sync(),
    );
    let root = Factory::new(State::new().nested("child", child))
        .derive("total", |s: &Observable| {
            s.get("child")
                .and_then(|c| c.as_object().map(|c| int(c, "i")))
                .unwrap_or_default()
        })
        .create(())
        .unwrap();
    assert_eq!(root.get_as::<i64>("total").unwrap(), 0);

    let child = root.child("child").unwrap();
    child.set("i", 7).unwrap();
    child.set("i", 9).unwrap();
    assert_eq!(*seen.borrow(), vec![7, 9]);
}

#[test]
fn deferred_snapshot_subscription_batches_until_flush() {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    let store = Factory::new(State::new().value("count", 0))
        .action("inc", bump("count", 1))
        .subscribe_snapshot(
            move |snap, _, ops| {
                let count = snap.get("count").and_then(Value::as_i64).unwrap_or(-1);
                sink.borrow_mut().push((count, ops.len()));
            },
            SubscribeOptions::deferred(),
        )
        .create(())
        .unwrap();
    for _ in 0..3 {
        store.call("inc", &[]).unwrap();
    }
    assert!(batches.borrow().is_empty());
    flush();
    assert_eq!(*batches.borrow(), vec![(3, 3)]);
}

#[test]
fn unsubscribe_is_idempotent() {
    let calls = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let (c, d) = (Rc::clone(&calls), Rc::clone(&cleanups));
    let store = Factory::new(State::new().value("count", 0))
        .action("inc", bump("count", 1))
        .subscribe(move |_, _, _| c.set(c.get() + 1), SubscribeOptions::sync())
        .on_create(move |_| {
            let d = Rc::clone(&d);
            Some(Teardown::new(move || d.set(d.get() + 1)))
        })
        .create(())
        .unwrap();

    store.call("inc", &[]).unwrap();
    store.unsubscribe();
    store.unsubscribe();
    store.call("inc", &[]).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(cleanups.get(), 1);
    assert_eq!(store.get_as::<i64>("count").unwrap(), 2);
}

#[test]
fn unsubscribe_spares_caller_owned_subscriptions() {
    let calls = Rc::new(Cell::new(0));
    let sink = Rc::clone(&calls);
    let store = Factory::new(State::new().value("count", 0))
        .action("inc", bump("count", 1))
        .create(())
        .unwrap();
    let _manual = store.subscribe(move |_| sink.set(sink.get() + 1), SubscribeOptions::sync());
    store.unsubscribe();
    store.call("inc", &[]).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn on_create_key_subscription_is_torn_down() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let store = Factory::new(State::new().value("count", 0).value("other", 0))
        .action("inc", bump("count", 1))
        .on_create(move |s| {
            let sink = Rc::clone(&sink);
            let sub = subscribe_key(
                s.observable(),
                "count",
                move |v| sink.borrow_mut().push(v.as_i64().unwrap_or(-1)),
                SubscribeOptions::sync(),
            );
            Some(sub.into())
        })
        .create(())
        .unwrap();

    store.call("inc", &[]).unwrap();
    store.set("other", 1).unwrap();
    store.unsubscribe();
    store.call("inc", &[]).unwrap();
    assert_eq!(*seen.borrow(), vec![1]);
}

#[test]
fn dropping_the_tree_releases_children() {
    let root = Factory::new(State::new().nested("child", Factory::new(State::new().value("v", 0))))
        .create(())
        .unwrap();
    let child = root.child("child").unwrap().downgrade();
    drop(root);
    assert!(child.upgrade().is_none());
}

#[cfg(feature = "serde")]
#[test]
fn store_snapshot_serializes_with_derived_fields() {
    let child = Factory::new(State::new().value("i", 2))
        .derive("half", |s: &Observable| int(s, "i") / 2);
    let root = Factory::new(State::new().value("name", "root").nested("child", child))
        .create(())
        .unwrap();
    let json = serde_json::to_value(root.snapshot()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "name": "root",
            "child": { "i": 2, "$context": null, "half": 1 },
            "$context": null,
        })
    );
}
