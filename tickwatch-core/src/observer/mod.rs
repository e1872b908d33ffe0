//! Observation
//!
//! Observing a value converts it, recursively, into reactive state: every
//! property of every reachable object is replaced by a reactive accessor,
//! and every reachable object and array is given an [`Observer`] whose
//! collection-level subject fires on structural change (keys added or
//! removed, array mutation).
//!
//! # Owners
//!
//! An observed root data object can have *owners*: scopes that proxy its
//! keys onto themselves. When a key is added or removed through [`set`] or
//! [`delete`], every owner is told to proxy or unproxy the key and to digest
//! its watchers.
//!
//! # Conversion opt-outs
//!
//! Frozen values and values marked raw are never observed.
//! [`without_conversion`] disables observation for the duration of a
//! closure, so a value can be assigned onto a reactive property without
//! converting its subtree.

mod array;
mod dep;
mod property;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::value::{Object, Value};

pub use dep::{Dep, DepId};
pub use property::{define_reactive, ReactiveProperty};

/// A context that proxies the keys of an observed data object.
pub trait Owner {
    /// Expose `key` of the owned data on the owner.
    fn proxy_key(&self, key: &str);

    /// Remove a previously proxied key.
    fn unproxy_key(&self, key: &str);

    /// Re-check every watcher of the owner.
    fn digest(&self);
}

/// Marker attached to an observed object or array.
pub struct Observer {
    dep: Dep,
    owners: RefCell<Vec<Weak<dyn Owner>>>,
}

impl Observer {
    fn new() -> Self {
        Self {
            dep: Dep::new(),
            owners: RefCell::new(Vec::new()),
        }
    }

    /// The collection-level subject.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn add_owner(&self, owner: Weak<dyn Owner>) {
        let mut owners = self.owners.borrow_mut();
        if !owners.iter().any(|existing| Weak::ptr_eq(existing, &owner)) {
            owners.push(owner);
        }
    }

    pub fn remove_owner(&self, owner: &Weak<dyn Owner>) {
        self.owners
            .borrow_mut()
            .retain(|existing| !Weak::ptr_eq(existing, owner));
    }

    /// Live owners.
    pub fn owners(&self) -> Vec<Rc<dyn Owner>> {
        self.owners.borrow().iter().filter_map(Weak::upgrade).collect()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("owners", &self.owners.borrow().len())
            .finish()
    }
}

thread_local! {
    static SHOULD_CONVERT: Cell<bool> = const { Cell::new(true) };
}

/// Run `f` with observation disabled.
pub fn without_conversion<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            SHOULD_CONVERT.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(SHOULD_CONVERT.with(|flag| flag.replace(false)));
    f()
}

fn should_convert() -> bool {
    SHOULD_CONVERT.with(Cell::get)
}

/// Make `value` reactive and return its observer.
///
/// Idempotent: an already-observed value returns its existing observer.
/// Returns `None` for primitives, for frozen or raw values, and while
/// conversion is disabled.
pub fn observe(value: &Value) -> Option<Rc<Observer>> {
    match value {
        Value::Object(object) => {
            if let Some(observer) = object.observer() {
                return Some(observer);
            }
            if !should_convert() || object.is_frozen() || object.is_raw() {
                trace!("object not converted");
                return None;
            }

            // Mark before walking so cycles terminate.
            let observer = Rc::new(Observer::new());
            object.set_observer(observer.clone());
            for key in object.keys() {
                let current = object.peek(&key);
                define_reactive(object, &key, current);
            }
            Some(observer)
        }
        Value::Array(array) => {
            if let Some(observer) = array.observer() {
                return Some(observer);
            }
            if !should_convert() || array.is_frozen() || array.is_raw() {
                trace!("array not converted");
                return None;
            }

            let observer = Rc::new(Observer::new());
            array.set_observer(observer.clone());
            for item in array.to_vec() {
                observe(&item);
            }
            Some(observer)
        }
        _ => None,
    }
}

/// Observe `value` and register `owner` with its observer.
pub fn observe_with_owner(value: &Value, owner: Weak<dyn Owner>) -> Option<Rc<Observer>> {
    let observer = observe(value)?;
    observer.add_owner(owner);
    Some(observer)
}

/// Set a property, adding it reactively when it does not exist yet.
///
/// Existing keys are assigned through their slot. On an observed object a
/// new key is converted, the collection subject is notified, and every
/// owner proxies the key and digests.
pub fn set(object: &Object, key: &str, value: Value) {
    if object.contains_key(key) {
        object.set(key, value);
        return;
    }

    if let Some(target) = object.delegate() {
        set(&target, key, value);
        return;
    }

    let Some(observer) = object.observer() else {
        object.set(key, value);
        return;
    };
    if object.is_frozen() {
        return;
    }

    define_reactive(object, key, value);
    observer.dep().notify();

    for owner in observer.owners() {
        owner.proxy_key(key);
        owner.digest();
    }
}

/// Delete a property, notifying dependents of the structural change.
pub fn delete(object: &Object, key: &str) {
    if let Some(target) = object.delegate() {
        delete(&target, key);
        return;
    }
    if object.is_frozen() || object.remove_slot(key).is_none() {
        return;
    }

    let Some(observer) = object.observer() else {
        return;
    };
    observer.dep().notify();

    for owner in observer.owners() {
        owner.unproxy_key(key);
        owner.digest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Listener, ReactiveContext, Subscriber, SubscriberId};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingOwner {
        events: RefCell<Vec<String>>,
    }

    impl Owner for RecordingOwner {
        fn proxy_key(&self, key: &str) {
            self.events.borrow_mut().push(format!("proxy {key}"));
        }

        fn unproxy_key(&self, key: &str) {
            self.events.borrow_mut().push(format!("unproxy {key}"));
        }

        fn digest(&self) {
            self.events.borrow_mut().push("digest".to_string());
        }
    }

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from(json!({ "a": { "b": 1 } }));
        let first = observe(&value).unwrap();
        let second = observe(&value).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        let object = value.as_object().unwrap();
        assert!(object.is_reactive("a"));
        assert!(object.peek("a").as_object().unwrap().is_reactive("b"));
    }

    #[test]
    fn primitives_frozen_and_raw_values_are_skipped() {
        assert!(observe(&Value::from(1)).is_none());

        let frozen = Value::from(json!({ "a": 1 }));
        frozen.as_object().unwrap().freeze();
        assert!(observe(&frozen).is_none());

        let raw = Value::from(json!([1, 2]));
        raw.as_array().unwrap().mark_raw();
        assert!(observe(&raw).is_none());
    }

    #[test]
    fn cyclic_graphs_terminate() {
        let object = Object::new();
        object.set("me", Value::Object(object.clone()));
        assert!(observe(&Value::Object(object.clone())).is_some());
        assert!(object.is_reactive("me"));
    }

    #[test]
    fn without_conversion_keeps_assigned_values_plain() {
        let root = Value::from(json!({ "slot": null }));
        observe(&root);
        let object = root.as_object().unwrap();

        let payload = Value::from(json!({ "big": [1, 2, 3] }));
        without_conversion(|| object.set("slot", payload.clone()));

        assert!(payload.observer().is_none());
        assert!(should_convert());
    }

    #[test]
    fn set_adds_reactive_keys_and_notifies_owners() {
        let root = Value::object();
        let owner = Rc::new(RecordingOwner::default());
        let weak: Weak<dyn Owner> = Rc::downgrade(&owner) as Weak<dyn Owner>;
        let observer = observe_with_owner(&root, weak).unwrap();

        let notified = Rc::new(Cell::new(0));
        let notified_clone = notified.clone();
        let listener = Listener::new(move |_| notified_clone.set(notified_clone.get() + 1));
        observer.dep().subscribe(
            listener.subscriber_id(),
            Rc::downgrade(&listener) as Weak<dyn Subscriber>,
        );

        let object = root.as_object().unwrap();
        set(object, "fresh", Value::from(1));

        assert!(object.is_reactive("fresh"));
        assert_eq!(notified.get(), 1);
        assert_eq!(*owner.events.borrow(), vec!["proxy fresh", "digest"]);

        // Existing keys are plain assignments.
        set(object, "fresh", Value::from(2));
        assert_eq!(notified.get(), 1);

        delete(object, "fresh");
        assert!(!object.contains_key("fresh"));
        assert_eq!(notified.get(), 2);
        assert_eq!(
            *owner.events.borrow(),
            vec!["proxy fresh", "digest", "unproxy fresh", "digest"]
        );
    }

    #[test]
    fn set_on_unobserved_object_is_plain() {
        let object = Object::new();
        set(&object, "a", Value::from(1));
        assert!(!object.is_reactive("a"));

        delete(&object, "missing");
        delete(&object, "a");
        assert!(object.is_empty());
    }

    #[test]
    fn reading_a_new_key_tracks_the_collection() {
        let root = Value::from(json!({ "a": 1 }));
        observe(&root);
        let object = root.as_object().unwrap();

        let holder = Object::new();
        define_reactive(&holder, "root", root.clone());

        let context = ReactiveContext::enter(SubscriberId::new());
        holder.get("root");
        let deps = context.finish();
        assert!(deps.iter().any(|dep| dep.id() == object.observer().unwrap().dep().id()));
    }
}
