//! Reactive Property Accessor
//!
//! The per-property interception point. Reads register the evaluating
//! watcher with the property's subject; writes that change the value
//! re-observe it and notify.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::{observe, Dep, Observer};
use crate::reactive::ReactiveContext;
use crate::value::{Getter, Object, Setter, Slot, Value};

struct PropertyState {
    value: Value,
    child: Option<Rc<Observer>>,
}

/// One intercepted property: its value (or wrapped accessor) and its subject.
pub struct ReactiveProperty {
    dep: Dep,
    getter: Option<Getter>,
    setter: Option<Setter>,
    state: RefCell<PropertyState>,
}

impl ReactiveProperty {
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub(crate) fn get(&self, owner: &Object) -> Value {
        let value = self.peek(owner);

        if ReactiveContext::is_active() {
            self.dep.depend();

            let child = self.state.borrow().child.clone();
            if let Some(child) = child {
                child.dep().depend();
            }

            if let Value::Array(array) = &value {
                for item in array.to_vec() {
                    if let Some(observer) = item.observer() {
                        observer.dep().depend();
                    }
                }
            }
        }

        value
    }

    pub(crate) fn peek(&self, owner: &Object) -> Value {
        match &self.getter {
            Some(getter) => getter(owner),
            None => self.state.borrow().value.clone(),
        }
    }

    pub(crate) fn set(&self, owner: &Object, value: Value) {
        if value.same(&self.peek(owner)) {
            return;
        }

        match &self.setter {
            Some(setter) => setter(owner, value.clone()),
            None => self.state.borrow_mut().value = value.clone(),
        }

        let child = observe(&value);
        self.state.borrow_mut().child = child;
        self.dep.notify();
    }
}

/// Install a reactive accessor for `key` on `target`, holding `value`.
///
/// Existing accessor slots are wrapped: the reactive accessor calls through
/// to the original getter and setter. Non-configurable properties and
/// frozen objects are left untouched.
pub fn define_reactive(target: &Object, key: &str, value: Value) {
    if target.is_frozen() {
        trace!(key, "skipping reactive conversion of frozen object");
        return;
    }

    let existing = target.slot(key);
    if existing.as_ref().is_some_and(|slot| !slot.is_configurable()) {
        trace!(key, "skipping reactive conversion of non-configurable property");
        return;
    }

    let (getter, setter): (Option<Getter>, Option<Setter>) = match existing {
        Some(Slot::Accessor { get, set, .. }) => (get, set),
        Some(Slot::Reactive(previous)) => {
            let read = previous.clone();
            let write = previous;
            (
                Some(Rc::new(move |owner: &Object| read.get(owner))),
                Some(Rc::new(move |owner: &Object, value| write.set(owner, value))),
            )
        }
        Some(Slot::Data { .. }) | None => (None, None),
    };

    let child = observe(&value);
    let property = ReactiveProperty {
        dep: Dep::new(),
        getter,
        setter,
        state: RefCell::new(PropertyState { value, child }),
    };

    target.put_slot(key, Slot::Reactive(Rc::new(property)));
}
