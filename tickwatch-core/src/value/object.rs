//! Objects and property slots.
//!
//! An object is an insertion-ordered map of slots. Reading and writing go
//! through the slot, which is where reactivity is installed: converting a
//! property replaces its data slot with a reactive slot, and from then on
//! every `get` and `set` is intercepted.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{Meta, Value};
use crate::observer::{Observer, ReactiveProperty};

/// A user-defined property getter. Receives the object that owns the
/// property.
pub type Getter = Rc<dyn Fn(&Object) -> Value>;

/// A user-defined property setter.
pub type Setter = Rc<dyn Fn(&Object, Value)>;

#[derive(Clone)]
pub(crate) enum Slot {
    /// A plain stored value.
    Data { value: Value, configurable: bool },

    /// A property backed by user getter/setter closures.
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
        configurable: bool,
    },

    /// A property intercepted by the engine.
    Reactive(Rc<ReactiveProperty>),
}

impl Slot {
    pub(crate) fn is_configurable(&self) -> bool {
        match self {
            Slot::Data { configurable, .. } | Slot::Accessor { configurable, .. } => *configurable,
            Slot::Reactive(_) => true,
        }
    }
}

pub(crate) struct ObjectData {
    props: RefCell<IndexMap<String, Slot>>,
    meta: Meta,
    /// Object that receives keys added to or deleted from this one. Set on
    /// a scope's proxy object so new keys land in its data.
    delegate: RefCell<Option<Object>>,
}

/// A shared, reference-typed object.
#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
    pub fn new() -> Self {
        Self(Rc::new(ObjectData {
            props: RefCell::new(IndexMap::new()),
            meta: Meta::default(),
            delegate: RefCell::new(None),
        }))
    }

    /// Read a property. Reactive properties register the read with the
    /// computation currently being evaluated.
    pub fn get(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data { value, .. }) => value,
            Some(Slot::Accessor { get, .. }) => get.map(|get| get(self)).unwrap_or_default(),
            Some(Slot::Reactive(property)) => property.get(self),
        }
    }

    /// Read a property without registering a dependency.
    pub fn peek(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data { value, .. }) => value,
            Some(Slot::Accessor { get, .. }) => get.map(|get| get(self)).unwrap_or_default(),
            Some(Slot::Reactive(property)) => property.peek(self),
        }
    }

    /// Assign a property.
    ///
    /// Reactive properties notify their dependents. Assigning a key that does
    /// not exist yet creates a plain, non-reactive property; use
    /// [`observer::set`](crate::observer::set) to add a reactive one.
    /// Writes to plain properties of a frozen object are ignored.
    pub fn set(&self, key: &str, value: Value) {
        match self.slot(key) {
            Some(Slot::Reactive(property)) => property.set(self, value),
            Some(Slot::Accessor { set, .. }) => {
                if let Some(set) = set {
                    set(self, value);
                }
            }
            Some(Slot::Data { configurable, .. }) => {
                if !self.is_frozen() {
                    self.put_slot(key, Slot::Data { value, configurable });
                }
            }
            None => {
                if !self.is_frozen() {
                    self.put_slot(
                        key,
                        Slot::Data {
                            value,
                            configurable: true,
                        },
                    );
                }
            }
        }
    }

    /// Define a plain data property with an explicit `configurable` flag.
    /// Non-configurable properties are never converted to reactive ones.
    pub fn define_property(&self, key: &str, value: Value, configurable: bool) {
        self.put_slot(key, Slot::Data { value, configurable });
    }

    /// Define a property backed by getter/setter closures. If the object is
    /// later observed, the closures are wrapped by the reactive accessor
    /// rather than replaced.
    pub fn define_accessor(
        &self,
        key: &str,
        get: Option<Getter>,
        set: Option<Setter>,
        configurable: bool,
    ) {
        self.put_slot(
            key,
            Slot::Accessor {
                get,
                set,
                configurable,
            },
        );
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently intercepted by a reactive accessor.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.slot(key), Some(Slot::Reactive(_)))
    }

    /// Make the object non-extensible: it is never observed, no keys can be
    /// added, plain properties become read-only and every slot becomes
    /// non-configurable.
    pub fn freeze(&self) {
        self.0.meta.freeze();
        for slot in self.0.props.borrow_mut().values_mut() {
            match slot {
                Slot::Data { configurable, .. } | Slot::Accessor { configurable, .. } => {
                    *configurable = false
                }
                Slot::Reactive(_) => {}
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.0.meta.is_frozen()
    }

    /// Opt this object out of conversion.
    pub fn mark_raw(&self) {
        self.0.meta.mark_raw();
    }

    pub fn is_raw(&self) -> bool {
        self.0.meta.is_raw()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.meta.observer()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn set_observer(&self, observer: Rc<Observer>) {
        self.0.meta.set_observer(observer);
    }

    pub(crate) fn delegate(&self) -> Option<Object> {
        self.0.delegate.borrow().clone()
    }

    pub(crate) fn set_delegate(&self, delegate: Option<Object>) {
        *self.0.delegate.borrow_mut() = delegate;
    }

    /// Clone a slot out of the map so no borrow is held while the slot's
    /// closures run.
    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow().get(key).cloned()
    }

    pub(crate) fn put_slot(&self, key: &str, slot: Slot) {
        self.0.props.borrow_mut().insert(key.to_string(), slot);
    }

    pub(crate) fn remove_slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow_mut().shift_remove(key)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Value::Object(self.clone()))
    }
}
