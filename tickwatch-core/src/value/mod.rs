//! Dynamic Values
//!
//! The engine observes a dynamic, reference-typed value graph. Objects and
//! arrays are shared handles: cloning a `Value::Object` aliases the same
//! storage, exactly like a reference in a scripting language. This is what
//! lets a write through one handle invalidate a computation that read
//! through another.
//!
//! # Equality
//!
//! `Value` equality is *strict equality*: primitives compare by value,
//! strings by content, objects and arrays by identity. A reactive property
//! uses this to decide whether a write is a no-op, and a watcher uses it to
//! decide whether its callback must fire.

mod array;
mod json;
mod object;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::observer::Observer;

pub use array::Array;
pub use object::{Getter, Object, Setter};
pub(crate) use object::Slot;

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// A fresh, empty object.
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    /// A fresh array holding `items`.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }

    /// Strict equality.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// True for objects and arrays.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The observer attached to this value, if it is an observed object or
    /// array.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(object) => object.observer(),
            Value::Array(array) => array.observer(),
            _ => None,
        }
    }

    /// Stable address of the shared storage, for identity sets.
    pub(crate) fn addr(&self) -> Option<usize> {
        match self {
            Value::Object(object) => Some(object.addr()),
            Value::Array(array) => Some(array.addr()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(_) | Value::Array(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

/// Bookkeeping shared by objects and arrays: the observer marker and the
/// conversion flags.
#[derive(Default)]
pub(crate) struct Meta {
    observer: RefCell<Option<Rc<Observer>>>,
    frozen: Cell<bool>,
    raw: Cell<bool>,
}

impl Meta {
    pub(crate) fn observer(&self) -> Option<Rc<Observer>> {
        self.observer.borrow().clone()
    }

    pub(crate) fn set_observer(&self, observer: Rc<Observer>) {
        *self.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
    }

    pub(crate) fn is_raw(&self) -> bool {
        self.raw.get()
    }

    pub(crate) fn mark_raw(&self) {
        self.raw.set(true);
    }
}
