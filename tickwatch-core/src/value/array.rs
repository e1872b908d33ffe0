//! Arrays.
//!
//! Storage and untracked reads live here. The mutation operations that
//! notify observers are implemented in `observer::array`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{Meta, Value};
use crate::observer::Observer;

pub(crate) struct ArrayData {
    items: RefCell<Vec<Value>>,
    meta: Meta,
}

/// A shared, reference-typed sequence.
#[derive(Clone)]
pub struct Array(Rc<ArrayData>);

impl Array {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            items: RefCell::new(items),
            meta: Meta::default(),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `Undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Position of the first element strictly equal to `value`.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.0.items.borrow().iter().position(|item| item.same(value))
    }

    /// Mark the array non-extensible: it is never observed and its mutation
    /// operations become no-ops.
    pub fn freeze(&self) {
        self.0.meta.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.0.meta.is_frozen()
    }

    pub fn mark_raw(&self) {
        self.0.meta.mark_raw();
    }

    pub fn is_raw(&self) -> bool {
        self.0.meta.is_raw()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.meta.observer()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn set_observer(&self, observer: Rc<Observer>) {
        self.0.meta.set_observer(observer);
    }

    pub(crate) fn with_items_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.0.items.borrow_mut())
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Value::Array(self.clone()))
    }
}
