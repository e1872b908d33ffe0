//! Array mutation operations.
//!
//! Arrays have no per-index accessors. Structural changes are only visible
//! to the dependency graph when they go through these methods: each one
//! performs the mutation, observes any inserted items, and notifies the
//! array's collection subject. Frozen arrays ignore every mutation.

use std::cmp::Ordering;

use tracing::trace;

use super::observe;
use crate::value::{Array, Value};

impl Array {
    /// One past the largest index [`Array::set`] accepts.
    pub const MAX_LENGTH: usize = u32::MAX as usize;

    /// Run `mutate` against the items. It returns its result plus the items
    /// it inserted. `None` when the array is frozen.
    fn mutate<R>(&self, mutate: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>)) -> Option<R> {
        if self.is_frozen() {
            trace!("mutation of frozen array ignored");
            return None;
        }

        let (result, inserted) = self.with_items_mut(mutate);

        if let Some(observer) = self.observer() {
            for item in &inserted {
                observe(item);
            }
            observer.dep().notify();
        }

        Some(result)
    }

    /// Append an item and return the new length.
    pub fn push(&self, item: Value) -> usize {
        self.mutate(|items| {
            items.push(item.clone());
            (items.len(), vec![item])
        })
        .unwrap_or_else(|| self.len())
    }

    /// Append several items with a single notification.
    pub fn extend(&self, new_items: Vec<Value>) -> usize {
        self.mutate(|items| {
            items.extend(new_items.iter().cloned());
            (items.len(), new_items)
        })
        .unwrap_or_else(|| self.len())
    }

    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items| (items.pop(), Vec::new())).flatten()
    }

    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items| {
            let first = if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            };
            (first, Vec::new())
        })
        .flatten()
    }

    /// Prepend items, keeping their order, and return the new length.
    pub fn unshift(&self, new_items: Vec<Value>) -> usize {
        self.mutate(|items| {
            let tail = std::mem::take(items);
            items.extend(new_items.iter().cloned());
            items.extend(tail);
            (items.len(), new_items)
        })
        .unwrap_or_else(|| self.len())
    }

    /// Remove `delete_count` items starting at `start`, insert `new_items`
    /// in their place, and return the removed items. Both bounds are
    /// clamped to the array.
    pub fn splice(&self, start: usize, delete_count: usize, new_items: Vec<Value>) -> Vec<Value> {
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            let removed: Vec<Value> = items
                .splice(start..end, new_items.iter().cloned())
                .collect();
            (removed, new_items)
        })
        .unwrap_or_default()
    }

    /// Sort in place. The comparator sees a snapshot, so it may read this
    /// array.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        self.mutate(|items| {
            *items = sorted;
            ((), Vec::new())
        });
    }

    pub fn reverse(&self) {
        self.mutate(|items| {
            items.reverse();
            ((), Vec::new())
        });
    }

    /// Replace the item at `index`, growing the array with `Undefined` when
    /// the index is past the end. Returns the previous item. Indices at or
    /// beyond [`Array::MAX_LENGTH`] are ignored.
    pub fn set(&self, index: usize, item: Value) -> Value {
        if index >= Self::MAX_LENGTH {
            trace!(index, "array index out of range");
            return Value::Undefined;
        }
        self.mutate(|items| {
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            let previous = std::mem::replace(&mut items[index], item.clone());
            (previous, vec![item])
        })
        .unwrap_or_default()
    }

    /// Remove the first item strictly equal to `item`.
    pub fn remove(&self, item: &Value) -> Option<Value> {
        let index = self.index_of(item)?;
        self.splice(index, 1, Vec::new()).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Listener, Subscriber};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    fn observed(json: serde_json::Value) -> (Array, Rc<Cell<u32>>, Rc<Listener>) {
        let value = Value::from(json);
        let observer = observe(&value).unwrap();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let listener = Listener::new(move |_| count_clone.set(count_clone.get() + 1));
        observer.dep().subscribe(
            listener.subscriber_id(),
            Rc::downgrade(&listener) as Weak<dyn Subscriber>,
        );
        (value.as_array().unwrap().clone(), count, listener)
    }

    #[test]
    fn mutations_notify_the_collection() {
        let (array, count, _listener) = observed(json!([3, 1, 2]));

        assert_eq!(array.push(Value::from(4)), 4);
        assert_eq!(array.pop(), Some(Value::from(4)));
        assert_eq!(array.shift(), Some(Value::from(3)));
        assert_eq!(array.unshift(vec![Value::from(0)]), 3);
        array.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or_default()
                .total_cmp(&b.as_f64().unwrap_or_default())
        });
        array.reverse();

        assert_eq!(array.to_json(), json!([2, 1, 0]));
        assert_eq!(count.get(), 6);
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let (array, count, _listener) = observed(json!([1, 2, 3, 4]));

        let removed = array.splice(1, 2, vec![Value::from("x")]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(array.to_json(), json!([1, "x", 4]));

        let removed = array.splice(10, 5, Vec::new());
        assert!(removed.is_empty());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn inserted_items_are_observed() {
        let (array, _count, _listener) = observed(json!([]));

        let item = Value::from(json!({ "a": 1 }));
        array.push(item.clone());
        assert!(item.observer().is_some());

        let later = Value::from(json!({ "b": 1 }));
        array.set(3, later.clone());
        assert!(later.observer().is_some());
        assert_eq!(array.len(), 4);
        assert!(array.get(2).is_undefined());
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let (array, count, _listener) = observed(json!([1]));

        assert!(array.set(usize::MAX, Value::from(2)).is_undefined());
        assert!(array.set(Array::MAX_LENGTH, Value::from(2)).is_undefined());
        assert_eq!(array.len(), 1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn sort_comparators_may_read_the_array() {
        let (array, count, _listener) = observed(json!([3, 1, 2]));

        let reader = array.clone();
        array.sort_by(|a, b| {
            assert_eq!(reader.len(), 3);
            a.as_f64()
                .unwrap_or_default()
                .total_cmp(&b.as_f64().unwrap_or_default())
        });

        assert_eq!(array.to_json(), json!([1, 2, 3]));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn remove_finds_by_identity() {
        let (array, _count, _listener) = observed(json!([1, 2, 3]));
        assert_eq!(array.remove(&Value::from(2)), Some(Value::from(2)));
        assert_eq!(array.remove(&Value::from(9)), None);
        assert_eq!(array.to_json(), json!([1, 3]));
    }

    #[test]
    fn frozen_arrays_ignore_mutation() {
        let array = Array::from_vec(vec![Value::from(1)]);
        array.freeze();

        assert_eq!(array.push(Value::from(2)), 1);
        assert_eq!(array.pop(), None);
        assert!(array.splice(0, 1, Vec::new()).is_empty());
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn unobserved_arrays_mutate_silently() {
        let array = Array::new();
        array.extend(vec![Value::from(1), Value::from(2)]);
        assert_eq!(array.len(), 2);
        assert!(array.observer().is_none());
    }
}
