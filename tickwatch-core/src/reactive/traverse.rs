//! Deep traversal for `deep` watchers.
//!
//! Touches every reachable property with tracked reads so each one becomes
//! a dependency. Shared substructures and cycles are visited once; frozen
//! values are not descended into.

use std::collections::HashSet;

use crate::value::Value;

pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(object) => {
            if object.is_frozen() || !seen.insert(object.addr()) {
                return;
            }
            for key in object.keys() {
                walk(&object.get(&key), seen);
            }
        }
        Value::Array(array) => {
            if array.is_frozen() || !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
