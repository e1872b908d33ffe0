//! Conversions between `Value` and `serde_json::Value`.

use std::collections::HashSet;

use super::{Array, Object, Value};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.set(&key, Value::from(value));
                }
                Value::Object(object)
            }
        }
    }
}

impl Value {
    /// Snapshot the value as JSON without registering dependencies.
    ///
    /// `Undefined` and non-finite numbers become `null`; a cycle back to an
    /// object already being serialized also becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut visiting = HashSet::new();
        to_json(self, &mut visiting)
    }
}

impl Object {
    pub fn to_json(&self) -> serde_json::Value {
        Value::Object(self.clone()).to_json()
    }
}

impl Array {
    pub fn to_json(&self) -> serde_json::Value {
        Value::Array(self.clone()).to_json()
    }
}

fn to_json(value: &Value, visiting: &mut HashSet<usize>) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Object(object) => {
            if !visiting.insert(object.addr()) {
                return serde_json::Value::Null;
            }
            let map = object
                .keys()
                .into_iter()
                .map(|key| {
                    let item = to_json(&object.peek(&key), visiting);
                    (key, item)
                })
                .collect();
            visiting.remove(&object.addr());
            serde_json::Value::Object(map)
        }
        Value::Array(array) => {
            if !visiting.insert(array.addr()) {
                return serde_json::Value::Null;
            }
            let items = array
                .to_vec()
                .iter()
                .map(|item| to_json(item, visiting))
                .collect();
            visiting.remove(&array.addr());
            serde_json::Value::Array(items)
        }
    }
}

fn number(n: f64) -> serde_json::Value {
    // Integral values round-trip as integers so snapshots read naturally.
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
