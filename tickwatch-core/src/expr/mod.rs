//! Expressions
//!
//! What a watcher evaluates. An [`Expression`] is either a path string such
//! as `user.tags[0]`, compiled into a tracked getter and an assignable
//! setter, or a pair of closures supplied by the caller.
//!
//! Compiled paths are cached per thread in a least-recently-used map, so
//! many watchers on the same path share one parse.

mod path;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

use path::Parsed;

/// Computes a value from the evaluation context.
pub type Evaluator = Rc<dyn Fn(&Value) -> Result<Value>>;

/// Writes a value through the evaluation context.
pub type Assigner = Rc<dyn Fn(&Value, Value) -> Result<()>>;

const CACHE_CAPACITY: usize = 1000;

thread_local! {
    static CACHE: RefCell<IndexMap<String, Rc<Parsed>>> = RefCell::new(IndexMap::new());
}

/// Something a watcher can evaluate.
#[derive(Clone)]
pub enum Expression {
    /// A property path evaluated against the context.
    Path(String),
    /// Caller-supplied getter and optional setter.
    Function {
        get: Evaluator,
        set: Option<Assigner>,
    },
}

impl Expression {
    /// A read-only expression backed by a closure.
    pub fn function(get: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        Expression::Function {
            get: Rc::new(get),
            set: None,
        }
    }

    /// A two-way expression backed by closures.
    pub fn accessor(
        get: impl Fn(&Value) -> Result<Value> + 'static,
        set: impl Fn(&Value, Value) -> Result<()> + 'static,
    ) -> Self {
        Expression::Function {
            get: Rc::new(get),
            set: Some(Rc::new(set)),
        }
    }

    /// Source text for diagnostics.
    pub fn source(&self) -> &str {
        match self {
            Expression::Path(path) => path,
            Expression::Function { .. } => "<function>",
        }
    }

    /// Parse (or fetch from cache) and build the getter and setter.
    pub fn compile(&self) -> Result<Compiled> {
        match self {
            Expression::Function { get, set } => Ok(Compiled {
                source: self.source().to_string(),
                get: get.clone(),
                set: set.clone(),
            }),
            Expression::Path(source) => {
                let parsed = parse_cached(source)?;

                let getter = parsed.clone();
                let get: Evaluator = Rc::new(move |context: &Value| path::get(&getter, context));

                let set: Option<Assigner> = if matches!(*parsed, Parsed::Path(_)) {
                    let text = source.clone();
                    Some(Rc::new(move |context: &Value, value: Value| {
                        path::set(&text, &parsed, context, value)
                    }))
                } else {
                    None
                };

                Ok(Compiled {
                    source: source.clone(),
                    get,
                    set,
                })
            }
        }
    }
}

impl From<&str> for Expression {
    fn from(path: &str) -> Self {
        Expression::Path(path.to_string())
    }
}

impl From<String> for Expression {
    fn from(path: String) -> Self {
        Expression::Path(path)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Expression::Function { set, .. } => f
                .debug_struct("Function")
                .field("assignable", &set.is_some())
                .finish(),
        }
    }
}

/// A ready-to-run expression.
#[derive(Clone)]
pub struct Compiled {
    source: String,
    get: Evaluator,
    set: Option<Assigner>,
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiled")
            .field("source", &self.source)
            .field("assignable", &self.set.is_some())
            .finish()
    }
}

impl Compiled {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn get(&self, context: &Value) -> Result<Value> {
        (self.get)(context)
    }

    pub fn is_assignable(&self) -> bool {
        self.set.is_some()
    }

    pub fn set(&self, context: &Value, value: Value) -> Result<()> {
        match &self.set {
            Some(set) => set(context, value),
            None => Err(Error::NotAssignable(self.source.clone())),
        }
    }

    pub(crate) fn into_parts(self) -> (Evaluator, Option<Assigner>) {
        (self.get, self.set)
    }
}

fn parse_cached(source: &str) -> Result<Rc<Parsed>> {
    let hit = CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let index = cache.get_index_of(source)?;
        let last = cache.len() - 1;
        cache.move_index(index, last);
        cache.get(source).cloned()
    });
    if let Some(parsed) = hit {
        return Ok(parsed);
    }

    let parsed = Rc::new(path::parse(source)?);
    CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.len() >= CACHE_CAPACITY {
            cache.shift_remove_index(0);
        }
        cache.insert(source.to_string(), parsed.clone());
    });
    Ok(parsed)
}

/// Read `path` from `context` with tracked reads.
pub fn get_path(context: &Value, path: &str) -> Result<Value> {
    Expression::from(path).compile()?.get(context)
}

/// Write `value` at `path`, creating missing intermediate objects.
pub fn set_path(context: &Value, path: &str, value: Value) -> Result<()> {
    Expression::from(path).compile()?.set(context, value)
}

#[cfg(test)]
fn cached_paths() -> Vec<String> {
    CACHE.with(|cache| cache.borrow().keys().cloned().collect())
}
