//! Scopes
//!
//! A scope is the context watchers evaluate against. It owns a root data
//! object and exposes each of its keys on a separate proxy object, so an
//! expression like `count` reads `data.count` through the proxy.
//!
//! # Lifecycle
//!
//! - `Scope::new` proxies every data key (except reserved keys starting
//!   with `$` or `_`) and observes the data with the scope as its owner.
//!   Keys later added with [`Scope::set`] or [`observer::set`] are proxied
//!   automatically and trigger a digest.
//! - [`Scope::set_data`] swaps the root data object and digests.
//! - [`Scope::destroy`] (or dropping the last handle) tears down every
//!   watcher created through the scope.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::config;
use crate::error::{Error, Result};
use crate::expr::{self, Assigner, Evaluator, Expression};
use crate::observer::{self, Owner};
use crate::reactive::{Callback, Watcher, WatcherOptions};
use crate::value::{Getter, Object, Setter, Value};

/// Keys starting with `$` or `_` are never proxied.
fn is_reserved(key: &str) -> bool {
    key.starts_with('$') || key.starts_with('_')
}

/// Options for [`Scope::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Track the entire value subtree.
    pub deep: bool,
    /// Run the callback synchronously instead of on the next tick.
    pub sync: bool,
    /// Invoke the callback once right away with `(value, undefined)`.
    pub immediate: bool,
}

/// A computed property definition.
#[derive(Clone)]
pub struct Computed {
    get: Evaluator,
    set: Option<Assigner>,
    cache: bool,
}

impl Computed {
    /// A cached computed property. The getter receives the scope's proxy
    /// object.
    pub fn new(get: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        Self {
            get: Rc::new(get),
            set: None,
            cache: true,
        }
    }

    pub fn with_setter(mut self, set: impl Fn(&Value, Value) -> Result<()> + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// Call the getter on every read instead of caching through a lazy
    /// watcher.
    pub fn uncached(mut self) -> Self {
        self.cache = false;
        self
    }
}

struct ScopeInner {
    this: Object,
    data: RefCell<Object>,
    watchers: RefCell<Vec<Watcher>>,
    destroyed: Cell<bool>,
    self_weak: Weak<ScopeInner>,
}

/// An evaluation context owning root data and the watchers created on it.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    pub fn new(data: Object) -> Self {
        let this = Object::new();
        this.mark_raw();
        this.set_delegate(Some(data.clone()));

        let inner = Rc::new_cyclic(|self_weak| ScopeInner {
            this,
            data: RefCell::new(data.clone()),
            watchers: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            self_weak: self_weak.clone(),
        });

        for key in data.keys() {
            inner.proxy_key(&key);
        }
        observer::observe_with_owner(&Value::Object(data), inner.owner());

        Self(inner)
    }

    /// Build a scope from a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Object(data) => Ok(Self::new(data)),
            other => Err(Error::NotAnObject {
                key: "data".to_string(),
                found: other.type_name(),
            }),
        }
    }

    /// The proxy object expressions are evaluated against.
    pub fn this(&self) -> Object {
        self.0.this.clone()
    }

    /// The root data object.
    pub fn data(&self) -> Object {
        self.0.data.borrow().clone()
    }

    /// Tracked read of a proxied key.
    pub fn get(&self, key: &str) -> Value {
        self.0.this.get(key)
    }

    /// Write a key. Unknown keys are added to the data reactively.
    pub fn set(&self, key: &str, value: Value) {
        observer::set(&self.0.this, key, value);
    }

    /// Remove a key from the data.
    pub fn delete(&self, key: &str) {
        observer::delete(&self.0.this, key);
    }

    /// Evaluate a path against the scope.
    pub fn eval(&self, path: &str) -> Result<Value> {
        expr::get_path(&self.context(), path)
    }

    fn context(&self) -> Value {
        Value::Object(self.0.this.clone())
    }

    /// Create a watcher bound to this scope.
    pub fn create_computation(
        &self,
        expression: impl Into<Expression>,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Watcher> {
        let watcher = Watcher::new(self.context(), expression, callback, options)?;
        self.0.watchers.borrow_mut().push(watcher.clone());
        Ok(watcher)
    }

    /// Watch an expression from user code. The callback runs on the user
    /// lane, after internal watchers have settled.
    pub fn watch(
        &self,
        expression: impl Into<Expression>,
        callback: Callback,
        options: WatchOptions,
    ) -> Result<Watcher> {
        let mut watcher_options = if options.sync {
            WatcherOptions::default().sync()
        } else {
            WatcherOptions::default().user()
        };
        if options.deep {
            watcher_options = watcher_options.deep();
        }

        let watcher =
            self.create_computation(expression, Some(callback.clone()), watcher_options)?;
        if options.immediate {
            callback(&watcher.value(), &Value::Undefined);
        }
        Ok(watcher)
    }

    /// Tear down `watcher` and forget it.
    pub fn unwatch(&self, watcher: &Watcher) {
        watcher.teardown();
        self.0
            .watchers
            .borrow_mut()
            .retain(|existing| existing.id() != watcher.id());
    }

    /// Define a computed property on the proxy object.
    pub fn define_computed(&self, key: &str, computed: Computed) -> Result<()> {
        let getter: Getter = if computed.cache {
            let watcher = self.create_computation(
                Expression::Function {
                    get: computed.get,
                    set: None,
                },
                None,
                WatcherOptions::default().lazy(),
            )?;
            Rc::new(move |_: &Object| watcher.evaluate_now())
        } else {
            let get = computed.get;
            let key = key.to_string();
            Rc::new(move |this: &Object| {
                get(&Value::Object(this.clone())).unwrap_or_else(|err| {
                    report(&key, &err);
                    Value::Undefined
                })
            })
        };

        let setter: Option<Setter> = computed.set.map(|set| {
            let key = key.to_string();
            Rc::new(move |this: &Object, value| {
                if let Err(err) = set(&Value::Object(this.clone()), value) {
                    report(&key, &err);
                }
            }) as Setter
        });

        self.0.this.define_accessor(key, Some(getter), setter, true);
        Ok(())
    }

    /// Replace the root data object.
    ///
    /// Keys missing from the new data are unproxied, new keys are proxied,
    /// the scope moves its ownership to the new data and digests.
    pub fn set_data(&self, data: Object) {
        let old = self.data();
        if old.ptr_eq(&data) {
            return;
        }

        for key in old.keys() {
            if !data.contains_key(&key) {
                self.0.unproxy_key(&key);
            }
        }
        *self.0.data.borrow_mut() = data.clone();
        self.0.this.set_delegate(Some(data.clone()));
        for key in data.keys() {
            if !self.0.this.contains_key(&key) {
                self.0.proxy_key(&key);
            }
        }

        if let Some(observer) = old.observer() {
            observer.remove_owner(&self.0.owner());
        }
        observer::observe_with_owner(&Value::Object(data), self.0.owner());
        self.0.digest();
    }

    /// Shallow-invalidate every active watcher.
    pub fn digest(&self) {
        self.0.digest();
    }

    /// Tear down every watcher and detach from the data.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        debug!(watchers = self.watcher_count(), "destroying scope");

        self.0.teardown_watchers();
        if let Some(observer) = self.data().observer() {
            observer.remove_owner(&self.0.owner());
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().len()
    }
}

impl ScopeInner {
    fn owner(&self) -> Weak<dyn Owner> {
        self.self_weak.clone()
    }

    fn teardown_watchers(&self) {
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
    }
}

impl Owner for ScopeInner {
    fn proxy_key(&self, key: &str) {
        if is_reserved(key) {
            return;
        }

        let scope = self.self_weak.clone();
        let read_key = key.to_string();
        let get: Getter = Rc::new(move |_: &Object| match scope.upgrade() {
            Some(scope) => {
                let data = scope.data.borrow().clone();
                data.get(&read_key)
            }
            None => Value::Undefined,
        });

        let scope = self.self_weak.clone();
        let write_key = key.to_string();
        let set: Setter = Rc::new(move |_: &Object, value| {
            if let Some(scope) = scope.upgrade() {
                let data = scope.data.borrow().clone();
                data.set(&write_key, value);
            }
        });

        self.this.define_accessor(key, Some(get), Some(set), true);
    }

    fn unproxy_key(&self, key: &str) {
        if !is_reserved(key) {
            self.this.remove_slot(key);
        }
    }

    fn digest(&self) {
        let watchers = self.watchers.borrow().clone();
        for watcher in watchers.iter().rev() {
            if watcher.is_active() {
                watcher.update(true);
            }
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.teardown_watchers();
    }
}

fn report(key: &str, err: &Error) {
    if config::current().warn_expression_errors {
        warn!(key, error = %err, "error in computed property");
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.data())
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
