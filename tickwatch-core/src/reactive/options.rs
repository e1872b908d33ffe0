//! Watcher construction options.

use std::fmt;
use std::rc::Rc;

use crate::scheduler::Lane;
use crate::value::Value;

/// A value transform applied after evaluation.
pub type Transform = Rc<dyn Fn(Value) -> Value>;

/// A watcher callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value)>;

/// Wrap a closure as a [`Callback`].
pub fn callback(f: impl Fn(&Value, &Value) + 'static) -> Callback {
    Rc::new(f)
}

/// How a watcher reacts to invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Mark dirty; recompute only when the value is demanded.
    Lazy,
    /// Recompute immediately, bypassing the batcher.
    Sync,
    /// Queue on the given batcher lane.
    Queued(Lane),
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Queued(Lane::Primary)
    }
}

/// A two-way value transform. `read` shapes the evaluated value; `write`
/// shapes a value assigned through the watcher and receives the current
/// value as its second argument.
#[derive(Clone, Default)]
pub struct Filter {
    pub read: Option<Transform>,
    pub write: Option<Rc<dyn Fn(Value, &Value) -> Value>>,
}

impl Filter {
    pub fn read(f: impl Fn(Value) -> Value + 'static) -> Self {
        Self {
            read: Some(Rc::new(f)),
            write: None,
        }
    }

    pub fn with_write(mut self, f: impl Fn(Value, &Value) -> Value + 'static) -> Self {
        self.write = Some(Rc::new(f));
        self
    }
}

/// Options for [`Watcher::new`](super::Watcher::new).
///
/// Built fluently; when trigger methods conflict the last call wins.
///
/// ```ignore
/// let options = WatcherOptions::default().user().deep();
/// ```
#[derive(Clone, Default)]
pub struct WatcherOptions {
    pub trigger: Trigger,
    pub deep: bool,
    pub pre_process: Option<Transform>,
    pub post_process: Option<Transform>,
    pub filters: Vec<Filter>,
}

impl WatcherOptions {
    pub fn lazy(mut self) -> Self {
        self.trigger = Trigger::Lazy;
        self
    }

    pub fn sync(mut self) -> Self {
        self.trigger = Trigger::Sync;
        self
    }

    /// Route to the user lane.
    pub fn user(mut self) -> Self {
        self.trigger = Trigger::Queued(Lane::User);
        self
    }

    /// Track the entire value subtree.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn pre_process(mut self, f: impl Fn(Value) -> Value + 'static) -> Self {
        self.pre_process = Some(Rc::new(f));
        self
    }

    pub fn post_process(mut self, f: impl Fn(Value) -> Value + 'static) -> Self {
        self.post_process = Some(Rc::new(f));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("trigger", &self.trigger)
            .field("deep", &self.deep)
            .field("pre_process", &self.pre_process.is_some())
            .field("post_process", &self.post_process.is_some())
            .field("filters", &self.filters.len())
            .finish()
    }
}
