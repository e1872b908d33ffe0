//! Watcher Implementation
//!
//! A Watcher evaluates an expression against a context, records every
//! dependency subject read while doing so, and re-evaluates when one of them
//! notifies.
//!
//! # Evaluation
//!
//! 1. Enter a reactive context so reads are recorded against this watcher.
//! 2. Run the evaluator.
//! 3. For `deep` watchers, touch the whole result so nested properties are
//!    recorded too.
//! 4. Apply `pre_process`, the read filters, then `post_process`.
//! 5. Leave the context and diff the collected subjects against the
//!    previous set: subjects no longer read are unsubscribed, new ones are
//!    subscribed.
//!
//! After step 5 the watcher's subscriptions are exactly the subjects its
//! latest evaluation read.
//!
//! # Triggers
//!
//! - `Lazy` watchers only mark themselves dirty; [`Watcher::evaluate_now`]
//!   recomputes on demand.
//! - `Sync` watchers run in place on invalidation.
//! - `Queued` watchers are pushed onto the batcher and run on the next tick.
//!
//! # Errors
//!
//! An evaluator error never escapes. It is logged and the watcher keeps its
//! previous value.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::warn;

use super::context::ReactiveContext;
use super::options::{Callback, Filter, Transform, Trigger, WatcherOptions};
use super::subscriber::{Subscriber, SubscriberId};
use super::traverse::traverse;
use crate::config;
use crate::error::{Error, Result};
use crate::expr::{Assigner, Evaluator, Expression};
use crate::observer::{Dep, DepId};
use crate::scheduler::{batcher, Job, Lane};
use crate::value::Value;

struct WatcherState {
    value: Value,
    deps: SmallVec<[Dep; 4]>,
    active: bool,
    dirty: bool,
    queued: bool,
    shallow: bool,
    evaluations: u64,
}

struct WatcherCore {
    id: SubscriberId,
    this: Weak<WatcherCore>,
    expression: String,
    trigger: Trigger,
    deep: bool,
    pre_process: Option<Transform>,
    post_process: Option<Transform>,
    filters: Vec<Filter>,
    context: RefCell<Value>,
    getter: RefCell<Option<Evaluator>>,
    setter: RefCell<Option<Assigner>>,
    callback: RefCell<Option<Callback>>,
    state: RefCell<WatcherState>,
}

/// A tracked computation. Cloning yields another handle to the same watcher.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherCore>);

impl Watcher {
    /// Create a watcher evaluating `expression` against `context`.
    ///
    /// Non-lazy watchers evaluate immediately so their dependencies are in
    /// place before this returns. Fails only if the expression does not
    /// compile.
    pub fn new(
        context: Value,
        expression: impl Into<Expression>,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let expression = expression.into();
        let (getter, setter) = expression.compile()?.into_parts();
        let lazy = options.trigger == Trigger::Lazy;

        let core = Rc::new_cyclic(|this| WatcherCore {
            id: SubscriberId::new(),
            this: this.clone(),
            expression: expression.source().to_string(),
            trigger: options.trigger,
            deep: options.deep,
            pre_process: options.pre_process,
            post_process: options.post_process,
            filters: options.filters,
            context: RefCell::new(context),
            getter: RefCell::new(Some(getter)),
            setter: RefCell::new(setter),
            callback: RefCell::new(callback),
            state: RefCell::new(WatcherState {
                value: Value::Undefined,
                deps: SmallVec::new(),
                active: true,
                dirty: lazy,
                queued: false,
                shallow: false,
                evaluations: 0,
            }),
        });

        if !lazy {
            let value = core.get();
            core.state.borrow_mut().value = value;
        }

        Ok(Self(core))
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    /// Source of the watched expression.
    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    pub fn trigger(&self) -> Trigger {
        self.0.trigger
    }

    /// The last computed value.
    pub fn value(&self) -> Value {
        self.0.state.borrow().value.clone()
    }

    pub fn is_active(&self) -> bool {
        self.0.state.borrow().active
    }

    /// Whether a lazy watcher must recompute before its value is used.
    pub fn is_dirty(&self) -> bool {
        self.0.state.borrow().dirty
    }

    pub fn dependency_count(&self) -> usize {
        self.0.state.borrow().deps.len()
    }

    /// Ids of the subjects this watcher is subscribed to.
    pub fn dependency_ids(&self) -> HashSet<DepId> {
        self.0.state.borrow().deps.iter().map(Dep::id).collect()
    }

    /// How many times the evaluator has run.
    pub fn evaluation_count(&self) -> u64 {
        self.0.state.borrow().evaluations
    }

    /// Invalidate the watcher as a dependency subject would.
    pub fn update(&self, shallow: bool) {
        self.0.update(shallow);
    }

    /// Re-evaluate and fire the callback if the value changed.
    pub fn run(&self) {
        self.0.run();
    }

    /// Recompute the value of a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) {
        self.0.evaluate();
    }

    /// The current value, recomputing first if dirty. When called during
    /// another watcher's evaluation, that watcher also becomes a dependent
    /// of everything this one depends on.
    pub fn evaluate_now(&self) -> Value {
        if self.is_dirty() {
            self.0.evaluate();
        }
        if ReactiveContext::is_active() {
            self.0.depend();
        }
        self.value()
    }

    /// Register this watcher's subjects with the watcher currently
    /// evaluating.
    pub fn depend(&self) {
        self.0.depend();
    }

    /// Assign through the expression, applying write filters in reverse.
    /// Errors are logged, not returned.
    pub fn set(&self, value: Value) {
        self.0.set(value);
    }

    /// Unsubscribe from everything and release the evaluator, callback and
    /// context. A torn-down watcher never runs again. Idempotent.
    pub fn teardown(&self) {
        self.0.teardown();
    }
}

impl WatcherCore {
    fn get(&self) -> Value {
        let Some(getter) = self.getter.borrow().clone() else {
            return self.state.borrow().value.clone();
        };
        let context = self.context.borrow().clone();

        let tracking = ReactiveContext::enter(self.id);
        let result = getter(&context).map(|raw| {
            if self.deep {
                traverse(&raw);
            }
            self.process(raw)
        });
        let deps = tracking.finish();

        self.state.borrow_mut().evaluations += 1;
        self.cleanup_deps(deps);

        match result {
            Ok(value) => value,
            Err(err) => {
                self.report(&err, "error when evaluating expression");
                self.state.borrow().value.clone()
            }
        }
    }

    fn process(&self, mut value: Value) -> Value {
        if let Some(pre_process) = &self.pre_process {
            value = pre_process(value);
        }
        for filter in &self.filters {
            if let Some(read) = &filter.read {
                value = read(value);
            }
        }
        if let Some(post_process) = &self.post_process {
            value = post_process(value);
        }
        value
    }

    /// Swap in the subjects collected by the latest evaluation.
    fn cleanup_deps(&self, new_deps: Vec<Dep>) {
        let (old_deps, active) = {
            let mut state = self.state.borrow_mut();
            (std::mem::take(&mut state.deps), state.active)
        };

        let new_ids: HashSet<DepId> = new_deps.iter().map(Dep::id).collect();
        for dep in &old_deps {
            if !active || !new_ids.contains(&dep.id()) {
                dep.unsubscribe(self.id);
            }
        }

        if !active {
            return;
        }

        let weak: Weak<dyn Subscriber> = self.this.clone();
        for dep in &new_deps {
            dep.subscribe(self.id, weak.clone());
        }
        self.state.borrow_mut().deps = SmallVec::from_vec(new_deps);
    }

    fn update(&self, shallow: bool) {
        match self.trigger {
            Trigger::Lazy => self.state.borrow_mut().dirty = true,
            Trigger::Sync => self.run(),
            Trigger::Queued(_) if !config::current().async_updates => self.run(),
            Trigger::Queued(_) => {
                {
                    let mut state = self.state.borrow_mut();
                    // A pending non-shallow invalidation is never demoted.
                    state.shallow = if state.queued {
                        shallow && state.shallow
                    } else {
                        shallow
                    };
                    state.queued = true;
                }
                if let Some(this) = self.this.upgrade() {
                    batcher::push(this);
                }
            }
        }
    }

    fn run(&self) {
        if !self.state.borrow().active {
            return;
        }

        let value = self.get();

        let (fire, old_value) = {
            let mut state = self.state.borrow_mut();
            let fire = !value.same(&state.value)
                || ((value.is_object_like() || self.deep) && !state.shallow);
            state.queued = false;
            state.shallow = false;
            (fire, std::mem::replace(&mut state.value, value.clone()))
        };

        if fire {
            let callback = self.callback.borrow().clone();
            if let Some(callback) = callback {
                callback(&value, &old_value);
            }
        }
    }

    fn evaluate(&self) {
        let value = self.get();
        let mut state = self.state.borrow_mut();
        state.value = value;
        state.dirty = false;
    }

    fn depend(&self) {
        let deps = self.state.borrow().deps.clone();
        for dep in &deps {
            dep.depend();
        }
    }

    fn set(&self, mut value: Value) {
        let current = self.state.borrow().value.clone();
        for filter in self.filters.iter().rev() {
            if let Some(write) = &filter.write {
                value = write(value, &current);
            }
        }

        let setter = self.setter.borrow().clone();
        let context = self.context.borrow().clone();
        let result = match setter {
            Some(setter) => setter(&context, value),
            None => Err(Error::NotAssignable(self.expression.clone())),
        };

        if let Err(err) = result {
            self.report(&err, "error when assigning through expression");
        }
    }

    fn teardown(&self) {
        let deps = {
            let mut state = self.state.borrow_mut();
            if !state.active {
                return;
            }
            state.active = false;
            std::mem::take(&mut state.deps)
        };

        for dep in &deps {
            dep.unsubscribe(self.id);
        }

        self.callback.borrow_mut().take();
        self.getter.borrow_mut().take();
        self.setter.borrow_mut().take();
        *self.context.borrow_mut() = Value::Undefined;
    }

    fn report(&self, err: &Error, message: &str) {
        if config::current().warn_expression_errors {
            warn!(expression = %self.expression, error = %err, "{message}");
        }
    }
}

impl Subscriber for WatcherCore {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self, shallow: bool) {
        WatcherCore::update(self, shallow);
    }
}

impl Job for WatcherCore {
    fn job_id(&self) -> SubscriberId {
        self.id
    }

    fn lane(&self) -> Lane {
        match self.trigger {
            Trigger::Queued(lane) => lane,
            Trigger::Lazy | Trigger::Sync => Lane::Primary,
        }
    }

    fn run(&self) {
        WatcherCore::run(self);
    }

    fn label(&self) -> String {
        self.expression.clone()
    }

    fn discard(&self) {
        let mut state = self.state.borrow_mut();
        state.queued = false;
        state.shallow = false;
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("expression", &self.0.expression)
            .field("trigger", &self.0.trigger)
            .field("deep", &self.0.deep)
            .field("active", &state.active)
            .field("dirty", &state.dirty)
            .field("dependencies", &state.deps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::reactive::options::callback;
    use crate::scheduler::tick;
    use serde_json::json;
    use std::cell::Cell;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` and return everything it logged.
    fn logged(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn state(json: serde_json::Value) -> Value {
        let value = Value::from(json);
        observe(&value);
        value
    }

    fn calls() -> (Rc<RefCell<Vec<(Value, Value)>>>, Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let cb = callback(move |new, old| log_clone.borrow_mut().push((new.clone(), old.clone())));
        (log, cb)
    }

    #[test]
    fn eager_watchers_evaluate_on_creation() {
        let data = state(json!({ "a": 1 }));
        let watcher = Watcher::new(data, "a", None, WatcherOptions::default()).unwrap();

        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.dependency_count(), 1);
        assert_eq!(watcher.evaluation_count(), 1);
    }

    #[test]
    fn invalid_expressions_fail_construction() {
        let err = Watcher::new(Value::object(), "a[", None, WatcherOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidExpression { .. }));
    }

    #[test]
    fn stale_dependencies_are_dropped() {
        let data = state(json!({ "flag": true, "a": 1, "b": 2 }));
        let object = data.as_object().unwrap().clone();

        let watcher = Watcher::new(
            data.clone(),
            Expression::function(|ctx| {
                let ctx = ctx.as_object().ok_or_else(|| Error::eval("no context"))?;
                Ok(if ctx.get("flag").as_bool().unwrap_or(false) {
                    ctx.get("a")
                } else {
                    ctx.get("b")
                })
            }),
            None,
            WatcherOptions::default().sync(),
        )
        .unwrap();
        assert_eq!(watcher.dependency_count(), 2);

        object.set("flag", Value::from(false));
        assert_eq!(watcher.value(), Value::from(2));
        assert_eq!(watcher.dependency_count(), 2);

        // `a` is no longer a dependency.
        let evaluations = watcher.evaluation_count();
        object.set("a", Value::from(100));
        assert_eq!(watcher.evaluation_count(), evaluations);
    }

    #[test]
    fn queued_watchers_coalesce_a_burst() {
        let data = state(json!({ "a": 1 }));
        let object = data.as_object().unwrap().clone();
        let (log, cb) = calls();
        let _watcher = Watcher::new(data, "a", Some(cb), WatcherOptions::default()).unwrap();

        object.set("a", Value::from(2));
        object.set("a", Value::from(3));
        object.set("a", Value::from(2));
        assert!(log.borrow().is_empty());

        tick::drain();
        assert_eq!(*log.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn lazy_watchers_recompute_on_demand() {
        let data = state(json!({ "a": 1 }));
        let object = data.as_object().unwrap().clone();
        let watcher = Watcher::new(data, "a", None, WatcherOptions::default().lazy()).unwrap();

        assert!(watcher.is_dirty());
        assert_eq!(watcher.evaluation_count(), 0);
        assert_eq!(watcher.evaluate_now(), Value::from(1));
        assert_eq!(watcher.evaluate_now(), Value::from(1));
        assert_eq!(watcher.evaluation_count(), 1);

        object.set("a", Value::from(5));
        assert!(watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.evaluate_now(), Value::from(5));
        assert_eq!(watcher.evaluation_count(), 2);
    }

    #[test]
    fn evaluator_errors_keep_the_previous_value() {
        let data = state(json!({ "a": { "b": 1 } }));
        let object = data.as_object().unwrap().clone();
        let watcher = Watcher::new(data, "a.b", None, WatcherOptions::default().sync()).unwrap();

        let output = logged(|| object.set("a", Value::Null));
        assert_eq!(watcher.value(), Value::from(1));
        assert!(watcher.is_active());
        assert!(output.contains("error when evaluating expression"), "got: {output}");
        assert!(output.contains("expression=a.b"), "got: {output}");

        object.set("a", Value::from(json!({ "b": 7 })));
        assert_eq!(watcher.value(), Value::from(7));
    }

    #[test]
    fn shallow_updates_skip_unchanged_objects() {
        let data = state(json!({ "obj": { "x": 1 } }));
        let (log, cb) = calls();
        let watcher = Watcher::new(data, "obj", Some(cb), WatcherOptions::default()).unwrap();

        watcher.update(true);
        tick::drain();
        assert!(log.borrow().is_empty());

        // A non-shallow invalidation escalates a pending shallow one.
        watcher.update(true);
        watcher.update(false);
        watcher.update(true);
        tick::drain();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn processing_pipeline_order() {
        let data = state(json!({ "n": 2 }));
        let watcher = Watcher::new(
            data,
            "n",
            None,
            WatcherOptions::default()
                .pre_process(|v| Value::from(v.as_f64().unwrap_or_default() + 1.0))
                .filter(Filter::read(|v| Value::from(v.as_f64().unwrap_or_default() * 10.0)))
                .post_process(|v| Value::from(format!("{v:?}"))),
        )
        .unwrap();

        assert_eq!(watcher.value(), Value::from("30"));
    }

    #[test]
    fn set_applies_write_filters_in_reverse() {
        let data = state(json!({ "n": 1 }));
        let object = data.as_object().unwrap().clone();
        let watcher = Watcher::new(
            data,
            "n",
            None,
            WatcherOptions::default()
                .sync()
                .filter(Filter::default().with_write(|v, _| {
                    Value::from(v.as_f64().unwrap_or_default() + 1.0)
                }))
                .filter(Filter::default().with_write(|v, _| {
                    Value::from(v.as_f64().unwrap_or_default() * 2.0)
                })),
        )
        .unwrap();

        watcher.set(Value::from(5));
        assert_eq!(object.peek("n"), Value::from(11));
    }

    #[test]
    fn failed_assignments_are_logged() {
        let data = state(json!({ "n": 1, "list": [] }));
        let object = data.as_object().unwrap().clone();

        let literal = Watcher::new(data.clone(), "true", None, WatcherOptions::default()).unwrap();
        let read_only = Watcher::new(
            data.clone(),
            Expression::accessor(
                |ctx| Ok(ctx.as_object().map(|o| o.get("n")).unwrap_or_default()),
                |_, _| Err(Error::eval("n is read-only")),
            ),
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        let indexed = Watcher::new(
            data,
            "list[18446744073709551615]",
            None,
            WatcherOptions::default(),
        )
        .unwrap();

        let output = logged(|| {
            literal.set(Value::from(false));
            read_only.set(Value::from(5));
            indexed.set(Value::from(1));
        });

        assert!(output.contains("error when assigning through expression"), "got: {output}");
        assert!(output.contains("expression `true` is not assignable"), "got: {output}");
        assert!(output.contains("n is read-only"), "got: {output}");
        assert!(output.contains("invalid array index"), "got: {output}");

        assert!(literal.is_active() && read_only.is_active() && indexed.is_active());
        assert_eq!(object.peek("n"), Value::from(1));
        assert_eq!(object.peek("list").as_array().unwrap().len(), 0);
        assert_eq!(read_only.value(), Value::from(1));
    }

    #[test]
    fn teardown_is_final_and_idempotent() {
        let data = state(json!({ "a": 1 }));
        let object = data.as_object().unwrap().clone();
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let watcher = Watcher::new(
            data,
            "a",
            Some(callback(move |_, _| fired_clone.set(fired_clone.get() + 1))),
            WatcherOptions::default(),
        )
        .unwrap();

        object.set("a", Value::from(2));
        watcher.teardown();
        watcher.teardown();
        tick::drain();
        object.set("a", Value::from(3));
        tick::drain();

        assert_eq!(fired.get(), 0);
        assert!(!watcher.is_active());
        assert_eq!(watcher.dependency_count(), 0);
    }

    #[test]
    fn synchronous_mode_from_config() {
        let data = state(json!({ "a": 1 }));
        let object = data.as_object().unwrap().clone();
        let (log, cb) = calls();
        let _watcher = Watcher::new(data, "a", Some(cb), WatcherOptions::default()).unwrap();

        config::with_config(
            config::Config {
                async_updates: false,
                ..config::Config::default()
            },
            || object.set("a", Value::from(2)),
        );

        assert_eq!(log.borrow().len(), 1);
        assert!(!tick::is_pending());
    }
}
