//! Reactive Computations
//!
//! This module implements the computation side of the engine: watchers,
//! the tracking context they evaluate in, and the subscriber interface that
//! dependency subjects notify.
//!
//! # Concepts
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates an expression against a context. Every reactive
//! property read during evaluation is recorded; when any of them changes,
//! the watcher is invalidated and, depending on its trigger, recomputes
//! lazily, synchronously, or on the next tick.
//!
//! ## Tracking context
//!
//! [`ReactiveContext`] is a thread-local stack naming the watcher currently
//! evaluating. Reads consult it to decide whom to register.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded: state lives in `Rc`/`RefCell` and the
//! context stack is thread-local. Dependency subjects hold watchers weakly,
//! so dropping every handle to a watcher also unsubscribes it in effect.

mod context;
mod options;
mod subscriber;
mod traverse;
mod watcher;

pub use context::{untracked, ReactiveContext};
pub use options::{callback, Callback, Filter, Transform, Trigger, WatcherOptions};
pub use subscriber::{Listener, Subscriber, SubscriberId};
pub use watcher::Watcher;
