//! Tickwatch Core
//!
//! This crate provides a reactive dependency-tracking and batched-update
//! engine. It turns plain mutable state into a live dataflow graph:
//!
//! - Reads of observed state are tracked automatically
//! - Derived values recompute when, and only when, their inputs change
//! - Side effects run once per burst of writes, on the next tick
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - `value`: the dynamic, reference-typed state graph
//! - `observer`: dependency subjects, reactive properties and observation
//! - `reactive`: watchers and the tracking context
//! - `scheduler`: the two-lane batcher and the tick driver
//! - `expr`: path expressions compiled to tracked getters and setters
//! - `scope`: an owning context with proxied keys and computed properties
//!
//! Everything is single-threaded. Engine state (tracking stack, batcher,
//! tick queue, configuration) is thread-local.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tickwatch_core::{callback, tick, Scope, WatchOptions};
//!
//! let scope = Scope::from_json(json!({ "count": 1 }))?;
//!
//! scope.watch(
//!     "count",
//!     callback(|new, old| println!("count: {old:?} -> {new:?}")),
//!     WatchOptions::default(),
//! )?;
//!
//! scope.set("count", 2.into());
//! scope.set("count", 3.into());
//!
//! // One callback for the whole burst: "count: 1 -> 3"
//! tick::drain();
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod scope;
pub mod value;

pub use config::Config;
pub use error::{Error, Result};
pub use expr::Expression;
pub use observer::{define_reactive, observe, without_conversion};
pub use reactive::{callback, Callback, Filter, Trigger, Watcher, WatcherOptions};
pub use scheduler::tick;
pub use scope::{Computed, Scope, WatchOptions};
pub use value::{Array, Object, Value};
