//! Engine Configuration
//!
//! Configuration is held per thread, like the rest of the engine state. The
//! defaults match what a host wants in production: batched updates, a loop
//! guard of 100 runs per watcher per flush, and warnings for bad expressions.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the batcher and the watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times a single watcher may run within one flush cycle before
    /// the batcher assumes an infinite update loop and aborts the lane.
    pub max_update_count: usize,

    /// When false, every non-lazy watcher runs synchronously on invalidation
    /// instead of being queued for the next tick.
    pub async_updates: bool,

    /// Log a warning when an evaluator or setter fails.
    pub warn_expression_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_update_count: 100,
            async_updates: true,
            warn_expression_errors: true,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Snapshot of the configuration active on this thread.
pub fn current() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

/// Replace the configuration for this thread.
pub fn set(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Run `f` with `config` installed, restoring the previous configuration
/// afterwards (also on unwind).
pub fn with_config<R>(config: Config, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Config>);

    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(previous) = self.0.take() {
                set(previous);
            }
        }
    }

    let previous = CONFIG.with(|c| std::mem::replace(&mut *c.borrow_mut(), config));
    let _restore = Restore(Some(previous));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_update_count, 100);
        assert!(config.async_updates);
        assert!(config.warn_expression_errors);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = Config::from_json(r#"{ "max_update_count": 5 }"#).unwrap();
        assert_eq!(config.max_update_count, 5);
        assert!(config.async_updates);

        assert!(Config::from_json("{ nope").is_err());
    }

    #[test]
    fn with_config_restores_previous() {
        let custom = Config {
            async_updates: false,
            ..Config::default()
        };

        with_config(custom, || {
            assert!(!current().async_updates);
        });

        assert!(current().async_updates);
    }
}
