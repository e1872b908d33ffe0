//! Subscriber types for the reactive system.
//!
//! A Subscriber represents anything a dependency subject can invalidate.
//! Watchers are the main implementation; [`Listener`] adapts a plain closure.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Ids are handed out in creation order. The batcher relies on this: within
/// a lane, queued watchers run in ascending id order, so a watcher created
/// earlier always runs before one created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that reacts when one of its dependencies changes.
pub trait Subscriber {
    fn subscriber_id(&self) -> SubscriberId;

    /// Called by a dependency subject on change. `shallow` invalidations
    /// only need a reference-equality re-check.
    fn update(&self, shallow: bool);
}

/// A subscriber backed by a closure.
pub struct Listener {
    id: SubscriberId,
    notify: Box<dyn Fn(bool)>,
}

impl Listener {
    /// Create a listener. The closure receives the `shallow` flag.
    pub fn new<F>(notify: F) -> Rc<Self>
    where
        F: Fn(bool) + 'static,
    {
        Rc::new(Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        })
    }
}

impl Subscriber for Listener {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self, shallow: bool) {
        (self.notify)(shallow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn subscriber_ids_are_unique_and_ordered() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert!(id1 < id2 && id2 < id3);
    }

    #[test]
    fn listener_update_calls_closure() {
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();

        let listener = Listener::new(move |shallow| seen_clone.set(Some(shallow)));

        assert_eq!(seen.get(), None);
        listener.update(true);
        assert_eq!(seen.get(), Some(true));
    }
}
