//! Dependency Subject
//!
//! A `Dep` is the smallest unit of the dependency graph: a publish/subscribe
//! node owned by one reactive property or by one observed collection. It
//! holds its subscribers weakly, so a subject never keeps a watcher alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::reactive::{ReactiveContext, Subscriber, SubscriberId};

/// Unique identifier for a dependency subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Subscription = (SubscriberId, Weak<dyn Subscriber>);

struct DepInner {
    id: DepId,
    subs: RefCell<SmallVec<[Subscription; 4]>>,
}

/// A dependency subject. Cloning yields another handle to the same subject.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            id: DepId::new(),
            subs: RefCell::new(SmallVec::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Add a subscriber. Subscribing twice is a no-op.
    pub fn subscribe(&self, id: SubscriberId, subscriber: Weak<dyn Subscriber>) {
        let mut subs = self.0.subs.borrow_mut();
        if !subs.iter().any(|(existing, _)| *existing == id) {
            subs.push((id, subscriber));
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.0.subs.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    /// Register this subject with the computation currently being evaluated.
    pub fn depend(&self) {
        ReactiveContext::track(self);
    }

    /// Invalidate every subscriber.
    ///
    /// Iterates over a snapshot, so subscribers may subscribe, unsubscribe or
    /// tear each other down while being notified.
    pub fn notify(&self) {
        let snapshot: SmallVec<[Subscription; 4]> = self.0.subs.borrow().clone();
        let mut dead = false;

        for (_, subscriber) in snapshot.iter() {
            match subscriber.upgrade() {
                Some(subscriber) => subscriber.update(false),
                None => dead = true,
            }
        }

        if dead {
            self.0
                .subs
                .borrow_mut()
                .retain(|(_, subscriber)| subscriber.strong_count() > 0);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.0.subs.borrow().iter().any(|(existing, _)| *existing == id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Listener;
    use std::cell::Cell;

    fn counting_listener() -> (Rc<Listener>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let listener = Listener::new(move |_| count_clone.set(count_clone.get() + 1));
        (listener, count)
    }

    #[test]
    fn subscribe_is_idempotent() {
        let dep = Dep::new();
        let (listener, count) = counting_listener();
        let weak: Weak<dyn Subscriber> = Rc::downgrade(&listener) as Weak<dyn Subscriber>;

        dep.subscribe(listener.subscriber_id(), weak.clone());
        dep.subscribe(listener.subscriber_id(), weak);
        assert_eq!(dep.subscriber_count(), 1);

        dep.notify();
        assert_eq!(count.get(), 1);

        dep.unsubscribe(listener.subscriber_id());
        dep.notify();
        assert_eq!(count.get(), 1);
        assert!(!dep.has_subscriber(listener.subscriber_id()));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let dep = Dep::new();
        let (listener, _) = counting_listener();
        dep.subscribe(
            listener.subscriber_id(),
            Rc::downgrade(&listener) as Weak<dyn Subscriber>,
        );
        drop(listener);

        dep.notify();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_tolerates_unsubscribe_during_iteration() {
        let dep = Dep::new();
        let (second, count) = counting_listener();
        let second_id = second.subscriber_id();

        let dep_clone = dep.clone();
        let first = Listener::new(move |_| dep_clone.unsubscribe(second_id));

        dep.subscribe(first.subscriber_id(), Rc::downgrade(&first) as Weak<dyn Subscriber>);
        dep.subscribe(second_id, Rc::downgrade(&second) as Weak<dyn Subscriber>);

        // The snapshot still reaches the second listener on this round.
        dep.notify();
        assert_eq!(count.get(), 1);
        assert_eq!(dep.subscriber_count(), 1);
    }
}
