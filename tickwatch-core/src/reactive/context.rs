//! Reactive Context
//!
//! The reactive context tracks which computation is currently evaluating.
//! When a reactive property is read, its subject is recorded against the
//! computation on top of the stack.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per evaluation in flight. Only the
//! top entry collects dependencies, so a lazy watcher evaluated from inside
//! another watcher's evaluation temporarily becomes current and hands
//! control back when it finishes.
//!
//! Each entry deduplicates subjects by id: reading `a`, `b`, then `a` again
//! records two dependencies, not three.

use std::cell::RefCell;
use std::collections::HashSet;

use smallvec::SmallVec;

use super::SubscriberId;
use crate::observer::{Dep, DepId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The evaluating computation, or `None` for an untracked section.
    subscriber_id: Option<SubscriberId>,
    /// Subjects read during this evaluation, in first-read order.
    dependencies: SmallVec<[Dep; 8]>,
    seen: HashSet<DepId>,
}

/// Guard that pops the context when dropped or finished.
///
/// The stack stays balanced even if the evaluation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
                seen: HashSet::new(),
            });
        });

        Self {
            subscriber_id,
            finished: false,
        }
    }

    /// Whether reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// The computation currently evaluating, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record a read of `dep` against the current computation.
    pub fn track(dep: &Dep) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() && entry.seen.insert(dep.id()) {
                    entry.dependencies.push(dep.clone());
                }
            }
        });
    }

    /// Ids of the subjects collected so far in the current context.
    pub fn dependencies() -> Vec<DepId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().map(Dep::id).collect())
                .unwrap_or_default()
        })
    }

    /// Leave the context and return the subjects it collected.
    pub fn finish(mut self) -> Vec<Dep> {
        self.finished = true;
        self.pop().map(|entry| entry.dependencies.into_vec()).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, entry.subscriber_id
            );
        }
        popped
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` without recording any dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _context = ReactiveContext::push(None);
    f()
}
