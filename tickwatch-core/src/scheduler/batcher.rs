//! Update Batcher
//!
//! The batcher collects invalidated watchers during a burst of writes and
//! runs each of them once on the next tick.
//!
//! # Algorithm
//!
//! 1. `push` records the job's id in a per-cycle presence set and appends
//!    it to its lane. A job already present is ignored, so any number of
//!    writes to its dependencies coalesce into one run. The first push
//!    since the last flush schedules a flush with `next_tick`.
//! 2. `flush` sorts the primary lane by id and drains it, then does the
//!    same for the user lane. Jobs may push more jobs while a lane drains;
//!    the lane length is re-read on every step, so they run in the same
//!    pass, slotted after the cursor in id order. If the user lane pushed
//!    primary jobs, the whole flush repeats.
//! 3. Every run is counted per id. A job that would run more than
//!    `max_update_count` times in one cycle is reported as an infinite
//!    update loop and the rest of the lane's pass is abandoned.
//!
//! Presence and counters are reset only after the flush fully settles.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};

use super::tick;
use crate::config;
use crate::reactive::SubscriberId;

/// The two scheduling lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lane {
    /// Internal watchers (the ones that keep derived output in sync).
    #[default]
    Primary,
    /// Watchers registered by user code. They run after the primary lane
    /// has settled, so they observe fully updated state.
    User,
}

/// A unit of work the batcher can run.
pub trait Job {
    fn job_id(&self) -> SubscriberId;

    fn lane(&self) -> Lane;

    fn run(&self);

    /// Human-readable name for diagnostics.
    fn label(&self) -> String;

    /// Called instead of `run` when the job is dropped from the queue by the
    /// loop guard.
    fn discard(&self) {}
}

#[derive(Default)]
struct Batcher {
    primary: Vec<Rc<dyn Job>>,
    user: Vec<Rc<dyn Job>>,
    has: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, usize>,
    /// A flush has been scheduled or is running.
    waiting: bool,
    /// The lane currently being drained and the index being run.
    draining: Option<(Lane, usize)>,
}

impl Batcher {
    fn lane_mut(&mut self, lane: Lane) -> &mut Vec<Rc<dyn Job>> {
        match lane {
            Lane::Primary => &mut self.primary,
            Lane::User => &mut self.user,
        }
    }
}

thread_local! {
    static BATCHER: RefCell<Batcher> = RefCell::new(Batcher::default());
}

/// Queue `job` for the next flush. Never runs anything synchronously.
pub fn push(job: Rc<dyn Job>) {
    let id = job.job_id();
    let lane = job.lane();

    let schedule = BATCHER.with(|batcher| {
        let mut batcher = batcher.borrow_mut();
        if !batcher.has.insert(id) {
            return false;
        }

        match batcher.draining {
            Some((draining, cursor)) if draining == lane => {
                let queue = batcher.lane_mut(lane);
                let position = queue
                    .iter()
                    .skip(cursor + 1)
                    .position(|queued| queued.job_id() > id)
                    .map(|offset| cursor + 1 + offset)
                    .unwrap_or(queue.len());
                queue.insert(position, job);
            }
            _ => batcher.lane_mut(lane).push(job),
        }

        !std::mem::replace(&mut batcher.waiting, true)
    });

    if schedule {
        tick::next_tick(flush);
    }
}

/// Number of jobs waiting in either lane.
pub fn pending_jobs() -> usize {
    BATCHER.with(|batcher| {
        let batcher = batcher.borrow();
        batcher.primary.len() + batcher.user.len()
    })
}

/// Whether `id` is queued in the current cycle.
pub fn is_queued(id: SubscriberId) -> bool {
    BATCHER.with(|batcher| batcher.borrow().has.contains(&id))
}

fn flush() {
    let max_update_count = config::current().max_update_count;
    debug!(pending = pending_jobs(), "flush start");

    loop {
        run_lane(Lane::Primary, max_update_count);
        run_lane(Lane::User, max_update_count);

        let settled = BATCHER.with(|batcher| batcher.borrow().primary.is_empty());
        if settled {
            break;
        }
    }

    BATCHER.with(|batcher| {
        let mut batcher = batcher.borrow_mut();
        batcher.has.clear();
        batcher.circular.clear();
        batcher.waiting = false;
    });
    debug!("flush end");
}

fn run_lane(lane: Lane, max_update_count: usize) {
    BATCHER.with(|batcher| {
        batcher
            .borrow_mut()
            .lane_mut(lane)
            .sort_by_key(|job| job.job_id());
    });

    let mut index = 0;
    loop {
        let next = BATCHER.with(|batcher| {
            let mut batcher = batcher.borrow_mut();
            batcher.draining = Some((lane, index));

            let job = batcher.lane_mut(lane).get(index).cloned()?;
            let id = job.job_id();
            batcher.has.remove(&id);

            let runs = batcher.circular.entry(id).or_insert(0);
            *runs += 1;
            Some((job, *runs))
        });

        let Some((job, runs)) = next else {
            break;
        };

        if runs > max_update_count {
            warn!(
                watcher = %job.label(),
                max_update_count,
                "infinite update loop detected, aborting this pass"
            );
            abandon(lane, index);
            break;
        }

        job.run();
        index += 1;
    }

    BATCHER.with(|batcher| {
        let mut batcher = batcher.borrow_mut();
        batcher.lane_mut(lane).clear();
        batcher.draining = None;
    });
}

/// Drop the jobs from `index` onwards without running them.
fn abandon(lane: Lane, index: usize) {
    let dropped: Vec<Rc<dyn Job>> = BATCHER.with(|batcher| {
        let mut batcher = batcher.borrow_mut();
        let dropped: Vec<_> = batcher.lane_mut(lane).drain(index..).collect();
        for job in &dropped {
            batcher.has.remove(&job.job_id());
        }
        dropped
    });

    for job in dropped {
        job.discard();
    }
}
