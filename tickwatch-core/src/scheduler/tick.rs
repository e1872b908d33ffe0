//! Tick Driver
//!
//! A tick is the boundary between a burst of synchronous writes and the
//! work deferred until after it. [`next_tick`] queues a callback; a *turn*
//! runs every callback queued before the turn started.
//!
//! # Drivers
//!
//! - **Manual** (default): the host decides when a turn happens by calling
//!   [`run_pending`] or [`drain`]. Tests and embedders with their own event
//!   loop use this.
//! - **Tokio**: [`use_tokio`] returns a [`TickLoop`] to spawn on a
//!   `tokio::task::LocalSet`. The first callback of a turn wakes the loop
//!   through a channel, so the turn runs once the current task yields.

use std::cell::RefCell;
use std::mem;

use tokio::sync::mpsc;
use tracing::{debug, trace};

type Callback = Box<dyn FnOnce()>;

enum Driver {
    Manual,
    Tokio(mpsc::UnboundedSender<()>),
}

struct TickState {
    callbacks: Vec<Callback>,
    /// A turn has been requested and has not started yet.
    pending: bool,
    driver: Driver,
}

thread_local! {
    static TICK: RefCell<TickState> = const {
        RefCell::new(TickState {
            callbacks: Vec::new(),
            pending: false,
            driver: Driver::Manual,
        })
    };
}

/// Defer `callback` to the next turn.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.callbacks.push(Box::new(callback));
        if !tick.pending {
            tick.pending = true;
            request_turn(&mut tick);
        }
    });
}

fn request_turn(tick: &mut TickState) {
    if let Driver::Tokio(sender) = &tick.driver {
        if sender.send(()).is_err() {
            debug!("tick loop is gone, falling back to manual driver");
            tick.driver = Driver::Manual;
        }
    }
}

/// Run one turn. Callbacks queued while the turn runs wait for the next
/// one. Returns how many callbacks ran.
pub fn run_pending() -> usize {
    let callbacks = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.pending = false;
        mem::take(&mut tick.callbacks)
    });

    let count = callbacks.len();
    if count > 0 {
        trace!(callbacks = count, "tick turn");
    }
    for callback in callbacks {
        callback();
    }
    count
}

/// Run turns until nothing is pending. Returns how many callbacks ran.
pub fn drain() -> usize {
    let mut total = 0;
    while is_pending() {
        total += run_pending();
    }
    total
}

/// Whether any callback is waiting for a turn.
pub fn is_pending() -> bool {
    TICK.with(|tick| !tick.borrow().callbacks.is_empty())
}

/// Switch to the manual driver. A running [`TickLoop`] stops.
pub fn use_manual() {
    TICK.with(|tick| tick.borrow_mut().driver = Driver::Manual);
}

/// Switch to the tokio driver and return the loop that runs the turns.
///
/// The loop must be spawned on a `LocalSet` on this thread:
///
/// ```ignore
/// let local = tokio::task::LocalSet::new();
/// local.spawn_local(tick::use_tokio().run());
/// ```
pub fn use_tokio() -> TickLoop {
    let (sender, receiver) = mpsc::unbounded_channel();

    TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.driver = Driver::Tokio(sender);
        if !tick.callbacks.is_empty() {
            tick.pending = true;
            request_turn(&mut tick);
        }
    });

    TickLoop { receiver }
}

/// Future side of the tokio driver.
pub struct TickLoop {
    receiver: mpsc::UnboundedReceiver<()>,
}

impl TickLoop {
    /// Run a turn for every wake-up until the driver is replaced.
    pub async fn run(mut self) {
        while self.receiver.recv().await.is_some() {
            run_pending();
        }
        debug!("tick loop stopped");
    }
}
