//! Delayed work scheduler
//!
//! One thread per pool, started on first use. Entries fire in deadline
//! order; entries with equal deadlines fire in scheduling order.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::runtime::error::{panic_message, RuntimeError, RuntimeResult};

/// Work waiting for its deadline.
pub(crate) trait Deferred: Send {
    /// Deadline reached.
    fn fire(self: Box<Self>);
    /// Scheduler stopped before the deadline.
    fn cancel(self: Box<Self>);
}

struct Entry {
    /// `None` when the delay is too large to represent; never fires.
    deadline: Option<Instant>,
    seq: u64,
    task: Box<dyn Deferred>,
}

impl PartialEq for Entry {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        (self.deadline.is_none(), self.deadline, self.seq).cmp(&(
            other.deadline.is_none(),
            other.deadline,
            other.seq,
        ))
    }
}

#[derive(Default)]
struct TimerState {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    stopped: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

/// Deadline-ordered scheduler thread
pub(crate) struct Timer {
    shared: Arc<TimerShared>,
}

impl Timer {
    /// Start the scheduler thread.
    pub(crate) fn start(pool_name: &str) -> RuntimeResult<Self> {
        let shared = Arc::new(TimerShared::default());
        let thread_shared = shared.clone();
        thread::Builder::new()
            .name(format!("{}-scheduler", pool_name))
            .spawn(move || run(&thread_shared))
            .map_err(|e| {
                RuntimeError::Config(format!("cannot start scheduler thread: {}", e))
            })?;
        debug!(pool = pool_name, "scheduler started");
        Ok(Self { shared })
    }

    /// Fire `task` once `delay` elapses. A stopped timer cancels it.
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        task: Box<dyn Deferred>,
    ) {
        let mut state = self.shared.state.lock();
        if state.stopped {
            drop(state);
            task.cancel();
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Reverse(Entry {
            deadline: Instant::now().checked_add(delay),
            seq,
            task,
        }));
        self.shared.wake.notify_one();
    }

    /// Number of entries waiting for their deadline.
    pub(crate) fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Stop the thread and cancel every entry not yet due.
    pub(crate) fn stop(&self) {
        let pending = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.wake.notify_all();
            std::mem::take(&mut state.queue)
        };
        for Reverse(entry) in pending.into_vec() {
            entry.task.cancel();
        }
    }
}

fn run(shared: &TimerShared) {
    let mut state = shared.state.lock();
    while !state.stopped {
        let next = state.queue.peek().and_then(|Reverse(e)| e.deadline);
        match next {
            None => shared.wake.wait(&mut state),
            Some(deadline) if deadline <= Instant::now() => {
                if let Some(Reverse(entry)) = state.queue.pop() {
                    MutexGuard::unlocked(&mut state, || fire(entry.task));
                }
            }
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
        }
    }
}

fn fire(task: Box<dyn Deferred>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.fire())) {
        warn!(panic = %panic_message(payload.as_ref()), "scheduled task panicked");
    }
}
