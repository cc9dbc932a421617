//! Pool workers

use parking_lot::MutexGuard;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use crate::runtime::actor::context::Locals;
use crate::runtime::error::panic_message;

use super::{PoolPhase, PoolShared};

/// A unit of work run by a pool worker.
pub(crate) trait Work: Send + Sync {
    /// Run on a worker thread.
    fn run(
        self: Arc<Self>,
        ctx: &mut WorkerContext,
    );

    /// Drop without running. Called when the pool refuses or discards the work.
    fn cancel(self: Arc<Self>);
}

/// State owned by one worker thread for its whole life.
#[derive(Debug)]
pub struct WorkerContext {
    name: String,
    locals: Locals,
}

impl WorkerContext {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            locals: Locals::new(),
        }
    }

    /// Worker thread name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    #[inline]
    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }
}

/// Worker thread main loop.
///
/// Runs queued work in FIFO order. Exits when the pool is stopping and no
/// work is left, or after sitting idle for the configured timeout.
pub(crate) fn worker_loop(
    shared: Arc<PoolShared>,
    name: String,
) {
    let mut ctx = WorkerContext::new(name);
    let idle_timeout = shared.config.idle_timeout();
    debug!(worker = ctx.name(), "worker started");

    let mut state = shared.state.lock();
    loop {
        if let Some(work) = state.pending.pop_front() {
            MutexGuard::unlocked(&mut state, || execute(work, &mut ctx));
            continue;
        }
        if state.phase != PoolPhase::Running {
            break;
        }

        state.idle += 1;
        let timed_out = shared
            .work_ready
            .wait_for(&mut state, idle_timeout)
            .timed_out();
        state.idle -= 1;

        if timed_out && state.pending.is_empty() && state.phase == PoolPhase::Running {
            shared.stats.record_reclaimed();
            debug!(worker = ctx.name(), "idle worker reclaimed");
            break;
        }
    }

    state.workers -= 1;
    if state.phase == PoolPhase::Stopping && state.workers == 0 {
        state.phase = PoolPhase::Done;
        debug!(pool = %shared.config.name, "all workers exited");
    }
    shared.workers_changed.notify_all();
}

fn execute(
    work: Arc<dyn Work>,
    ctx: &mut WorkerContext,
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work.run(ctx))) {
        error!(
            worker = ctx.name(),
            panic = %panic_message(payload.as_ref()),
            "work item panicked"
        );
    }
}
