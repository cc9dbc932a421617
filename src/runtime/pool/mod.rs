//! Actor pool
//!
//! A bounded pool of worker threads that runs actor turns. Workers are
//! spawned on demand up to `max_threads` and exit after sitting idle for
//! `idle_timeout`. Work that finds no free worker waits in a FIFO run queue.
//!
//! Delayed sends go through a per-pool scheduler thread, started the first
//! time something is scheduled.
//!
//! Lifecycle is one-directional: `Running → Stopping → Done`.

pub mod config;
pub(crate) mod timer;
pub mod worker;

pub use config::PoolConfig;
pub use worker::WorkerContext;

pub(crate) use timer::Deferred;
pub(crate) use worker::Work;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::runtime::error::{RuntimeError, RuntimeResult};
use timer::Timer;

/// Pool lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Accepting work.
    Running,
    /// Stopped; draining queued work.
    Stopping,
    /// Stopped and every worker has exited.
    Done,
}

/// Pool statistics.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Actor turns submitted to the run queue.
    pub submitted: AtomicUsize,
    /// Messages whose handler returned a value.
    pub completed: AtomicUsize,
    /// Messages whose handler failed.
    pub failed: AtomicUsize,
    /// Messages cancelled before their handler ran.
    pub cancelled: AtomicUsize,
    /// Worker threads spawned.
    pub workers_spawned: AtomicUsize,
    /// Worker threads that exited after idling.
    pub workers_reclaimed: AtomicUsize,
    /// Handlers running right now.
    pub running: AtomicUsize,
    /// Peak number of concurrently running handlers.
    pub peak_running: AtomicUsize,
}

impl PoolStats {
    #[inline]
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn record_reclaimed(&self) {
        self.workers_reclaimed.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark a handler as started and update the peak.
    #[inline]
    pub fn enter_handler(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
    }

    #[inline]
    pub fn exit_handler(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            workers_spawned: self.workers_spawned.load(Ordering::SeqCst),
            workers_reclaimed: self.workers_reclaimed.load(Ordering::SeqCst),
            peak_running: self.peak_running.load(Ordering::SeqCst),
        }
    }
}

/// Copy of [`PoolStats`] taken at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub workers_spawned: usize,
    pub workers_reclaimed: usize,
    pub peak_running: usize,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "submitted={} completed={} failed={} cancelled={} workers_spawned={} workers_reclaimed={} peak_running={}",
            self.submitted,
            self.completed,
            self.failed,
            self.cancelled,
            self.workers_spawned,
            self.workers_reclaimed,
            self.peak_running
        )
    }
}

pub(crate) struct PoolState {
    pub(crate) phase: PoolPhase,
    pub(crate) pending: VecDeque<Arc<dyn Work>>,
    pub(crate) workers: usize,
    pub(crate) idle: usize,
    next_worker: usize,
}

pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState>,
    /// Signalled when work is queued or the pool stops.
    pub(crate) work_ready: Condvar,
    /// Signalled when a worker exits.
    pub(crate) workers_changed: Condvar,
    pub(crate) stats: PoolStats,
    killed: AtomicBool,
    timer: OnceCell<Timer>,
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get() {
            timer.stop();
        }
    }
}

/// Bounded worker pool shared by a group of actors.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ActorPool {
    shared: Arc<PoolShared>,
}

impl ActorPool {
    /// Create a pool with default configuration.
    pub fn new() -> Self {
        Self::from_valid(PoolConfig::default())
    }

    /// Create a pool, letting `configure` adjust the defaults first.
    ///
    /// ```
    /// use actorcore::ActorPool;
    ///
    /// let pool = ActorPool::make(|cfg| cfg.max_threads = 4).unwrap();
    /// assert_eq!(pool.config().max_threads, 4);
    /// ```
    pub fn make<F>(configure: F) -> RuntimeResult<Self>
    where
        F: FnOnce(&mut PoolConfig),
    {
        let mut config = PoolConfig::default();
        configure(&mut config);
        Self::with_config(config)
    }

    /// Create a pool from a complete configuration.
    pub fn with_config(config: PoolConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: PoolConfig) -> Self {
        debug!(
            pool = %config.name,
            max_threads = config.max_threads,
            "pool created"
        );
        Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    phase: PoolPhase::Running,
                    pending: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    next_worker: 0,
                }),
                work_ready: Condvar::new(),
                workers_changed: Condvar::new(),
                stats: PoolStats::default(),
                killed: AtomicBool::new(false),
                timer: OnceCell::new(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase
    }

    /// Check if `stop` or `kill` has been called.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.phase() != PoolPhase::Running
    }

    /// Check if the pool is stopped and every worker has exited.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.phase() == PoolPhase::Done
    }

    #[inline]
    pub fn is_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    /// Live worker threads
    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().workers
    }

    /// Actor turns waiting for a worker
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Delayed messages not yet due
    pub fn scheduled_count(&self) -> usize {
        self.shared.timer.get().map_or(0, Timer::len)
    }

    /// Stop accepting new messages.
    ///
    /// Messages already queued run to completion. Delayed messages that are
    /// not yet due are cancelled. Calling `stop` again has no effect.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.phase != PoolPhase::Running {
                return;
            }
            state.phase = if state.workers == 0 {
                PoolPhase::Done
            } else {
                PoolPhase::Stopping
            };
            self.shared.work_ready.notify_all();
            self.shared.workers_changed.notify_all();
        }
        if let Some(timer) = self.shared.timer.get() {
            timer.stop();
        }
        info!(pool = %self.name(), "pool stopped");
    }

    /// Stop the pool and cancel every message that has not started.
    ///
    /// Handlers already running finish; their actors process nothing more.
    pub fn kill(&self) {
        self.shared.killed.store(true, Ordering::SeqCst);
        self.stop();
        let drained: Vec<_> = self.shared.state.lock().pending.drain(..).collect();
        let count = drained.len();
        for work in drained {
            work.cancel();
        }
        info!(pool = %self.name(), cancelled_turns = count, "pool killed");
    }

    /// Wait until the pool is done.
    ///
    /// Returns `true` once every worker has exited after a stop, or `false`
    /// if `timeout` elapses first. `None` waits without a deadline.
    pub fn join(
        &self,
        timeout: Option<Duration>,
    ) -> bool {
        // an unrepresentable deadline waits without one
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.shared.state.lock();
        while state.phase != PoolPhase::Done {
            match deadline {
                None => self.shared.workers_changed.wait(&mut state),
                Some(at) => {
                    if self
                        .shared
                        .workers_changed
                        .wait_until(&mut state, at)
                        .timed_out()
                    {
                        return state.phase == PoolPhase::Done;
                    }
                }
            }
        }
        true
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Queue `work` for a worker.
    ///
    /// A finished or killed pool cancels the work instead. Work submitted
    /// while stopping is still run, so actors can drain their mailboxes.
    pub(crate) fn submit(
        &self,
        work: Arc<dyn Work>,
    ) {
        let mut state = self.shared.state.lock();
        if state.phase == PoolPhase::Done || self.is_killed() {
            drop(state);
            work.cancel();
            return;
        }

        state.pending.push_back(work);
        self.shared.stats.record_submitted();

        if state.pending.len() > state.idle
            && state.workers < self.shared.config.max_threads
            && !self.spawn_worker(&mut state)
            && state.workers == 0
        {
            // nobody left to run it
            let orphan = state.pending.pop_back();
            drop(state);
            if let Some(work) = orphan {
                work.cancel();
            }
            return;
        }
        self.shared.work_ready.notify_one();
    }

    fn spawn_worker(
        &self,
        state: &mut PoolState,
    ) -> bool {
        let n = state.next_worker;
        state.next_worker += 1;
        let name = format!("{}-worker-{}", self.shared.config.name, n);
        let shared = self.shared.clone();
        let thread_name = name.clone();

        match thread::Builder::new()
            .name(name)
            .spawn(move || worker::worker_loop(shared, thread_name))
        {
            Ok(_) => {
                state.workers += 1;
                self.shared.stats.record_spawned();
                true
            }
            Err(e) => {
                error!(pool = %self.name(), error = %e, "failed to spawn worker thread");
                false
            }
        }
    }

    /// Run `task` on the scheduler thread once `delay` elapses.
    ///
    /// On a stopped pool the task is cancelled.
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        task: Box<dyn Deferred>,
    ) -> RuntimeResult<()> {
        if self.is_stopped() {
            task.cancel();
            return Ok(());
        }
        let timer = match self.shared.timer.get_or_try_init(|| Timer::start(self.name())) {
            Ok(timer) => timer,
            Err(err) => {
                warn!(pool = %self.name(), error = %err, "scheduler unavailable");
                task.cancel();
                return Err(err);
            }
        };
        timer.schedule(delay, task);
        if self.is_stopped() {
            // lost a race with stop()
            timer.stop();
        }
        Ok(())
    }

    /// Fail with `PoolStopped` once the pool stops accepting messages.
    pub(crate) fn check_running(&self) -> RuntimeResult<()> {
        if self.is_stopped() {
            Err(RuntimeError::PoolStopped(self.name().to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for ActorPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActorPool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ActorPool")
            .field("name", &self.shared.config.name)
            .field("phase", &state.phase)
            .field("workers", &state.workers)
            .field("pending", &state.pending.len())
            .finish()
    }
}
