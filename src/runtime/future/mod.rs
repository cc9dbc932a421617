//! Futures
//!
//! A [`Future`] is a single-assignment cell holding the outcome of an
//! asynchronous computation. It moves once from pending to exactly one of
//! completed, failed or cancelled; every observer sees that same outcome.
//!
//! [`ActorFuture`] is the future returned by an actor send. It also carries
//! the message until a worker picks it up.

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::runtime::actor::ActorId;
use crate::runtime::error::{panic_message, RuntimeError, RuntimeResult};
use crate::runtime::value::{guard, Value};

/// Terminal outcome of a future.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Failed(RuntimeError),
    Cancelled,
}

impl Outcome {
    /// Convert to the result `get` reports.
    pub fn to_result(&self) -> RuntimeResult<Value> {
        match self {
            Outcome::Completed(v) => Ok(v.clone()),
            Outcome::Failed(e) => Err(e.clone()),
            Outcome::Cancelled => Err(RuntimeError::Cancelled),
        }
    }

    #[inline]
    pub fn status(&self) -> FutureStatus {
        match self {
            Outcome::Completed(_) => FutureStatus::Completed,
            Outcome::Failed(_) => FutureStatus::Failed,
            Outcome::Cancelled => FutureStatus::Cancelled,
        }
    }
}

/// Observable state of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl FutureStatus {
    /// Check if this is a terminal state.
    #[inline]
    pub fn is_done(self) -> bool {
        !matches!(self, FutureStatus::Pending)
    }
}

/// Where a future came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Built by [`Future::completable`], resolved by application code.
    Completable,
    /// Result of a send to the given actor, resolved by a pool worker.
    Actor(ActorId),
}

type Callback = Box<dyn FnOnce(&Outcome) + Send>;

struct FutureState {
    outcome: Option<Outcome>,
    callbacks: SmallVec<[Callback; 2]>,
}

struct FutureInner {
    origin: Origin,
    state: Mutex<FutureState>,
    done: Condvar,
}

/// Single-assignment result cell.
#[derive(Clone)]
pub struct Future {
    inner: Arc<FutureInner>,
}

impl Future {
    fn with_origin(origin: Origin) -> Self {
        Self {
            inner: Arc::new(FutureInner {
                origin,
                state: Mutex::new(FutureState {
                    outcome: None,
                    callbacks: SmallVec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Create a pending future resolved by [`complete`](Self::complete) or
    /// [`fail`](Self::fail).
    pub fn completable() -> Self {
        Self::with_origin(Origin::Completable)
    }

    #[inline]
    pub fn origin(&self) -> Origin {
        self.inner.origin
    }

    /// Actor this future was sent to, if any.
    pub fn actor_id(&self) -> Option<ActorId> {
        match self.inner.origin {
            Origin::Actor(id) => Some(id),
            Origin::Completable => None,
        }
    }

    pub fn status(&self) -> FutureStatus {
        self.inner
            .state
            .lock()
            .outcome
            .as_ref()
            .map_or(FutureStatus::Pending, Outcome::status)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status() == FutureStatus::Cancelled
    }

    /// Terminal outcome, if reached.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// Block until the future is terminal or `timeout` elapses.
    ///
    /// `None`, or a timeout too large to represent, waits without a deadline.
    pub fn get(
        &self,
        timeout: Option<Duration>,
    ) -> RuntimeResult<Value> {
        let mut state = self.inner.state.lock();
        if let Some(outcome) = &state.outcome {
            return outcome.to_result();
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t).map(|at| (t, at)));
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.to_result();
            }
            match deadline {
                None => self.inner.done.wait(&mut state),
                Some((t, at)) => {
                    if self.inner.done.wait_until(&mut state, at).timed_out()
                        && state.outcome.is_none()
                    {
                        return Err(RuntimeError::Timeout(t));
                    }
                }
            }
        }
    }

    /// Move a pending future to cancelled.
    ///
    /// Returns `false` if the future was already terminal. A handler that is
    /// already running is not interrupted; its result is discarded.
    pub fn cancel(&self) -> bool {
        self.resolve(Outcome::Cancelled)
    }

    /// Complete a future made by [`Future::completable`].
    ///
    /// The value passes through the immutability guard; a value that cannot
    /// be made immutable fails the future with `NotImmutable`. Actor futures
    /// are resolved by their worker only, so this returns `false` for them,
    /// as it does for futures that are already terminal.
    pub fn complete(
        &self,
        value: Value,
    ) -> bool {
        if self.inner.origin != Origin::Completable {
            return false;
        }
        match guard::make_safe(value) {
            Ok(value) => self.resolve(Outcome::Completed(value)),
            Err(err) => self.resolve(Outcome::Failed(err)),
        }
    }

    /// Fail a future made by [`Future::completable`].
    pub fn fail(
        &self,
        err: RuntimeError,
    ) -> bool {
        self.inner.origin == Origin::Completable && self.resolve(Outcome::Failed(err))
    }

    /// Register a callback invoked exactly once with the terminal outcome.
    ///
    /// If the future is already terminal the callback runs immediately on the
    /// calling thread; otherwise it runs on the thread that resolves it.
    pub fn on_complete<F>(
        &self,
        callback: F,
    ) where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let outcome = {
            let mut state = self.inner.state.lock();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        run_callback(Box::new(callback), &outcome);
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn resolve(
        &self,
        outcome: Outcome,
    ) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            self.inner.done.notify_all();
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            run_callback(callback, &outcome);
        }
        true
    }
}

fn run_callback(
    callback: Callback,
    outcome: &Outcome,
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        warn!(panic = %panic_message(payload.as_ref()), "future callback panicked");
    }
}

impl fmt::Debug for Future {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Future")
            .field("origin", &self.inner.origin)
            .field("status", &self.status())
            .finish()
    }
}

/// Future returned by an actor send.
///
/// Derefs to [`Future`]; the message rides along until a worker takes it.
#[derive(Clone)]
pub struct ActorFuture {
    actor: ActorId,
    future: Future,
    message: Arc<Mutex<Option<Value>>>,
}

impl ActorFuture {
    pub(crate) fn new(
        actor: ActorId,
        message: Value,
    ) -> Self {
        Self {
            actor,
            future: Future::with_origin(Origin::Actor(actor)),
            message: Arc::new(Mutex::new(Some(message))),
        }
    }

    /// Actor the message was sent to.
    #[inline]
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Plain future view
    #[inline]
    pub fn future(&self) -> &Future {
        &self.future
    }

    #[inline]
    pub fn into_future(self) -> Future {
        self.future
    }

    /// Borrow the message while it is still queued.
    pub(crate) fn with_message<R>(
        &self,
        f: impl FnOnce(&Value) -> R,
    ) -> Option<R> {
        self.message.lock().as_ref().map(f)
    }

    pub(crate) fn take_message(&self) -> Option<Value> {
        self.message.lock().take()
    }

    /// Merge `incoming` into the queued message.
    ///
    /// Hands `incoming` back if the message is already gone.
    pub(crate) fn merge_message(
        &self,
        incoming: Value,
        merge: impl FnOnce(Value, Value) -> Value,
    ) -> Result<(), Value> {
        let mut slot = self.message.lock();
        match slot.take() {
            Some(orig) => {
                *slot = Some(merge(orig, incoming));
                Ok(())
            }
            None => Err(incoming),
        }
    }

    pub(crate) fn put_message(
        &self,
        msg: Value,
    ) {
        *self.message.lock() = Some(msg);
    }

    /// Cancel and drop the message.
    pub fn cancel(&self) -> bool {
        self.message.lock().take();
        self.future.cancel()
    }
}

impl Deref for ActorFuture {
    type Target = Future;

    fn deref(&self) -> &Future {
        &self.future
    }
}

impl fmt::Debug for ActorFuture {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ActorFuture")
            .field("actor", &self.actor())
            .field("status", &self.status())
            .finish()
    }
}
