//! Actors
//!
//! An [`Actor`] owns a mailbox bound to one [`ActorPool`]. Sends enqueue a
//! message and return an [`ActorFuture`] at once; a pool worker later runs
//! the handler and resolves the future.
//!
//! An actor is in the pool run queue at most once, so at most one of its
//! handlers runs at any instant. Messages to one actor are processed in the
//! order they were enqueued; nothing is ordered across actors.
//!
//! ```
//! use actorcore::{Actor, ActorPool, Value};
//!
//! let pool = ActorPool::new();
//! let mut total = 0;
//! let counter = Actor::new(&pool, move |_ctx, msg| {
//!     total += msg.as_int().unwrap_or(0);
//!     Ok(Value::Int(total))
//! });
//!
//! counter.send(Value::Int(2)).unwrap();
//! let f = counter.send(Value::Int(3)).unwrap();
//! assert_eq!(f.get(None).unwrap(), Value::Int(5));
//! pool.stop();
//! ```

pub mod context;
pub(crate) mod mailbox;

pub use context::{Context, Locals};
pub use mailbox::Coalescing;

use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::runtime::error::{panic_message, RuntimeError, RuntimeResult};
use crate::runtime::future::{ActorFuture, Future, Outcome};
use crate::runtime::pool::{ActorPool, Deferred, Work, WorkerContext};
use crate::runtime::value::{guard, FuncValue, Value};

use mailbox::Mailbox;

/// Process-unique actor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ActorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Actor#{}", self.0)
    }
}

/// Message handler.
///
/// Implemented for every `FnMut(&mut Context<'_>, Value) -> RuntimeResult<Value>`
/// closure. State captured by the handler is private to its actor.
pub trait Receive: Send {
    fn receive(
        &mut self,
        ctx: &mut Context<'_>,
        msg: Value,
    ) -> RuntimeResult<Value>;
}

impl<F> Receive for F
where
    F: FnMut(&mut Context<'_>, Value) -> RuntimeResult<Value> + Send,
{
    fn receive(
        &mut self,
        ctx: &mut Context<'_>,
        msg: Value,
    ) -> RuntimeResult<Value> {
        self(ctx, msg)
    }
}

struct ActorInner {
    id: ActorId,
    pool: ActorPool,
    receiver: Mutex<Box<dyn Receive>>,
    coalescing: Option<Coalescing>,
    mailbox: Mutex<Mailbox>,
}

/// Serialized message processor bound to one pool.
///
/// Cloning yields another handle to the same actor.
#[derive(Clone)]
pub struct Actor {
    inner: Arc<ActorInner>,
}

impl Actor {
    /// Create an actor running `handler` for each message.
    pub fn new<F>(
        pool: &ActorPool,
        handler: F,
    ) -> Self
    where
        F: FnMut(&mut Context<'_>, Value) -> RuntimeResult<Value> + Send + 'static,
    {
        Self::build(pool, Box::new(handler), None)
    }

    /// Create an actor from a [`Receive`] implementation.
    pub fn with_receiver<R>(
        pool: &ActorPool,
        receiver: R,
    ) -> Self
    where
        R: Receive + 'static,
    {
        Self::build(pool, Box::new(receiver), None)
    }

    /// Create an actor that calls `func` with each message as its only
    /// argument.
    ///
    /// The func is frozen first; one with captures that cannot be made
    /// immutable is rejected with `NotImmutable`.
    pub fn from_func(
        pool: &ActorPool,
        func: FuncValue,
    ) -> RuntimeResult<Self> {
        let func = match guard::to_immutable(Value::Func(func))? {
            Value::Func(func) => func,
            other => {
                return Err(RuntimeError::Arg(format!(
                    "expected func, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(Self::new(pool, move |_ctx, msg| func.call(&[msg])))
    }

    /// Create an actor with a coalescing mailbox.
    pub fn coalescing<F>(
        pool: &ActorPool,
        policy: Coalescing,
        handler: F,
    ) -> Self
    where
        F: FnMut(&mut Context<'_>, Value) -> RuntimeResult<Value> + Send + 'static,
    {
        Self::build(pool, Box::new(handler), Some(policy))
    }

    fn build(
        pool: &ActorPool,
        receiver: Box<dyn Receive>,
        coalescing: Option<Coalescing>,
    ) -> Self {
        Self {
            inner: Arc::new(ActorInner {
                id: ActorId::next(),
                pool: pool.clone(),
                receiver: Mutex::new(receiver),
                coalescing,
                mailbox: Mutex::new(Mailbox::new()),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> ActorId {
        self.inner.id
    }

    #[inline]
    pub fn pool(&self) -> &ActorPool {
        &self.inner.pool
    }

    /// Messages waiting in the mailbox
    pub fn queue_len(&self) -> usize {
        self.inner.mailbox.lock().len()
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enqueue `msg` and return its future.
    ///
    /// Fails with `Arg` if the message is neither immutable nor exclusively
    /// owned, and with `PoolStopped` once the pool is stopped. A coalescing
    /// actor may return the future of an already queued message.
    pub fn send(
        &self,
        msg: Value,
    ) -> RuntimeResult<ActorFuture> {
        self.check_send(&msg)?;
        let future = ActorFuture::new(self.inner.id, msg);
        Ok(self.inner.enqueue(future, true))
    }

    /// Enqueue `msg` once `delay` has elapsed.
    ///
    /// Delayed messages become due in deadline order, ties in send order.
    /// Messages not yet due when the pool stops are cancelled.
    pub fn send_later(
        &self,
        delay: Duration,
        msg: Value,
    ) -> RuntimeResult<ActorFuture> {
        self.check_send(&msg)?;
        let future = ActorFuture::new(self.inner.id, msg);
        self.inner.pool.schedule(
            delay,
            Box::new(DelayedSend {
                actor: self.inner.clone(),
                future: future.clone(),
            }),
        )?;
        Ok(future)
    }

    /// Enqueue `msg` once `when` is done, whatever its outcome.
    pub fn send_when_done(
        &self,
        when: &Future,
        msg: Value,
    ) -> RuntimeResult<ActorFuture> {
        self.check_send(&msg)?;
        let future = ActorFuture::new(self.inner.id, msg);
        let actor = self.inner.clone();
        let queued = future.clone();
        when.on_complete(move |_| {
            actor.enqueue(queued, false);
        });
        Ok(future)
    }

    /// Put the calling thread to sleep.
    pub fn sleep(duration: Duration) {
        thread::sleep(duration);
    }

    fn check_send(
        &self,
        msg: &Value,
    ) -> RuntimeResult<()> {
        guard::check_message(msg)
            .and_then(|()| self.inner.pool.check_running())
            .inspect_err(|err| debug!(actor = %self.inner.id, error = %err, "send rejected"))
    }
}

impl fmt::Debug for Actor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.inner.id)
            .field("pool", &self.inner.pool.name())
            .field("queued", &self.queue_len())
            .finish()
    }
}

impl ActorInner {
    /// Add `future` to the mailbox and make sure the actor is submitted.
    ///
    /// Returns the future observers should hold: `future` itself, or the
    /// queued future it was coalesced into.
    fn enqueue(
        self: &Arc<Self>,
        future: ActorFuture,
        coalesce: bool,
    ) -> ActorFuture {
        let key = self
            .coalescing
            .as_ref()
            .and_then(|policy| policy.key_of(&future));
        let submit = {
            let mut mailbox = self.mailbox.lock();
            if let (true, Some(policy), Some(key)) = (coalesce, &self.coalescing, &key) {
                if let Some(queued) = mailbox.coalesce(&future, key, policy) {
                    return queued;
                }
            }
            mailbox.push(future.clone(), key);
            !std::mem::replace(&mut mailbox.submitted, true)
        };
        if submit {
            self.pool.submit(self.clone());
        }
        future
    }

    fn dispatch(
        &self,
        future: ActorFuture,
        worker: &mut WorkerContext,
    ) {
        if future.is_done() {
            return;
        }
        let stats = self.pool.stats();
        if self.pool.is_killed() {
            if future.cancel() {
                stats.record_cancelled();
            }
            return;
        }
        let Some(msg) = future.take_message() else {
            return;
        };

        stats.enter_handler();
        let result = {
            let mut receiver = self.receiver.lock();
            let mut ctx = Context::new(self.id, &self.pool, worker);
            panic::catch_unwind(AssertUnwindSafe(|| receiver.receive(&mut ctx, msg)))
                .unwrap_or_else(|payload| {
                    Err(RuntimeError::Panicked(panic_message(payload.as_ref())))
                })
        };
        stats.exit_handler();

        match result.and_then(guard::make_safe) {
            Ok(value) => {
                stats.record_completed();
                future.resolve(Outcome::Completed(value));
            }
            Err(err) => {
                stats.record_failed();
                warn!(actor = %self.id, error = %err, "message handler failed");
                future.resolve(Outcome::Failed(err));
            }
        }
    }
}

impl Work for ActorInner {
    /// Process up to `max_batch` messages, then give the worker back.
    fn run(
        self: Arc<Self>,
        ctx: &mut WorkerContext,
    ) {
        for _ in 0..self.pool.config().max_batch {
            let Some(future) = self.mailbox.lock().pop() else {
                break;
            };
            self.dispatch(future, ctx);
        }

        let resubmit = {
            let mut mailbox = self.mailbox.lock();
            mailbox.submitted = !mailbox.is_empty();
            mailbox.submitted
        };
        if resubmit {
            self.pool.submit(self.clone());
        }
    }

    fn cancel(self: Arc<Self>) {
        let drained = {
            let mut mailbox = self.mailbox.lock();
            mailbox.submitted = false;
            mailbox.drain()
        };
        let stats = self.pool.stats();
        for future in drained {
            if future.cancel() {
                stats.record_cancelled();
            }
        }
    }
}

struct DelayedSend {
    actor: Arc<ActorInner>,
    future: ActorFuture,
}

impl Deferred for DelayedSend {
    fn fire(self: Box<Self>) {
        if !self.future.is_done() {
            self.actor.enqueue(self.future, false);
        }
    }

    fn cancel(self: Box<Self>) {
        if self.future.cancel() {
            self.actor.pool.stats().record_cancelled();
        }
    }
}

#[cfg(test)]
mod tests;
