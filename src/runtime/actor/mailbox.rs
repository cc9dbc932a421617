//! Actor mailboxes

use hashbrown::HashMap;
use std::collections::VecDeque;
use std::fmt;

use crate::runtime::future::ActorFuture;
use crate::runtime::value::Value;

type KeyFn = dyn Fn(&Value) -> Option<Value> + Send + Sync;
type MergeFn = dyn Fn(Value, Value) -> Value + Send + Sync;

/// Coalescing policy for [`Actor::coalescing`](super::Actor::coalescing).
///
/// A message whose key matches a message still waiting in the mailbox is
/// merged into it instead of being queued. By default the key is the message
/// itself and the merge keeps the incoming message.
pub struct Coalescing {
    to_key: Box<KeyFn>,
    merge: Box<MergeFn>,
}

impl Coalescing {
    pub fn new() -> Self {
        Self {
            to_key: Box::new(|msg| Some(msg.clone())),
            merge: Box::new(|_, incoming| incoming),
        }
    }

    /// Derive the coalescing key. `None` marks a message that never coalesces.
    ///
    /// Runs on the sending thread before the mailbox is locked.
    pub fn key_by<F>(
        mut self,
        to_key: F,
    ) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.to_key = Box::new(to_key);
        self
    }

    /// Combine the queued message with the incoming one.
    ///
    /// Runs while the actor's mailbox is locked, so `merge` must not send to
    /// or query the same actor.
    pub fn merge_with<F>(
        mut self,
        merge: F,
    ) -> Self
    where
        F: Fn(Value, Value) -> Value + Send + Sync + 'static,
    {
        self.merge = Box::new(merge);
        self
    }
}

impl Default for Coalescing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Coalescing {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Coalescing")
    }
}

impl Coalescing {
    /// Key of `future`'s message, if it is still queued and has one.
    pub(crate) fn key_of(
        &self,
        future: &ActorFuture,
    ) -> Option<Value> {
        future.with_message(|msg| (self.to_key)(msg)).flatten()
    }
}

struct Queued {
    future: ActorFuture,
    /// Coalescing key computed when the message was queued.
    key: Option<Value>,
}

/// Message queue of one actor plus its run-queue membership flag.
pub(crate) struct Mailbox {
    queue: VecDeque<Queued>,
    /// Queued futures by coalescing key
    pending: HashMap<Value, ActorFuture>,
    /// The actor sits in the pool run queue or is running.
    pub(crate) submitted: bool,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: HashMap::new(),
            submitted: false,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Merge `incoming` into the queued message with the same `key`.
    ///
    /// Returns the future of the queued message on success; `incoming` is
    /// left untouched otherwise.
    pub(crate) fn coalesce(
        &mut self,
        incoming: &ActorFuture,
        key: &Value,
        policy: &Coalescing,
    ) -> Option<ActorFuture> {
        let orig = self.pending.get(key)?.clone();
        if orig.is_done() {
            return None;
        }

        let msg = incoming.take_message()?;
        match orig.merge_message(msg, |o, i| (policy.merge)(o, i)) {
            Ok(()) => Some(orig),
            Err(msg) => {
                incoming.put_message(msg);
                None
            }
        }
    }

    pub(crate) fn push(
        &mut self,
        future: ActorFuture,
        key: Option<Value>,
    ) {
        if let Some(key) = &key {
            self.pending.insert(key.clone(), future.clone());
        }
        self.queue.push_back(Queued { future, key });
    }

    pub(crate) fn pop(&mut self) -> Option<ActorFuture> {
        let Queued { future, key } = self.queue.pop_front()?;
        if let Some(key) = key {
            let same = self
                .pending
                .get(&key)
                .is_some_and(|queued| queued.ptr_eq(&future));
            if same {
                self.pending.remove(&key);
            }
        }
        Some(future)
    }

    /// Remove every queued message.
    pub(crate) fn drain(&mut self) -> Vec<ActorFuture> {
        self.pending.clear();
        self.queue.drain(..).map(|q| q.future).collect()
    }
}
