//! Handler execution context
//!
//! Every handler invocation receives a [`Context`] borrowing the state of the
//! worker running it. [`Locals`] live on the worker, not the actor: two
//! actors served by the same worker see the same locals, and one actor served
//! by two workers over its life sees two different maps.

use indexmap::IndexMap;

use crate::runtime::pool::{ActorPool, WorkerContext};
use crate::runtime::value::Value;

use super::ActorId;

/// Per-worker key/value store, in insertion order.
///
/// Stored values need not be immutable; they never leave the worker.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    map: IndexMap<String, Value>,
}

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.map.get(key)
    }

    #[inline]
    pub fn get_mut(
        &mut self,
        key: &str,
    ) -> Option<&mut Value> {
        self.map.get_mut(key)
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Option<Value> {
        self.map.insert(key.into(), value)
    }

    /// Get the value under `key`, inserting `init()` first if absent.
    pub fn get_or_insert_with(
        &mut self,
        key: &str,
        init: impl FnOnce() -> Value,
    ) -> &mut Value {
        self.map.entry(key.to_string()).or_insert_with(init)
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.map.shift_remove(key)
    }

    #[inline]
    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.map.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Context handed to a message handler.
pub struct Context<'a> {
    actor: ActorId,
    pool: &'a ActorPool,
    worker: &'a mut WorkerContext,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        actor: ActorId,
        pool: &'a ActorPool,
        worker: &'a mut WorkerContext,
    ) -> Self {
        Self {
            actor,
            pool,
            worker,
        }
    }

    /// Actor whose message is being handled
    #[inline]
    pub fn actor_id(&self) -> ActorId {
        self.actor
    }

    #[inline]
    pub fn pool(&self) -> &ActorPool {
        self.pool
    }

    /// Name of the worker thread running the handler
    #[inline]
    pub fn worker_name(&self) -> &str {
        self.worker.name()
    }

    #[inline]
    pub fn locals(&self) -> &Locals {
        self.worker.locals()
    }

    #[inline]
    pub fn locals_mut(&mut self) -> &mut Locals {
        self.worker.locals_mut()
    }
}
