//! actorcore
//!
//! Actor-based concurrency core for a language runtime: message-passing
//! actors on a bounded worker pool, single-assignment futures, and atomic
//! cells, all enforcing an immutability discipline on values that cross a
//! concurrency boundary.
//!
//! # Example
//!
//! ```
//! use actorcore::{Actor, ActorPool, Value};
//!
//! let pool = ActorPool::make(|cfg| cfg.max_threads = 2).unwrap();
//! let echo = Actor::new(&pool, |_ctx, msg| Ok(msg));
//!
//! let f = echo.send(Value::str("hi")).unwrap();
//! assert_eq!(f.get(None).unwrap(), Value::str("hi"));
//!
//! pool.stop();
//! assert!(pool.join(None));
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::actor::{Actor, ActorId, Coalescing, Locals, Receive};
pub use runtime::atomic::{AtomicBool, AtomicCell, AtomicInt, AtomicRef};
pub use runtime::error::{RuntimeError, RuntimeResult};
pub use runtime::future::{ActorFuture, Future, FutureStatus, Outcome};
pub use runtime::pool::{ActorPool, PoolConfig, PoolPhase, StatsSnapshot};
pub use runtime::value::{FuncValue, Mutability, TypeDecl, Value};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "actorcore";

/// Run a counter workload: `actors` actors each receive `messages`
/// increments, then the pool is stopped and joined.
///
/// Returns the pool statistics after shutdown.
///
/// ```
/// use actorcore::{run_demo, PoolConfig};
///
/// let stats = run_demo(PoolConfig::default(), 2, 10).unwrap();
/// assert_eq!(stats.completed, 20);
/// ```
pub fn run_demo(
    config: PoolConfig,
    actors: usize,
    messages: usize,
) -> Result<StatsSnapshot> {
    let pool = ActorPool::with_config(config).context("Invalid pool configuration")?;
    let total = Arc::new(AtomicInt::new(0));

    let workers: Vec<Actor> = (0..actors)
        .map(|_| {
            let total = total.clone();
            let mut count = 0i64;
            Actor::new(&pool, move |_ctx, msg| {
                let delta = msg
                    .as_int()
                    .ok_or_else(|| RuntimeError::Arg(format!("expected Int, got {}", msg.type_name())))?;
                count += delta;
                total.add(delta);
                Ok(Value::Int(count))
            })
        })
        .collect();

    let mut last = Vec::with_capacity(actors);
    for actor in &workers {
        let mut future = None;
        for _ in 0..messages {
            future = Some(actor.send(Value::Int(1))?);
        }
        last.extend(future);
    }
    debug!(actors, messages, "demo messages sent");

    for future in &last {
        future.get(Some(Duration::from_secs(30)))?;
    }

    pool.stop();
    if !pool.join(Some(Duration::from_secs(30))) {
        anyhow::bail!("pool '{}' did not shut down in time", pool.name());
    }

    let stats = pool.stats().snapshot();
    info!(total = total.get(), %stats, "demo finished");
    Ok(stats)
}
