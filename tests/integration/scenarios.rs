//! End-to-end scenarios over the public API

use actorcore::{Actor, ActorPool, AtomicInt, FutureStatus, RuntimeError, Value};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn increment_actor(
    pool: &ActorPool,
    cell: &Arc<AtomicInt>,
) -> Actor {
    let cell = cell.clone();
    Actor::new(pool, move |_ctx, _msg| Ok(Value::Int(cell.increment_and_get())))
}

#[test]
fn test_single_thread_pool_serves_two_actors() {
    let pool = ActorPool::make(|cfg| cfg.max_threads = 1).unwrap();
    let cell_a = Arc::new(AtomicInt::new(0));
    let cell_b = Arc::new(AtomicInt::new(0));
    let a = increment_actor(&pool, &cell_a);
    let b = increment_actor(&pool, &cell_b);

    let mut futures = Vec::new();
    for _ in 0..100 {
        futures.push(a.send(Value::Null).unwrap());
        futures.push(b.send(Value::Null).unwrap());
    }
    for f in &futures {
        f.get(WAIT).unwrap();
    }

    assert_eq!(cell_a.get(), 100);
    assert_eq!(cell_b.get(), 100);
    assert_eq!(pool.stats().snapshot().workers_spawned, 1);

    pool.stop();
    assert!(pool.join(WAIT));
}

#[test]
fn test_cancel_after_completion_is_ignored() {
    let pool = ActorPool::new();
    let actor = Actor::new(&pool, |_ctx, msg| Ok(msg));

    let f = actor.send(Value::str("kept")).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::str("kept"));

    assert!(!f.cancel());
    assert_eq!(f.status(), FutureStatus::Completed);
    assert_eq!(f.get(WAIT).unwrap(), Value::str("kept"));
}

#[test]
fn test_stop_rejects_new_sends_but_finishes_queued() {
    let pool = ActorPool::make(|cfg| cfg.max_threads = 1).unwrap();
    let actor = Actor::new(&pool, |_ctx, msg| {
        Actor::sleep(Duration::from_millis(20));
        Ok(msg)
    });

    let before = actor.send(Value::Int(1)).unwrap();
    pool.stop();

    let err = actor.send(Value::Int(2)).unwrap_err();
    assert!(matches!(err, RuntimeError::PoolStopped(_)));
    assert_eq!(err.kind_name(), "PoolStoppedErr");

    assert_eq!(before.get(WAIT).unwrap(), Value::Int(1));
    assert!(pool.join(WAIT));
    assert!(pool.is_done());
}

#[test]
fn test_pipeline_between_actors() {
    let pool = ActorPool::make(|cfg| cfg.max_threads = 3).unwrap();
    let square = Actor::new(&pool, |_ctx, msg| {
        let n = msg.as_int().unwrap_or(0);
        Ok(Value::Int(n * n))
    });

    let downstream = square.clone();
    let fan_out = Actor::new(&pool, move |_ctx, msg| {
        let n = msg.as_int().unwrap_or(0);
        let futures = (1..=n)
            .map(|i| downstream.send(Value::Int(i)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut sum = 0;
        for f in futures {
            sum += f.get(WAIT)?.as_int().unwrap_or(0);
        }
        Ok(Value::Int(sum))
    });

    let f = fan_out.send(Value::Int(10)).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::Int(385));
}

#[test]
fn test_demo_workload() {
    let stats = actorcore::run_demo(actorcore::PoolConfig::default(), 3, 50).unwrap();
    assert_eq!(stats.completed, 150);
    assert_eq!(stats.failed, 0);
}
