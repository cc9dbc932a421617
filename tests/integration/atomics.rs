//! Atomic cell stress tests

use actorcore::{Actor, ActorPool, AtomicBool, AtomicCell, AtomicInt, AtomicRef, RuntimeError, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_cas_counter_from_actors() {
    const ACTORS: usize = 6;
    const ROUNDS: i64 = 200;

    let pool = ActorPool::make(|cfg| cfg.max_threads = 4).unwrap();
    let counter = Arc::new(AtomicInt::new(0));

    let futures: Vec<_> = (0..ACTORS)
        .map(|_| {
            let counter = counter.clone();
            let actor = Actor::new(&pool, move |_ctx, _msg| {
                for _ in 0..ROUNDS {
                    let Ok(_) = counter.update_and_get(|v| v + 1);
                }
                Ok(Value::Null)
            });
            actor.send(Value::Null).unwrap()
        })
        .collect();
    for f in &futures {
        f.get(Some(Duration::from_secs(10))).unwrap();
    }

    assert_eq!(counter.get(), ACTORS as i64 * ROUNDS);
}

#[test]
fn test_bool_flag_claimed_once() {
    let flag = Arc::new(AtomicBool::new(false));
    let claims: usize = (0..8)
        .map(|_| {
            let flag = flag.clone();
            thread::spawn(move || usize::from(flag.compare_and_set(false, true)))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .sum();

    assert_eq!(claims, 1);
    assert!(flag.get());
}

#[test]
fn test_atomic_ref_rejects_mutable_everywhere() {
    let cell = AtomicRef::new(Value::str("start")).unwrap();
    let mutable = Value::list(vec![Value::Int(1)]);

    let err = cell.set(mutable.clone()).unwrap_err();
    assert!(matches!(err, RuntimeError::NotImmutable(_)));
    assert_eq!(err.kind_name(), "NotImmutableErr");
    assert_eq!(cell.get(), Value::str("start"));

    // freezing first makes it acceptable
    let frozen = actorcore::runtime::value::guard::to_immutable(mutable).unwrap();
    cell.set(frozen.clone()).unwrap();
    assert_eq!(cell.get(), frozen);
}

#[test]
fn test_atomic_ref_shared_across_actors() {
    let pool = ActorPool::make(|cfg| cfg.max_threads = 4).unwrap();
    let latest = Arc::new(AtomicRef::default());

    let futures: Vec<_> = (0..4)
        .map(|i| {
            let latest = latest.clone();
            let actor = Actor::new(&pool, move |_ctx, msg| {
                latest.set(Value::frozen_list(vec![Value::Int(i), msg])?)?;
                Ok(Value::Null)
            });
            actor.send(Value::Int(i)).unwrap()
        })
        .collect();
    for f in &futures {
        f.get(Some(Duration::from_secs(10))).unwrap();
    }

    let last = latest.get();
    let items = last.as_list().unwrap().to_vec();
    assert_eq!(items[0], items[1]);
}
