//! Actor tests

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::actor::{Actor, ActorId, Coalescing, Context, Locals, Receive};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::future::{Future, FutureStatus};
use crate::runtime::pool::ActorPool;
use crate::runtime::value::{FuncValue, TypeDecl, Value};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn pool(max_threads: usize) -> ActorPool {
    ActorPool::make(|cfg| {
        cfg.name = "actor-test".to_string();
        cfg.max_threads = max_threads;
    })
    .unwrap()
}

/// Handler that blocks on `gate` when it sees the message "block" and logs
/// every message it handles.
fn gated_logger(
    pool: &ActorPool,
    gate: &Future,
    log: &Arc<Mutex<Vec<Value>>>,
) -> Actor {
    let gate = gate.clone();
    let log = log.clone();
    Actor::new(pool, move |_ctx, msg| {
        if msg.as_str() == Some("block") {
            gate.get(WAIT)?;
        }
        log.lock().push(msg.clone());
        Ok(msg)
    })
}

#[test]
fn test_locals() {
    let mut locals = Locals::new();
    assert!(locals.is_empty());

    locals.set("b", Value::Int(2));
    locals.set("a", Value::Int(1));
    assert_eq!(locals.set("b", Value::Int(3)), Some(Value::Int(2)));
    assert_eq!(locals.keys().collect::<Vec<_>>(), vec!["b", "a"]);

    *locals.get_or_insert_with("c", || Value::Int(0)) = Value::Int(9);
    assert_eq!(locals.get("c"), Some(&Value::Int(9)));

    assert_eq!(locals.remove("b"), Some(Value::Int(3)));
    assert!(!locals.contains("b"));
    assert_eq!(locals.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(locals.len(), 2);

    // mutable values are fine in locals
    locals.set("buf", Value::list(vec![]));
    locals.clear();
    assert!(locals.is_empty());
}

#[test]
fn test_actor_ids_are_unique() {
    let pool = pool(1);
    let a = Actor::new(&pool, |_, m| Ok(m));
    let b = Actor::new(&pool, |_, m| Ok(m));

    assert_ne!(a.id(), b.id());
    assert!(a.id().as_u64() >= 1);
    assert!(a.ptr_eq(&a.clone()));
    assert_eq!(a.id().to_string(), format!("Actor#{}", a.id().as_u64()));
}

#[test]
fn test_send_and_get() {
    let pool = pool(2);
    let double = Actor::new(&pool, |_, msg| {
        let n = msg.as_int().ok_or_else(|| RuntimeError::raised("not an int"))?;
        Ok(Value::Int(n * 2))
    });

    let f = double.send(Value::Int(21)).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::Int(42));
    assert_eq!(f.actor(), double.id());
    assert_eq!(f.status(), FutureStatus::Completed);

    pool.stop();
    assert!(pool.join(WAIT));
}

#[test]
fn test_handler_state_is_serialized() {
    let pool = pool(4);
    let mut seen = Vec::new();
    let actor = Actor::new(&pool, move |_, msg| {
        seen.push(msg);
        Ok(Value::Int(seen.len() as i64))
    });

    let futures: Vec<_> = (0..50).map(|i| actor.send(Value::Int(i)).unwrap()).collect();
    for (i, f) in futures.iter().enumerate() {
        assert_eq!(f.get(WAIT).unwrap(), Value::Int(i as i64 + 1));
    }
}

#[test]
fn test_handler_error_fails_only_that_message() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| match msg.as_int() {
        Some(0) => Err(RuntimeError::raised("zero")),
        _ => Ok(msg),
    });

    let bad = actor.send(Value::Int(0)).unwrap();
    let good = actor.send(Value::Int(1)).unwrap();

    assert_eq!(bad.get(WAIT).unwrap_err(), RuntimeError::raised("zero"));
    assert_eq!(good.get(WAIT).unwrap(), Value::Int(1));
    assert_eq!(pool.stats().snapshot().failed, 1);
}

#[test]
fn test_handler_panic_fails_message() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| {
        if msg.is_null() {
            panic!("null message");
        }
        Ok(msg)
    });

    let bad = actor.send(Value::Null).unwrap();
    let good = actor.send(Value::Int(5)).unwrap();

    match bad.get(WAIT) {
        Err(RuntimeError::Panicked(msg)) => assert!(msg.contains("null message")),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(good.get(WAIT).unwrap(), Value::Int(5));
}

#[test]
fn test_results_are_frozen() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| Ok(Value::list(vec![msg])));

    let result = actor.send(Value::Int(1)).unwrap().get(WAIT).unwrap();
    assert!(result.is_immutable());
    assert!(matches!(
        result.as_list().unwrap().push(Value::Int(2)),
        Err(RuntimeError::ReadOnly(_))
    ));
}

#[test]
fn test_unconvertible_result_fails() {
    let pool = pool(1);
    let ty = TypeDecl::mutable("Handle");
    let actor = Actor::new(&pool, move |_, _| Value::object(ty.clone(), vec![]));

    let err = actor.send(Value::Null).unwrap().get(WAIT).unwrap_err();
    assert!(matches!(err, RuntimeError::NotImmutable(_)));
}

#[test]
fn test_send_guards_messages() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| {
        // exclusively owned payloads may be mutated by the receiver
        if let Some(list) = msg.as_list() {
            list.push(Value::Int(0))?;
            return Ok(Value::Int(list.len() as i64));
        }
        Ok(msg)
    });

    let shared = Value::list(vec![]);
    let err = actor.send(shared.clone()).unwrap_err();
    assert!(matches!(err, RuntimeError::Arg(_)));

    let owned = Value::list(vec![Value::Int(1)]);
    let f = actor.send(owned).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::Int(2));

    let frozen = Value::frozen_list(vec![]).unwrap();
    assert!(actor.send(frozen).is_ok());
}

#[test]
fn test_from_func() {
    let pool = pool(1);
    let suffix = Value::list(vec![Value::str("!")]);
    let func = FuncValue::with_captures(vec![suffix], |captures, args| {
        let tail = captures[0]
            .as_list()
            .and_then(|l| l.get(0))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let head = args[0].as_str().unwrap_or_default();
        Ok(Value::from(format!("{}{}", head, tail)))
    });

    let actor = Actor::from_func(&pool, func).unwrap();
    let f = actor.send(Value::str("hi")).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::str("hi!"));
}

#[test]
fn test_from_func_rejects_unfreezable_capture() {
    let pool = pool(1);
    let handle = Value::object(TypeDecl::mutable("Conn"), vec![]).unwrap();
    let func = FuncValue::with_captures(vec![handle], |_, _| Ok(Value::Null));

    let err = Actor::from_func(&pool, func).unwrap_err();
    assert!(matches!(err, RuntimeError::NotImmutable(_)));
}

struct Summer {
    total: i64,
}

impl Receive for Summer {
    fn receive(
        &mut self,
        _ctx: &mut Context<'_>,
        msg: Value,
    ) -> RuntimeResult<Value> {
        self.total += msg.as_int().unwrap_or(0);
        Ok(Value::Int(self.total))
    }
}

#[test]
fn test_with_receiver() {
    let pool = pool(1);
    let actor = Actor::with_receiver(&pool, Summer { total: 0 });
    actor.send(Value::Int(3)).unwrap();
    let f = actor.send(Value::Int(4)).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::Int(7));
}

fn count_hits(
    ctx: &mut Context<'_>,
    _msg: Value,
) -> RuntimeResult<Value> {
    let hits = ctx.locals_mut().get_or_insert_with("hits", || Value::Int(0));
    let next = hits.as_int().unwrap_or(0) + 1;
    *hits = Value::Int(next);
    Ok(Value::list(vec![
        Value::Int(next),
        Value::from(ctx.worker_name()),
        Value::Int(ctx.actor_id().as_u64() as i64),
    ]))
}

#[test]
fn test_context_exposes_worker_and_locals() {
    let pool = pool(1);
    let a = Actor::new(&pool, count_hits);
    let b = Actor::new(&pool, count_hits);

    let ra = a.send(Value::Null).unwrap().get(WAIT).unwrap().as_list().unwrap().to_vec();
    let rb = b.send(Value::Null).unwrap().get(WAIT).unwrap().as_list().unwrap().to_vec();

    // one worker: both actors see the same locals
    assert_eq!(ra[0], Value::Int(1));
    assert_eq!(rb[0], Value::Int(2));
    assert_eq!(ra[1], rb[1]);
    assert!(ra[1].as_str().unwrap().starts_with("actor-test-worker-"));
    assert_eq!(ra[2], Value::Int(a.id().as_u64() as i64));
}

#[test]
fn test_turns_yield_after_max_batch() {
    let pool = ActorPool::make(|cfg| {
        cfg.max_threads = 1;
        cfg.max_batch = 2;
    })
    .unwrap();
    let gate = Future::completable();
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = gated_logger(&pool, &gate, &log);
    let b = gated_logger(&pool, &gate, &log);

    a.send(Value::str("block")).unwrap();
    for i in 0..3 {
        a.send(Value::from(format!("a{}", i))).unwrap();
    }
    let mut last = None;
    for i in 0..3 {
        last = Some(b.send(Value::from(format!("b{}", i))).unwrap());
    }
    gate.complete(Value::Null);
    last.unwrap().get(WAIT).unwrap();

    let order: Vec<String> = log
        .lock()
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(order[..4], ["block", "a0", "b0", "b1"]);
}

#[test]
fn test_queued_message_can_be_cancelled() {
    let pool = pool(1);
    let gate = Future::completable();
    let log = Arc::new(Mutex::new(Vec::new()));
    let actor = gated_logger(&pool, &gate, &log);

    let first = actor.send(Value::str("block")).unwrap();
    let second = actor.send(Value::str("second")).unwrap();
    let third = actor.send(Value::str("third")).unwrap();

    assert!(second.cancel());
    gate.complete(Value::Null);

    assert_eq!(third.get(WAIT).unwrap(), Value::str("third"));
    assert_eq!(first.get(WAIT).unwrap(), Value::str("block"));
    assert_eq!(second.get(WAIT).unwrap_err(), RuntimeError::Cancelled);
    assert_eq!(*log.lock(), vec![Value::str("block"), Value::str("third")]);
}

#[test]
fn test_queue_len() {
    let pool = pool(1);
    let gate = Future::completable();
    let log = Arc::new(Mutex::new(Vec::new()));
    let actor = gated_logger(&pool, &gate, &log);

    actor.send(Value::str("block")).unwrap();
    actor.send(Value::Int(1)).unwrap();
    let last = actor.send(Value::Int(2)).unwrap();
    assert!(actor.queue_len() >= 2);

    gate.complete(Value::Null);
    last.get(WAIT).unwrap();
    assert_eq!(actor.queue_len(), 0);
}

#[test]
fn test_coalescing_replaces_by_default() {
    let pool = pool(1);
    let gate = Future::completable();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (g, l) = (gate.clone(), log.clone());
    let actor = Actor::coalescing(&pool, Coalescing::new(), move |_, msg| {
        if msg.as_str() == Some("block") {
            g.get(WAIT)?;
        }
        l.lock().push(msg.clone());
        Ok(msg)
    });

    actor.send(Value::str("block")).unwrap();
    let x1 = actor.send(Value::str("x")).unwrap();
    let x2 = actor.send(Value::str("x")).unwrap();
    let y = actor.send(Value::str("y")).unwrap();

    assert!(x1.ptr_eq(&x2));
    assert!(!x1.ptr_eq(&y));

    gate.complete(Value::Null);
    y.get(WAIT).unwrap();
    assert_eq!(
        *log.lock(),
        vec![Value::str("block"), Value::str("x"), Value::str("y")]
    );
}

#[test]
fn test_coalescing_merges_with_policy() {
    let pool = pool(1);
    let gate = Future::completable();
    let g = gate.clone();
    let policy = Coalescing::new()
        .key_by(|msg| msg.as_int().map(|_| Value::str("sum")))
        .merge_with(|a, b| Value::Int(a.as_int().unwrap_or(0) + b.as_int().unwrap_or(0)));
    let actor = Actor::coalescing(&pool, policy, move |_, msg| {
        if msg.as_str() == Some("block") {
            g.get(WAIT)?;
        }
        Ok(msg)
    });

    actor.send(Value::str("block")).unwrap();
    let futures: Vec<_> = (1..=4).map(|i| actor.send(Value::Int(i)).unwrap()).collect();
    assert!(futures.iter().all(|f| f.ptr_eq(&futures[0])));

    gate.complete(Value::Null);
    assert_eq!(futures[0].get(WAIT).unwrap(), Value::Int(10));

    // the key is free again once the merged message was taken
    let next = actor.send(Value::Int(5)).unwrap();
    assert!(!next.ptr_eq(&futures[0]));
    assert_eq!(next.get(WAIT).unwrap(), Value::Int(5));
}

#[test]
fn test_coalescing_skips_cancelled_message() {
    let pool = pool(1);
    let gate = Future::completable();
    let g = gate.clone();
    let actor = Actor::coalescing(&pool, Coalescing::new(), move |_, msg| {
        if msg.as_str() == Some("block") {
            g.get(WAIT)?;
        }
        Ok(msg)
    });

    actor.send(Value::str("block")).unwrap();
    let first = actor.send(Value::str("x")).unwrap();
    assert!(first.cancel());

    let second = actor.send(Value::str("x")).unwrap();
    assert!(!second.ptr_eq(&first));

    gate.complete(Value::Null);
    assert_eq!(second.get(WAIT).unwrap(), Value::str("x"));
    assert!(first.is_cancelled());
}

#[test]
fn test_send_later_orders_by_deadline() {
    let pool = pool(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    let actor = Actor::new(&pool, move |_, msg| {
        l.lock().push(msg.clone());
        Ok(msg)
    });

    let late = actor.send_later(Duration::from_millis(80), Value::str("late")).unwrap();
    let early = actor.send_later(Duration::from_millis(30), Value::str("early")).unwrap();
    let now = actor.send(Value::str("now")).unwrap();
    assert!(!late.is_done());

    now.get(WAIT).unwrap();
    early.get(WAIT).unwrap();
    late.get(WAIT).unwrap();
    assert_eq!(
        *log.lock(),
        vec![Value::str("now"), Value::str("early"), Value::str("late")]
    );
}

#[test]
fn test_stop_cancels_delayed_messages() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| Ok(msg));

    let later = actor.send_later(Duration::from_secs(60), Value::Int(1)).unwrap();
    pool.stop();

    assert_eq!(later.get(WAIT).unwrap_err(), RuntimeError::Cancelled);
    assert!(matches!(
        actor.send_later(Duration::ZERO, Value::Int(2)),
        Err(RuntimeError::PoolStopped(_))
    ));
}

#[test]
fn test_send_when_done_waits_for_future() {
    let pool = pool(2);
    let actor = Actor::new(&pool, |_, msg| Ok(msg));
    let trigger = Future::completable();

    let f = actor.send_when_done(&trigger, Value::str("after")).unwrap();
    assert!(f.get(Some(Duration::from_millis(50))).is_err());
    assert_eq!(actor.queue_len(), 0);

    trigger.fail(RuntimeError::raised("upstream failed"));
    assert_eq!(f.get(WAIT).unwrap(), Value::str("after"));
}

#[test]
fn test_send_when_done_on_finished_future() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| Ok(msg));
    let trigger = Future::completable();
    trigger.cancel();

    let f = actor.send_when_done(&trigger, Value::Int(3)).unwrap();
    assert_eq!(f.get(WAIT).unwrap(), Value::Int(3));
}

#[test]
fn test_kill_cancels_queued_messages() {
    let pool = pool(1);
    let gate = Future::completable();
    let log = Arc::new(Mutex::new(Vec::new()));
    let actor = gated_logger(&pool, &gate, &log);

    let running = actor.send(Value::str("block")).unwrap();
    let queued: Vec<_> = (0..3).map(|i| actor.send(Value::Int(i)).unwrap()).collect();

    // let the worker pick up the blocking message first
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while actor.queue_len() == 4 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    pool.kill();
    gate.complete(Value::Null);

    assert_eq!(running.get(WAIT).unwrap(), Value::str("block"));
    for f in &queued {
        assert_eq!(f.get(WAIT).unwrap_err(), RuntimeError::Cancelled);
    }
    assert!(pool.join(WAIT));
    assert_eq!(pool.stats().snapshot().cancelled, 3);
}

#[test]
fn test_sleep() {
    let start = std::time::Instant::now();
    Actor::sleep(Duration::from_millis(10));
    assert!(start.elapsed() >= Duration::from_millis(10));
}

#[test]
fn test_send_later_with_unrepresentable_delay() {
    let pool = pool(1);
    let actor = Actor::new(&pool, |_, msg| Ok(msg));

    let f = actor.send_later(Duration::MAX, Value::Int(1)).unwrap();
    assert!(!f.is_done());
    assert_eq!(pool.scheduled_count(), 1);

    pool.stop();
    assert!(matches!(f.get(WAIT), Err(RuntimeError::Cancelled)));
}

#[test]
fn test_cancel_while_handler_runs() {
    let pool = pool(1);
    let started = Future::completable();
    let gate = Future::completable();
    let (s, g) = (started.clone(), gate.clone());
    let actor = Actor::new(&pool, move |_, msg| {
        if msg.as_str() == Some("block") {
            s.complete(Value::Null);
            g.get(WAIT)?;
        }
        Ok(msg)
    });

    let running = actor.send(Value::str("block")).unwrap();
    let observer = running.clone().into_future();
    started.get(WAIT).unwrap();

    assert!(running.cancel());
    gate.complete(Value::Null);

    assert!(matches!(running.get(WAIT), Err(RuntimeError::Cancelled)));
    assert_eq!(observer.status(), FutureStatus::Cancelled);

    // the actor keeps going and the discarded run still counts
    let next = actor.send(Value::Int(2)).unwrap();
    assert_eq!(next.get(WAIT).unwrap(), Value::Int(2));
    assert_eq!(observer.status(), FutureStatus::Cancelled);
    assert_eq!(pool.stats().snapshot().completed, 2);
}

#[test]
fn test_coalescing_key_may_query_same_actor() {
    let pool = pool(1);
    let gate = Future::completable();
    let g = gate.clone();
    let this: Arc<Mutex<Option<Actor>>> = Arc::new(Mutex::new(None));
    let seen = this.clone();
    let policy = Coalescing::new().key_by(move |msg| {
        if let Some(actor) = seen.lock().as_ref() {
            let _ = actor.queue_len();
        }
        Some(msg.clone())
    });
    let actor = Actor::coalescing(&pool, policy, move |_, msg| {
        if msg.as_str() == Some("block") {
            g.get(WAIT)?;
        }
        Ok(msg)
    });
    *this.lock() = Some(actor.clone());

    actor.send(Value::str("block")).unwrap();
    let first = actor.send(Value::str("x")).unwrap();
    let second = actor.send(Value::str("x")).unwrap();
    assert!(second.ptr_eq(&first));

    gate.complete(Value::Null);
    assert_eq!(first.get(WAIT).unwrap(), Value::str("x"));
    this.lock().take();
}
