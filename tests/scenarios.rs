//! End-to-end coverage of the runtime's core guarantees -- ordered dispatch, overflow reporting,
//! deferred delivery, completion chaining, cancellation, serialization, coalescing, and
//! scheduler ordering -- driven entirely through the public API (`concurrent_rt::prelude`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::{Duration, Instant};

use concurrent_rt::prelude::*;

fn pool(name: &str, max_threads: usize) -> Arc<Pool> {
    Pool::new(PoolConfig::new(name).with_max_threads(max_threads)).expect("valid pool config")
}

#[test]
fn echo_actor() {
    let p = pool("echo", 1);
    let echo = Actor::spawn(&p, |msg: Value| Ok(Value::Int(msg.as_int().unwrap() + 1)));

    let f1 = echo.send(1i64).unwrap();
    let f2 = echo.send(2i64).unwrap();
    let f3 = echo.send(3i64).unwrap();

    assert_eq!(f1.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(2));
    assert_eq!(f2.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(3));
    assert_eq!(f3.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(4));
    assert_eq!(echo.receive_count(), 3);
    assert!(echo.queue_peak() <= 3);

    p.stop();
    p.join(Some(Duration::from_secs(5))).unwrap();
}

#[test]
fn overflow_reports_via_future_not_send() {
    let cfg = PoolConfig::new("overflow").with_max_threads(1).with_max_queue(2);
    let p = Pool::new(cfg).unwrap();
    let slow = Actor::spawn(&p, |msg: Value| {
        std::thread::sleep(Duration::from_millis(100));
        Ok(msg)
    });

    let sends: Vec<_> = (0..5i64).map(|i| slow.send(i)).collect();
    // `send` itself never fails with QueueOverflow -- every accept is a successful send().
    assert!(sends.iter().all(|r| r.is_ok()));

    let mut overflow_count = 0;
    for f in sends.into_iter().map(Result::unwrap) {
        if let Err(ConcurrentError::QueueOverflow) = f.get(Some(Duration::from_secs(5))) {
            overflow_count += 1;
        }
    }
    assert_eq!(overflow_count, 3);

    p.stop();
    p.join(Some(Duration::from_secs(5))).unwrap();
}

#[test]
fn deferred_delivery() {
    let p = pool("deferred", 1);
    let actor = Actor::spawn(&p, |msg: Value| Ok(msg));

    let f = actor.send_later(Duration::from_millis(50), Value::str("x")).unwrap();
    assert_eq!(actor.queue_size(), 0);

    let start = Instant::now();
    assert_eq!(f.get(Some(Duration::from_secs(5))).unwrap(), Value::str("x"));
    assert!(start.elapsed() >= Duration::from_millis(45));
    assert_eq!(actor.receive_count(), 1);

    p.stop();
    p.join(Some(Duration::from_secs(5))).unwrap();
}

#[test]
fn when_complete_chaining() {
    let pa = pool("chain-a", 1);
    let pb = pool("chain-b", 1);
    let a = Actor::spawn(&pa, |msg: Value| Ok(Value::Int(10 * msg.as_int().unwrap())));
    let b = Actor::spawn(&pb, |msg: Value| Ok(Value::Int(msg.as_int().unwrap() + 1)));

    let f = a.send(3i64).unwrap();
    let g = b.send_when_complete(&f, 0i64).unwrap();

    assert_eq!(g.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(1));
    // by the time g is observably done, f must already be in its terminal state too
    assert_eq!(f.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(30));

    pa.stop();
    pb.stop();
    pa.join(Some(Duration::from_secs(5))).unwrap();
    pb.join(Some(Duration::from_secs(5))).unwrap();
}

#[test]
fn future_cancellation() {
    let future = Future::pending();

    future.cancel();

    assert!(future.is_done());
    assert!(future.is_cancelled());
    assert!(matches!(future.err().unwrap(), Some(ConcurrentError::Cancelled)));
    assert!(matches!(future.get(Some(Duration::from_secs(1))), Err(ConcurrentError::Cancelled)));
}

#[test]
fn serialization_round_trip() {
    let text = r#"[sys::Str:sys::Int] ["a":1, "b":2]"#;
    let decoded = decode(text).unwrap();

    let Value::Map(entries) = &decoded else { panic!("expected a map, got {decoded:?}") };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], (Value::str("a"), Value::Int(1)));
    assert_eq!(entries[1], (Value::str("b"), Value::Int(2)));

    // and it must round-trip back through the encoder to an equivalent (untyped) literal
    let re_encoded = encode(&decoded, &EncodeOptions::default()).unwrap();
    assert_eq!(decode(&re_encoded).unwrap(), decoded);
}

#[test]
fn coalescing() {
    let p = pool("coalesce", 1);
    let release = Arc::new(Barrier::new(2));
    let release2 = release.clone();
    let first = Arc::new(AtomicU64::new(0));
    let first2 = first.clone();

    let actor = Actor::spawn_coalescing(
        &p,
        move |msg: Value| {
            if first2.fetch_add(1, Ordering::SeqCst) == 0 {
                release2.wait();
            }
            Ok(msg)
        },
        |_| Value::Int(0),
        |old, new| Value::Int(old.as_int().unwrap_or(0) + new.as_int().unwrap_or(0)),
    );

    let blocking = actor.send(Value::Int(0)).unwrap();
    release.wait();

    let f1 = actor.send(1i64).unwrap();
    let f2 = actor.send(2i64).unwrap();
    let f3 = actor.send(3i64).unwrap();
    assert!(Arc::ptr_eq(&f1, &f2));
    assert!(Arc::ptr_eq(&f2, &f3));

    assert_eq!(blocking.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(0));
    assert_eq!(f3.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(6));

    p.stop();
    p.join(Some(Duration::from_secs(5))).unwrap();
}

#[test]
fn scheduler_dispatches_in_deadline_order() {
    let scheduler = Scheduler::new("scheduler-order");
    let order = Arc::new(Mutex::new(Vec::new()));

    struct Record {
        label: u32,
        order: Arc<Mutex<Vec<u32>>>,
    }
    impl ScheduledWork for Record {
        fn work(&self) {
            self.order.lock().unwrap().push(self.label);
        }
        fn cancel(&self) {}
    }

    scheduler.schedule(Duration::from_millis(30), Box::new(Record { label: 30, order: order.clone() }));
    scheduler.schedule(Duration::from_millis(10), Box::new(Record { label: 10, order: order.clone() }));
    scheduler.schedule(Duration::from_millis(20), Box::new(Record { label: 20, order: order.clone() }));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(*order.lock().unwrap(), vec![10, 20, 30]);
}
