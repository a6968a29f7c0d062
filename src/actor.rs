/*
 * Copyright (c) 2024, United States Government, as represented by the
 * Administrator of the National Aeronautics and Space Administration.
 * All rights reserved.
 *
 * The ODIN - Open Data Integration Framework is licensed under the
 * Apache License, Version 2.0 (the "License"); you may not use this file
 * except in compliance with the License. You may obtain a copy of the
 * License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Per-actor FIFO mailbox, optionally coalescing, matching `Actor.py`.
//!
//! One `Mutex` guards everything owned by the actor: the queue, its peak, the coalescing index
//! (kept in lock-step with the queue), the run-state, and the current-message slot. That single
//! lock is what makes per-actor FIFO order and single-flight dispatch fall out of the
//! implementation almost for free: only one thread ever holds it while transitioning
//! `Idle -> Pending -> Running -> ...`, so only one worker ever runs a given actor's batch at a
//! time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::concurrent_map::ConcurrentMap;
use crate::error;
use crate::errors::{ConcurrentError, Result};
use crate::future::{Future, WhenDoneTarget};
use crate::pool::{DeferredDelivery, Pool, PoolWork};
use crate::value::{ToImmutable, Value};

/// What an actor's mailbox hands off to on each dispatch. Implemented for any
/// `Fn(Value) -> Result<Value>`, so most callers just pass a closure to [`Actor::spawn`].
pub trait Receive: Send + Sync {
    fn receive(&self, msg: Value) -> Result<Value>;
}

impl<F: Fn(Value) -> Result<Value> + Send + Sync> Receive for F {
    fn receive(&self, msg: Value) -> Result<Value> {
        self(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Nothing queued, not submitted to the pool.
    Idle,
    /// Queued in the pool's job queue, waiting for a worker thread to pick up the batch.
    Pending,
    /// A worker thread is actively draining this actor's mailbox right now.
    Running,
}

struct CoalescingState {
    to_key: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    coalesce: Arc<dyn Fn(Value, Value) -> Value + Send + Sync>,
    /// key -> pending future, kept in lock-step with `order`. Linear scan, same tradeoff as
    /// `ConcurrentMap`: actor mailboxes are small relative to the cost of requiring `Value: Eq
    /// + Hash` everywhere (`f64`'s `NaN` makes that awkward) so a `Vec` is the pragmatic choice.
    index: Vec<(Value, Arc<Future>)>,
}

struct MailboxState {
    order: VecDeque<Arc<Future>>,
    peak: usize,
    coalescing: Option<CoalescingState>,
    run_state: ThreadState,
    current_message: Option<Value>,
}

impl MailboxState {
    fn queue_size(&self) -> usize {
        self.order.len()
    }
}

pub struct Actor {
    weak_self: Weak<Actor>,
    pool: Arc<Pool>,
    receive: Arc<dyn Receive>,
    state: Mutex<MailboxState>,
    locals: Arc<ConcurrentMap>,
    receive_count: Mutex<u64>,
    receive_ticks_ns: Mutex<u64>,
}

thread_local! {
    static CURRENT_LOCALS: RefCell<Option<Arc<ConcurrentMap>>> = const { RefCell::new(None) };
}

/// The current worker thread's actor-locals map, bound to a thread-local for the duration of a
/// batch. `None` outside of an actor's work loop.
pub fn current_actor_locals() -> Option<Arc<ConcurrentMap>> {
    CURRENT_LOCALS.with(|cell| cell.borrow().clone())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Actor {
    /// Spawns a plain (non-coalescing) actor on `pool`.
    pub fn spawn(pool: &Arc<Pool>, receive: impl Receive + 'static) -> Arc<Actor> {
        Self::build(pool, receive, None)
    }

    /// Spawns a coalescing actor: while a pending message with key `to_key(msg)` is already
    /// queued, subsequent sends with the same key replace the payload with
    /// `coalesce(old, new)` instead of enqueueing a new entry.
    pub fn spawn_coalescing(
        pool: &Arc<Pool>,
        receive: impl Receive + 'static,
        to_key: impl Fn(&Value) -> Value + Send + Sync + 'static,
        coalesce: impl Fn(Value, Value) -> Value + Send + Sync + 'static,
    ) -> Arc<Actor> {
        Self::build(
            pool,
            receive,
            Some(CoalescingState { to_key: Arc::new(to_key), coalesce: Arc::new(coalesce), index: Vec::new() }),
        )
    }

    fn build(pool: &Arc<Pool>, receive: impl Receive + 'static, coalescing: Option<CoalescingState>) -> Arc<Actor> {
        Arc::new_cyclic(|weak| Actor {
            weak_self: weak.clone(),
            pool: pool.clone(),
            receive: Arc::new(receive),
            state: Mutex::new(MailboxState {
                order: VecDeque::new(),
                peak: 0,
                coalescing,
                run_state: ThreadState::Idle,
                current_message: None,
            }),
            locals: Arc::new(ConcurrentMap::new()),
            receive_count: Mutex::new(0),
            receive_ticks_ns: Mutex::new(0),
        })
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn locals(&self) -> &Arc<ConcurrentMap> {
        &self.locals
    }

    fn arc_self(&self) -> Arc<Actor> {
        self.weak_self.upgrade().expect("actor dropped while still in use")
    }

    /// Coerces `msg` to immutable, enqueues it (coalescing + max-queue check both enabled), and
    /// returns the future -- which may be an *existing* future if coalescing merged this send
    /// into one already pending.
    pub fn send(&self, msg: impl ToImmutable) -> Result<Arc<Future>> {
        self.guard_accepting()?;
        let value = msg.to_immutable()?;
        let future = Future::pending_with_msg(Some(value));
        Ok(self.enqueue(future, true, true))
    }

    /// Schedules `msg` for delivery no earlier than `delay` from now, via the pool's scheduler.
    /// Max-queue is not checked at scheduling time and coalescing is not applied. Per the
    /// resolved open question (DESIGN.md), this always goes through the scheduler even if
    /// `delay` is zero or negative.
    pub fn send_later(&self, delay: Duration, msg: impl ToImmutable) -> Result<Arc<Future>> {
        self.guard_accepting()?;
        let value = msg.to_immutable()?;
        let future = Future::pending_with_msg(Some(value));
        let target: Arc<dyn DeferredDelivery> = self.arc_self();
        self.pool.schedule(target, delay, future.clone());
        Ok(future)
    }

    /// Registers a when-done continuation on `observed`: once it reaches a terminal state,
    /// `msg` is enqueued here (coalescing disabled, max-queue checked).
    pub fn send_when_complete(&self, observed: &Arc<Future>, msg: impl ToImmutable) -> Result<Arc<Future>> {
        self.guard_accepting()?;
        let value = msg.to_immutable()?;
        let future = Future::pending_with_msg(Some(value));
        let target: Arc<dyn WhenDoneTarget> = self.arc_self();
        observed.send_when_done(target, future.clone());
        Ok(future)
    }

    fn guard_accepting(&self) -> Result<()> {
        if self.pool.is_stopped() {
            Err(ConcurrentError::PoolStopped)
        } else {
            Ok(())
        }
    }

    pub fn thread_state(&self) -> ThreadState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).run_state
    }

    pub fn is_queue_full(&self) -> bool {
        self.queue_size() >= self.pool.max_queue()
    }

    pub fn queue_size(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queue_size()
    }

    pub fn queue_peak(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).peak
    }

    pub fn receive_count(&self) -> u64 {
        *self.receive_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn receive_ticks(&self) -> Duration {
        Duration::from_nanos(*self.receive_ticks_ns.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn sleep(d: Duration) {
        std::thread::sleep(d);
    }

    /// Swaps the queue out for an empty one under the lock, then cancels every future that was
    /// in it, outside the lock.
    pub fn kill(&self) {
        let drained = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = state.coalescing.as_mut() {
                c.index.clear();
            }
            std::mem::take(&mut state.order)
        };
        for future in drained {
            future.cancel();
        }
    }

    /// Shared enqueue path for `send`/`send_later`/`send_when_complete`: under the actor's
    /// mutex, optionally coalesce, optionally overflow-check, then append and submit if idle.
    fn enqueue(&self, future: Arc<Future>, coalesce: bool, check_max_queue: bool) -> Arc<Future> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if coalesce {
            if let Some(c) = state.coalescing.as_mut() {
                let key = (c.to_key)(&future.msg().expect("send() always sets a msg"));
                if let Some((_, existing)) = c.index.iter().find(|(k, _)| *k == key) {
                    let old_msg = existing.msg().unwrap_or(Value::Null);
                    let new_msg = future.msg().unwrap_or(Value::Null);
                    existing.set_msg((c.coalesce)(old_msg, new_msg));
                    return existing.clone();
                }
                c.index.push((key, future.clone()));
            }
        }

        if check_max_queue && state.queue_size() + 1 > self.pool.max_queue() {
            // A brand-new future never has when-done continuations registered yet, so
            // completing it here cannot re-enter another actor's mutex while we hold ours.
            let _ = future.complete_err(ConcurrentError::QueueOverflow);
            if let Some(c) = state.coalescing.as_mut() {
                c.index.retain(|(_, f)| !Arc::ptr_eq(f, &future));
            }
            return future;
        }

        state.order.push_back(future.clone());
        state.peak = state.peak.max(state.queue_size());

        if state.run_state == ThreadState::Idle {
            state.run_state = ThreadState::Pending;
            drop(state);
            self.pool.submit(self.arc_self());
        }

        future
    }

    fn dispatch(&self, future: Arc<Future>) {
        if future.is_cancelled() {
            return;
        }
        if self.pool.is_killed() {
            future.cancel();
            return;
        }
        {
            let mut count = self.receive_count.lock().unwrap_or_else(|e| e.into_inner());
            *count += 1;
        }
        let msg = future.msg().unwrap_or(Value::Null);
        let receive = &self.receive;
        // A panicking receiver must not take the whole worker thread (and every other actor
        // queued behind it) down with it -- caught broadly at this dispatch boundary and turned
        // into an error result for this one message, same as a returned `Err`.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| receive.receive(msg)));
        match outcome {
            Ok(Ok(result)) => {
                let _ = future.complete(result);
            }
            Ok(Err(err)) => {
                let _ = future.complete_err(err);
            }
            Err(payload) => {
                let msg = panic_message(&payload);
                error!("actor receive panicked: {}", msg);
                let _ = future.complete_err(ConcurrentError::Other(msg));
            }
        }
    }
}

impl PoolWork for Actor {
    fn run_batch(self: Arc<Self>) {
        CURRENT_LOCALS.with(|cell| *cell.borrow_mut() = Some(self.locals.clone()));
        let start = Instant::now();
        let max_batch = self.pool.max_time_before_yield();

        loop {
            let next = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.run_state != ThreadState::Running {
                    state.run_state = ThreadState::Running;
                }
                let popped = state.order.pop_front();
                if let Some(f) = &popped {
                    if let Some(c) = state.coalescing.as_mut() {
                        c.index.retain(|(_, existing)| !Arc::ptr_eq(existing, f));
                    }
                    state.current_message = f.msg();
                }
                popped
            };
            let future = match next {
                Some(f) => f,
                None => break,
            };

            self.dispatch(future);

            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.current_message = None;
            }

            if self.pool.has_pending() && start.elapsed() >= max_batch {
                break;
            }
        }

        {
            let mut ticks = self.receive_ticks_ns.lock().unwrap_or_else(|e| e.into_inner());
            *ticks += start.elapsed().as_nanos() as u64;
        }

        CURRENT_LOCALS.with(|cell| *cell.borrow_mut() = None);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.order.is_empty() {
            state.run_state = ThreadState::Idle;
        } else {
            state.run_state = ThreadState::Pending;
            drop(state);
            self.pool.submit(self.clone());
        }
    }
}

impl DeferredDelivery for Actor {
    /// `_enqueue_later`: coalescing disabled, max-queue not checked.
    fn enqueue_later(self: Arc<Self>, future: Arc<Future>) {
        self.enqueue(future, false, false);
    }
}

impl WhenDoneTarget for Actor {
    /// `_enqueue_when_done`: coalescing disabled, max-queue checked.
    fn enqueue_when_done(&self, future: Arc<Future>) {
        self.enqueue(future, false, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn pool(name: &str, max_threads: usize) -> Arc<Pool> {
        Pool::new(PoolConfig::new(name).with_max_threads(max_threads)).unwrap()
    }

    #[test]
    fn echo_actor_processes_in_order() {
        let p = pool("echo", 1);
        let actor = Actor::spawn(&p, |msg: Value| Ok(Value::Int(msg.as_int().unwrap() + 1)));
        let f1 = actor.send(1i64).unwrap();
        let f2 = actor.send(2i64).unwrap();
        let f3 = actor.send(3i64).unwrap();
        assert_eq!(f1.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(2));
        assert_eq!(f2.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(3));
        assert_eq!(f3.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(4));
        assert_eq!(actor.receive_count(), 3);
        assert!(actor.queue_peak() <= 3);
    }

    #[test]
    fn overflow_reports_via_future() {
        let p = pool("overflow", 1);
        let actor = Actor::spawn(&p, |msg: Value| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(msg)
        });
        let p2 = PoolConfig::new("overflow-b").with_max_threads(1).with_max_queue(2);
        let pool2 = Pool::new(p2).unwrap();
        let actor2 = Actor::spawn(&pool2, |msg: Value| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(msg)
        });
        let _ = actor; // keep first pool's actor reachable for comparison context
        let futures: Vec<_> = (0..5).map(|i| actor2.send(i as i64)).collect();
        let mut overflow_count = 0;
        for f in futures {
            let f = f.unwrap();
            if let Err(ConcurrentError::QueueOverflow) = f.get(Some(Duration::from_secs(5))) {
                overflow_count += 1;
            }
        }
        assert_eq!(overflow_count, 3);
    }

    #[test]
    fn deferred_delivery() {
        let p = pool("deferred", 1);
        let actor = Actor::spawn(&p, |msg: Value| Ok(msg));
        let f = actor.send_later(Duration::from_millis(50), Value::str("x")).unwrap();
        assert_eq!(actor.queue_size(), 0);
        assert_eq!(f.get(Some(Duration::from_secs(5))).unwrap(), Value::str("x"));
        assert_eq!(actor.receive_count(), 1);
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
        assert_eq!(f.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(30));
    }

    #[test]
    fn coalescing_merges_pending_messages() {
        let p = pool("coalesce", 1);
        let release = Arc::new(std::sync::Barrier::new(2));
        let release2 = release.clone();
        let first_call = Arc::new(AtomicU64::new(0));
        let first_call2 = first_call.clone();
        let actor = Actor::spawn_coalescing(
            &p,
            move |msg: Value| {
                if first_call2.fetch_add(1, Ordering::SeqCst) == 0 {
                    release2.wait();
                }
                Ok(msg)
            },
            |_| Value::Int(0),
            |old, new| Value::Int(old.as_int().unwrap_or(0) + new.as_int().unwrap_or(0)),
        );
        let f0 = actor.send(Value::Int(100)).unwrap();
        release.wait();
        let fa = actor.send(1i64).unwrap();
        let fb = actor.send(2i64).unwrap();
        let fc = actor.send(3i64).unwrap();
        assert!(Arc::ptr_eq(&fa, &fb));
        assert!(Arc::ptr_eq(&fb, &fc));
        assert_eq!(f0.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(100));
        assert_eq!(fc.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(6));
    }

    #[test]
    fn panicking_receiver_completes_the_future_with_an_error_and_keeps_dispatching() {
        let p = pool("panic", 1);
        let actor = Actor::spawn(&p, |msg: Value| {
            if msg.as_int() == Some(0) {
                panic!("boom");
            }
            Ok(msg)
        });
        let f0 = actor.send(0i64).unwrap();
        let f1 = actor.send(1i64).unwrap();
        assert!(f0.get(Some(Duration::from_secs(5))).is_err());
        assert_eq!(f1.get(Some(Duration::from_secs(5))).unwrap(), Value::Int(1));
    }

    #[test]
    fn pool_stopped_rejects_new_sends() {
        let p = pool("stop", 1);
        let actor = Actor::spawn(&p, |msg: Value| Ok(msg));
        p.stop();
        assert!(matches!(actor.send(1i64), Err(ConcurrentError::PoolStopped)));
    }
}
