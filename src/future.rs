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

//! Single-assignment result cell with completion waiters and when-done continuations.
//!
//! Mirrors `ActorFuture.py`: a future starts `Pending` and moves to exactly one terminal state
//! (`Cancelled`, `Ok`, `Err`); waiters block on a condvar; when-done continuations are captured
//! under the lock, then drained *outside* it once the terminal state is published, so a
//! continuation that re-enters another lock (an actor's queue mutex, say) can never invert the
//! fixed Pool -> Actor -> Future -> Scheduler lock order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::Condvar;
use std::time::{Duration, Instant};

use crate::errors::{ConcurrentError, Result};
use crate::value::{to_immutable, ToImmutable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Pending,
    Cancelled,
    Ok,
    Err,
}

impl FutureStatus {
    pub fn is_done(self) -> bool {
        self != FutureStatus::Pending
    }
}

/// Anything a [`Future`] can enqueue a when-done continuation onto. `Actor` is the only
/// implementor in this crate; the trait exists so `future.rs` does not need to depend on
/// `actor.rs` (which itself holds `Arc<Future>`s in its queue).
pub trait WhenDoneTarget: Send + Sync {
    fn enqueue_when_done(&self, future: Arc<Future>);
}

struct Inner {
    status: FutureStatus,
    msg: Option<Value>,
    result: Option<Value>,
    error: Option<ConcurrentError>,
    when_done: Vec<(Arc<dyn WhenDoneTarget>, Arc<Future>)>,
}

pub struct Future {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Future {
    pub fn pending() -> Arc<Future> {
        Self::pending_with_msg(None)
    }

    /// Creates a pending future carrying `msg` -- the message an actor's coalescing queue keys
    /// off of. `msg` is cleared when the future is cancelled.
    pub fn pending_with_msg(msg: Option<Value>) -> Arc<Future> {
        Arc::new(Future {
            inner: Mutex::new(Inner { status: FutureStatus::Pending, msg, result: None, error: None, when_done: Vec::new() }),
            cond: Condvar::new(),
        })
    }

    /// An already-completed future, for callers that just need to wrap a value (`wraps`/`wrap`
    /// in `ActorFuture.py`).
    pub fn completed(value: impl ToImmutable) -> Result<Arc<Future>> {
        let f = Self::pending();
        f.complete(value)?;
        Ok(f)
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> FutureStatus {
        self.guard().status
    }

    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == FutureStatus::Cancelled
    }

    pub fn msg(&self) -> Option<Value> {
        self.guard().msg.clone()
    }

    /// Replaces the carried message (used by a coalescing queue to merge a new send into an
    /// already-pending future for the same key).
    pub fn set_msg(&self, msg: Value) {
        self.guard().msg = Some(msg);
    }

    /// Blocks until terminal (or `timeout` elapses), then returns the value, re-raising a
    /// stored error or cancellation.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Value> {
        let inner = self.wait_locked(timeout)?;
        match inner.status {
            FutureStatus::Ok => to_immutable(inner.result.clone().expect("ok future has a result")),
            FutureStatus::Err => Err(inner.error.clone().expect("err future has an error")),
            FutureStatus::Cancelled => Err(ConcurrentError::Cancelled),
            FutureStatus::Pending => unreachable!("wait_locked only returns once terminal or timed out"),
        }
    }

    /// Like [`Future::get`] but returns `self` rather than unwrapping, and never re-raises.
    pub fn wait_for(self: &Arc<Self>, timeout: Option<Duration>) -> Result<Arc<Future>> {
        self.wait_locked(timeout)?;
        Ok(self.clone())
    }

    fn wait_locked(&self, timeout: Option<Duration>) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.guard();
        match timeout {
            None => {
                while inner.status == FutureStatus::Pending {
                    inner = self.cond.wait(inner).unwrap_or_else(|e| e.into_inner());
                }
                Ok(inner)
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while inner.status == FutureStatus::Pending {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ConcurrentError::Timeout(timeout));
                    }
                    let (guard, result) =
                        self.cond.wait_timeout(inner, deadline - now).unwrap_or_else(|e| e.into_inner());
                    inner = guard;
                    if result.timed_out() && inner.status == FutureStatus::Pending {
                        return Err(ConcurrentError::Timeout(timeout));
                    }
                }
                Ok(inner)
            }
        }
    }

    /// Returns the stored error (fresh `Cancelled` if cancelled, `None` if `Ok`). Fails with
    /// `NotComplete` while pending.
    pub fn err(&self) -> Result<Option<ConcurrentError>> {
        let inner = self.guard();
        match inner.status {
            FutureStatus::Ok => Ok(None),
            FutureStatus::Err => Ok(inner.error.clone()),
            FutureStatus::Cancelled => Ok(Some(ConcurrentError::Cancelled)),
            FutureStatus::Pending => Err(ConcurrentError::NotComplete),
        }
    }

    /// Idempotent. Transitions `Pending -> Cancelled`; a no-op on an already-terminal future.
    pub fn cancel(self: &Arc<Self>) {
        let when_done = {
            let mut inner = self.guard();
            if inner.status != FutureStatus::Pending {
                return;
            }
            inner.status = FutureStatus::Cancelled;
            inner.msg = None;
            inner.result = None;
            std::mem::take(&mut inner.when_done)
        };
        self.cond.notify_all();
        drain_when_done(when_done);
    }

    /// Transitions `Pending -> Ok`. A no-op if already `Cancelled` (tolerating the race between
    /// a racing `cancel` and normal completion); fails `Arg` if already `Ok`/`Err`.
    pub fn complete(self: &Arc<Self>, value: impl ToImmutable) -> Result<()> {
        let value = value.to_immutable()?;
        let when_done = {
            let mut inner = self.guard();
            match inner.status {
                FutureStatus::Cancelled => return Ok(()),
                FutureStatus::Pending => {
                    inner.status = FutureStatus::Ok;
                    inner.result = Some(value);
                    std::mem::take(&mut inner.when_done)
                }
                _ => return Err(ConcurrentError::Arg("future already complete".into())),
            }
        };
        self.cond.notify_all();
        drain_when_done(when_done);
        Ok(())
    }

    /// Symmetric with [`Future::complete`].
    pub fn complete_err(self: &Arc<Self>, err: ConcurrentError) -> Result<()> {
        let when_done = {
            let mut inner = self.guard();
            match inner.status {
                FutureStatus::Cancelled => return Ok(()),
                FutureStatus::Pending => {
                    inner.status = FutureStatus::Err;
                    inner.error = Some(err);
                    std::mem::take(&mut inner.when_done)
                }
                _ => return Err(ConcurrentError::Arg("future already complete".into())),
            }
        };
        self.cond.notify_all();
        drain_when_done(when_done);
        Ok(())
    }

    /// Blocking continuation: waits for the terminal state, then invokes `on_ok`/`on_err`
    /// synchronously on the calling thread, wrapping the callback's outcome into a new future.
    /// Deliberately not a suspension point: this runtime has no async executor, so `then` blocks
    /// the calling thread rather than yielding it.
    pub fn then(
        self: &Arc<Self>,
        on_ok: impl FnOnce(Value) -> Value,
        on_err: Option<impl FnOnce(ConcurrentError) -> Value>,
    ) -> Arc<Future> {
        let result = self.get(None);
        match (result, on_err) {
            (Ok(v), _) => match Future::completed(on_ok(v)) {
                Ok(f) => f,
                Err(e) => Future::failed(e),
            },
            (Err(e), Some(on_err)) => match Future::completed(on_err(e)) {
                Ok(f) => f,
                Err(e) => Future::failed(e),
            },
            (Err(e), None) => Future::failed(e),
        }
    }

    fn failed(err: ConcurrentError) -> Arc<Future> {
        let f = Self::pending();
        let _ = f.complete_err(err);
        f
    }

    /// Registers `(target, future)` to be enqueued via `target.enqueue_when_done(future)` once
    /// `self` reaches a terminal state. If `self` is already terminal, enqueues immediately
    /// (outside any lock).
    pub fn send_when_done(self: &Arc<Self>, target: Arc<dyn WhenDoneTarget>, future: Arc<Future>) {
        let already_done = {
            let mut inner = self.guard();
            if inner.status == FutureStatus::Pending {
                inner.when_done.push((target.clone(), future.clone()));
                false
            } else {
                true
            }
        };
        if already_done {
            target.enqueue_when_done(future);
        }
    }

    /// Waits for every future in `futures` up to a shared `timeout`, returning the first
    /// timeout/error hit.
    pub fn wait_for_all(futures: &[Arc<Future>], timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        for f in futures {
            let remaining = match deadline {
                None => None,
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Err(ConcurrentError::Timeout(timeout.unwrap()));
                    }
                    Some(dl - now)
                }
            };
            f.wait_for(remaining)?;
        }
        Ok(())
    }
}

fn drain_when_done(pairs: Vec<(Arc<dyn WhenDoneTarget>, Arc<Future>)>) {
    for (target, future) in pairs {
        target.enqueue_when_done(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingTarget {
        count: AtomicUsize,
    }
    impl WhenDoneTarget for RecordingTarget {
        fn enqueue_when_done(&self, _future: Arc<Future>) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn complete_then_get_returns_value() {
        let f = Future::pending();
        f.complete(42i64).unwrap();
        assert_eq!(f.get(None).unwrap(), Value::Int(42));
    }

    #[test]
    fn cancel_is_terminal_and_reported() {
        let f = Future::pending();
        f.cancel();
        assert!(f.is_done());
        assert!(f.is_cancelled());
        assert!(matches!(f.err(), Ok(Some(ConcurrentError::Cancelled))));
        assert!(matches!(f.get(None), Err(ConcurrentError::Cancelled)));
    }

    #[test]
    fn complete_after_cancel_is_noop() {
        let f = Future::pending();
        f.cancel();
        assert!(f.complete(1i64).is_ok());
        assert!(f.is_cancelled());
    }

    #[test]
    fn complete_twice_fails() {
        let f = Future::pending();
        f.complete(1i64).unwrap();
        assert!(f.complete(2i64).is_err());
    }

    #[test]
    fn get_with_timeout_on_pending_future_times_out() {
        let f = Future::pending();
        assert!(matches!(f.get(Some(Duration::from_millis(10))), Err(ConcurrentError::Timeout(_))));
    }

    #[test]
    fn when_done_fires_immediately_if_already_terminal() {
        let target = Arc::new(RecordingTarget { count: AtomicUsize::new(0) });
        let source = Future::pending();
        source.complete(1i64).unwrap();
        let continuation = Future::pending();
        source.send_when_done(target.clone(), continuation);
        assert_eq!(target.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn when_done_fires_on_later_completion() {
        let target = Arc::new(RecordingTarget { count: AtomicUsize::new(0) });
        let source = Future::pending();
        let continuation = Future::pending();
        source.send_when_done(target.clone(), continuation);
        assert_eq!(target.count.load(Ordering::SeqCst), 0);
        source.complete(1i64).unwrap();
        assert_eq!(target.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn then_chains_blocking() {
        let f = Future::pending();
        f.complete(10i64).unwrap();
        let g = f.then(|v| Value::Int(v.as_int().unwrap() + 1), None::<fn(ConcurrentError) -> Value>);
        assert_eq!(g.get(None).unwrap(), Value::Int(11));
    }
}
