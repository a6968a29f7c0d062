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

//! Bounded worker pool, matching `ActorPool.py`.
//!
//! Workers pull batches off a shared job queue (a `Mutex<VecDeque<Job>>` + `Condvar`, the same
//! pattern used throughout this crate rather than a channel crate) up to `max_threads`
//! concurrently. A pool owns its own [`Scheduler`] -- matching `ActorPool.py`'s
//! `self._scheduler = Scheduler(name)` -- for `schedule`/`sendLater`.
//!
//! `Actor` depends on `Pool`, not the other way around, so this module only knows actors through
//! three small traits ([`PoolWork`], [`DeferredDelivery`], plus [`Scheduler`]'s own
//! [`crate::scheduler::ScheduledWork`]) rather than the concrete `Actor` type.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::{ConcurrentError, Result};
use crate::future::Future;
use crate::scheduler::{Scheduler, ScheduledWork};
use crate::{debug, info};

fn default_max_threads() -> usize {
    100
}
fn default_max_queue() -> usize {
    100_000_000
}
fn default_max_time_before_yield() -> String {
    "1sec".to_string()
}

/// Pool construction parameters, loadable from a RON config file via `ron::de::from_str`. The
/// duration field is kept as the source format's literal text (e.g. `"1sec"`, `"50ms"`) and
/// parsed with `parse_duration` at construction time, rather than serde's native
/// `{secs,nanos}` encoding of `std::time::Duration` -- this is the field shape an operator
/// would actually hand-edit in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default = "default_max_time_before_yield")]
    pub max_time_before_yield: String,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        PoolConfig {
            name: name.into(),
            max_threads: default_max_threads(),
            max_queue: default_max_queue(),
            max_time_before_yield: default_max_time_before_yield(),
        }
    }

    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub fn with_max_queue(mut self, n: usize) -> Self {
        self.max_queue = n;
        self
    }

    pub fn with_max_time_before_yield(mut self, literal: impl Into<String>) -> Self {
        self.max_time_before_yield = literal.into();
        self
    }

    /// Loads a config from a RON document, e.g. `(name: "io", max_threads: 8, max_queue: 1000)`.
    /// Unset fields fall back to the same defaults `new` uses.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::de::from_str(text).map_err(|e| ConcurrentError::Parse { line: e.position.line as u32, msg: e.code.to_string() })
    }

    /// Loads a config from an open RON file/reader, e.g. a file handle opened by the caller.
    pub fn from_ron_reader(reader: impl std::io::Read) -> Result<Self> {
        ron::de::from_reader(reader).map_err(|e| ConcurrentError::Parse { line: e.position.line as u32, msg: e.code.to_string() })
    }

    fn validate(&self) -> Result<Duration> {
        if self.max_threads < 1 {
            return Err(ConcurrentError::Arg("maxThreads must be >= 1".into()));
        }
        if self.max_queue < 1 {
            return Err(ConcurrentError::Arg("maxQueue must be >= 1".into()));
        }
        parse_duration::parse(&self.max_time_before_yield)
            .map_err(|e| ConcurrentError::Arg(format!("invalid maxTimeBeforeYield: {e}")))
    }
}

/// What `Pool::submit` runs a worker thread against -- one batch-drain of an actor's mailbox.
pub trait PoolWork: Send + Sync {
    fn run_batch(self: Arc<Self>);
}

/// What `Pool::schedule` delivers into once a deadline is reached.
pub trait DeferredDelivery: Send + Sync {
    fn enqueue_later(self: Arc<Self>, future: Arc<Future>);
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    cond: Condvar,
    closed: AtomicBool,
}

impl JobQueue {
    fn new() -> Self {
        JobQueue { jobs: Mutex::new(VecDeque::new()), cond: Condvar::new(), closed: AtomicBool::new(false) }
    }

    fn push(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.push_back(job);
        self.cond.notify_one();
    }

    fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(job) = jobs.pop_front() {
                return Some(job);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            jobs = self.cond.wait(jobs).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Drops every not-yet-started job without running it, returning how many were dropped (so
    /// the caller can reconcile a pending-work counter).
    fn drain_unstarted(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let n = jobs.len();
        jobs.clear();
        n
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopping,
    Done,
}

pub struct Pool {
    config: PoolConfig,
    max_time_before_yield: Duration,
    scheduler: Arc<Scheduler>,
    queue: Arc<JobQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: AtomicUsize,
    state: Mutex<Lifecycle>,
    killed: AtomicBool,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Result<Arc<Pool>> {
        let max_time_before_yield = config.validate()?;
        let scheduler = Scheduler::new(format!("{}-scheduler", config.name));
        let queue = Arc::new(JobQueue::new());
        let pool = Arc::new(Pool {
            config,
            max_time_before_yield,
            scheduler,
            queue: queue.clone(),
            workers: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
            state: Mutex::new(Lifecycle::Running),
            killed: AtomicBool::new(false),
        });
        let mut workers = pool.workers.lock().unwrap_or_else(|e| e.into_inner());
        for i in 0..pool.config.max_threads {
            let queue = queue.clone();
            let name = format!("{}-worker-{i}", pool.config.name);
            if let Ok(handle) = std::thread::Builder::new().name(name).spawn(move || {
                while let Some(job) = queue.pop() {
                    job();
                }
            }) {
                workers.push(handle);
            }
        }
        drop(workers);
        info!("pool {} started with {} workers", pool.config.name, pool.config.max_threads);
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn max_threads(&self) -> usize {
        self.config.max_threads
    }

    pub fn max_queue(&self) -> usize {
        self.config.max_queue
    }

    pub fn max_time_before_yield(&self) -> Duration {
        self.max_time_before_yield
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) != 0
    }

    pub fn is_stopped(&self) -> bool {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) != Lifecycle::Running
    }

    /// True once `state == Done`; may promote `Stopping -> Done` as a side effect when the
    /// executor has drained (no pending work and every worker thread has exited).
    pub fn is_done(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            Lifecycle::Done => true,
            Lifecycle::Running => false,
            Lifecycle::Stopping => {
                let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
                let drained = self.pending.load(Ordering::SeqCst) == 0
                    && workers.iter().all(|w| w.is_finished());
                if drained {
                    *state = Lifecycle::Done;
                }
                drained
            }
        }
    }

    /// Submits one batch-run of `actor`'s mailbox to the worker pool.
    pub fn submit(self: &Arc<Self>, work: Arc<dyn PoolWork>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending_handle();
        self.queue.push(Box::new(move || {
            work.run_batch();
            pending.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    fn pending_handle(self: &Arc<Self>) -> PendingHandle {
        PendingHandle(self.clone())
    }

    /// Hands `(target, future)` to this pool's scheduler, which will call
    /// `target.enqueue_later(future)` once `delay` has elapsed.
    pub fn schedule(&self, target: Arc<dyn DeferredDelivery>, delay: Duration, future: Arc<Future>) {
        self.scheduler.schedule(delay, Box::new(ScheduledDelivery { target, future }));
    }

    /// Picks the least-loaded actor by queue size. Short-circuits on the first empty queue seen
    /// (stable on ties -- first-seen wins either way); fails `Arg` on an empty list. See
    /// DESIGN.md for why this operates on pre-computed sizes rather than the actors themselves.
    pub fn balance(sizes: &[usize]) -> Result<usize> {
        if sizes.is_empty() {
            return Err(ConcurrentError::Arg("balance: empty actor list".into()));
        }
        let mut best = 0;
        for (i, &size) in sizes.iter().enumerate() {
            if size == 0 {
                return Ok(i);
            }
            if size < sizes[best] {
                best = i;
            }
        }
        Ok(best)
    }

    /// Stops the scheduler and transitions to `Stopping`; already-running and already-queued
    /// batches are left to drain.
    pub fn stop(self: &Arc<Self>) -> Arc<Self> {
        self.scheduler.stop();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == Lifecycle::Running {
            *state = Lifecycle::Stopping;
        }
        drop(state);
        self.queue.close();
        debug!("pool {} stopping", self.config.name);
        self.clone()
    }

    /// As `stop`, but also marks the pool killed and drops every not-yet-started job from the
    /// queue (already-running batches still finish; an actor's in-flight dispatch checks
    /// `pool.is_killed()` before running the next message and cancels instead).
    pub fn kill(self: &Arc<Self>) -> Arc<Self> {
        self.scheduler.stop();
        self.killed.store(true, Ordering::SeqCst);
        let dropped = self.queue.drain_unstarted();
        if dropped > 0 {
            self.pending.fetch_sub(dropped, Ordering::SeqCst);
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == Lifecycle::Running {
            *state = Lifecycle::Stopping;
        }
        drop(state);
        self.queue.close();
        debug!("pool {} killed", self.config.name);
        self.clone()
    }

    /// Must be called after `stop`/`kill`. Blocks for worker termination, up to `timeout` if
    /// given; fails `Timeout` if workers have not finished in time. On success, transitions to
    /// `Done`.
    pub fn join(&self, timeout: Option<Duration>) -> Result<()> {
        if !self.is_stopped() {
            return Err(ConcurrentError::Arg("join called before stop/kill".into()));
        }
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        let handles = std::mem::take(&mut *workers);
        drop(workers);
        for handle in handles {
            match deadline {
                None => {
                    let _ = handle.join();
                }
                Some(dl) => {
                    // std::thread::JoinHandle has no timed join; poll is_finished instead.
                    loop {
                        if handle.is_finished() {
                            let _ = handle.join();
                            break;
                        }
                        if Instant::now() >= dl {
                            return Err(ConcurrentError::Timeout(timeout.unwrap()));
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        }
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Lifecycle::Done;
        Ok(())
    }
}

struct PendingHandle(Arc<Pool>);
impl PendingHandle {
    fn fetch_sub(&self, n: usize, order: Ordering) {
        self.0.pending.fetch_sub(n, order);
    }
}

struct ScheduledDelivery {
    target: Arc<dyn DeferredDelivery>,
    future: Arc<Future>,
}

impl ScheduledWork for ScheduledDelivery {
    fn work(&self) {
        if !self.future.is_cancelled() {
            self.target.clone().enqueue_later(self.future.clone());
        }
    }
    fn cancel(&self) {
        self.future.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec() {
        let cfg = PoolConfig::new("p");
        assert_eq!(cfg.max_threads, 100);
        assert_eq!(cfg.max_queue, 100_000_000);
        assert_eq!(cfg.max_time_before_yield, "1sec");
    }

    #[test]
    fn loads_config_from_ron_with_defaults_for_missing_fields() {
        let cfg = PoolConfig::from_ron_str(r#"(name: "io", max_threads: 8)"#).unwrap();
        assert_eq!(cfg.name, "io");
        assert_eq!(cfg.max_threads, 8);
        assert_eq!(cfg.max_queue, default_max_queue());
        assert_eq!(cfg.max_time_before_yield, "1sec");
    }

    #[test]
    fn rejects_zero_max_threads() {
        let cfg = PoolConfig::new("p").with_max_threads(0);
        assert!(Pool::new(cfg).is_err());
    }

    #[test]
    fn balance_short_circuits_on_empty_queue() {
        assert_eq!(Pool::balance(&[5, 0, 3]).unwrap(), 1);
    }

    #[test]
    fn balance_is_stable_on_ties() {
        assert_eq!(Pool::balance(&[3, 1, 1, 5]).unwrap(), 1);
    }

    #[test]
    fn balance_fails_on_empty_list() {
        assert!(Pool::balance(&[]).is_err());
    }

    #[test]
    fn lifecycle_running_to_done() {
        let pool = Pool::new(PoolConfig::new("lifecycle").with_max_threads(1)).unwrap();
        assert!(!pool.is_stopped());
        pool.stop();
        assert!(pool.is_stopped());
        pool.join(Some(Duration::from_secs(5))).unwrap();
        assert!(pool.is_done());
    }
}
