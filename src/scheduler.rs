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

//! Background timer thread, matching `Scheduler.py`.
//!
//! A sorted singly-linked list (here: a `Vec` kept sorted by insertion, which is the idiomatic
//! Rust reading of "insertion is O(n), drain is O(1)" -- the source's hand-rolled linked list
//! buys nothing extra in a language with a growable array in std) plus one lazily-spawned
//! background thread per scheduler.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::{debug, error, trace};

/// A unit of deferred work. `work()` runs once, at or after the deadline; `cancel()` runs if
/// the scheduler is stopped before the deadline is reached. Both run outside the scheduler's
/// lock.
pub trait ScheduledWork: Send {
    fn work(&self);
    fn cancel(&self);
}

struct Node {
    deadline: Instant,
    seq: u64,
    work: Box<dyn ScheduledWork>,
}

struct State {
    alive: bool,
    started: bool,
    nodes: Vec<Node>,
    next_seq: u64,
}

pub struct Scheduler {
    name: String,
    state: Mutex<State>,
    cond: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Arc<Scheduler> {
        Arc::new(Scheduler {
            name: name.into(),
            state: Mutex::new(State { alive: true, started: false, nodes: Vec::new(), next_seq: 0 }),
            cond: Condvar::new(),
            thread: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules `work` to run no earlier than `delay` from now. Lazily starts the background
    /// thread on first call. Ties at the same deadline are broken by insertion order.
    pub fn schedule(self: &Arc<Self>, delay: Duration, work: Box<dyn ScheduledWork>) {
        let deadline = Instant::now() + delay;
        let became_head = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let seq = state.next_seq;
            state.next_seq += 1;
            let node = Node { deadline, seq, work };
            let pos = state
                .nodes
                .iter()
                .position(|n| (n.deadline, n.seq) > (deadline, seq))
                .unwrap_or(state.nodes.len());
            state.nodes.insert(pos, node);
            pos == 0
        };
        if became_head {
            self.cond.notify_all();
        }
        self.ensure_started();
    }

    fn ensure_started(self: &Arc<Self>) {
        let mut thread_slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if thread_slot.is_some() {
            return;
        }
        let already_started = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.started {
                true
            } else {
                state.started = true;
                false
            }
        };
        if already_started {
            return;
        }
        let this = self.clone();
        let builder = std::thread::Builder::new().name(format!("{}-Scheduler", self.name));
        *thread_slot = builder.spawn(move || this.run()).ok();
    }

    fn run(self: Arc<Self>) {
        loop {
            let due = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                loop {
                    if !state.alive {
                        return;
                    }
                    match state.nodes.first() {
                        None => {
                            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
                        }
                        Some(head) => {
                            let now = Instant::now();
                            if head.deadline <= now {
                                break state.nodes.remove(0);
                            }
                            let (guard, _) = self
                                .cond
                                .wait_timeout(state, head.deadline - now)
                                .unwrap_or_else(|e| e.into_inner());
                            state = guard;
                        }
                    }
                }
            };
            trace!("scheduler {} dispatching due work", self.name);
            // A panicking `work()` must not take the scheduler thread down with it -- there is
            // no other thread left to run the rest of the queue.
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| due.work.work())).is_err() {
                error!("scheduler {} work panicked", self.name);
            }
        }
    }

    /// Stops the scheduler: marks it dead, wakes the thread, then -- while still holding the
    /// lock, matching `Scheduler.py`'s one documented exception to "no callback under a lock"
    /// -- cancels every still-queued item (`cancel` only reaches into a `Future`, never back
    /// into the scheduler, so this can't invert the lock order).
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.alive = false;
        self.cond.notify_all();
        for node in state.nodes.drain(..) {
            node.work.cancel();
        }
        debug!("scheduler {} stopped", self.name);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if state.alive {
                state.alive = false;
                self.cond.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordWork {
        label: u32,
        order: Arc<StdMutex<Vec<u32>>>,
    }
    impl ScheduledWork for RecordWork {
        fn work(&self) {
            self.order.lock().unwrap().push(self.label);
        }
        fn cancel(&self) {}
    }

    #[test]
    fn dispatches_in_deadline_order_regardless_of_call_order() {
        let scheduler = Scheduler::new("test");
        let order = Arc::new(StdMutex::new(Vec::new()));
        scheduler.schedule(Duration::from_millis(30), Box::new(RecordWork { label: 30, order: order.clone() }));
        scheduler.schedule(Duration::from_millis(10), Box::new(RecordWork { label: 10, order: order.clone() }));
        scheduler.schedule(Duration::from_millis(20), Box::new(RecordWork { label: 20, order: order.clone() }));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec![10, 20, 30]);
    }

    struct CancelCounter(Arc<AtomicUsize>);
    impl ScheduledWork for CancelCounter {
        fn work(&self) {}
        fn cancel(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stop_cancels_pending_work() {
        let scheduler = Scheduler::new("test-stop");
        let cancelled = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(Duration::from_secs(60), Box::new(CancelCounter(cancelled.clone())));
        scheduler.schedule(Duration::from_secs(60), Box::new(CancelCounter(cancelled.clone())));
        scheduler.stop();
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
    }
}
