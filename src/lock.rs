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

//! A reentrant mutex, matching `Lock.py`'s wrapping of `threading.RLock`.
//!
//! `std::sync::Mutex` is not reentrant (a second `lock()` from the same thread deadlocks), so
//! this tracks the owning thread and a recursion depth explicitly, guarded by a plain mutex +
//! condvar rather than reaching for a third-party reentrant-lock crate.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::errors::{ConcurrentError, Result};

struct State {
    owner: Option<ThreadId>,
    depth: u32,
}

pub struct Lock {
    state: Mutex<State>,
    released: Condvar,
}

impl Lock {
    pub fn new() -> Self {
        Lock { state: Mutex::new(State { owner: None, depth: 0 }), released: Condvar::new() }
    }

    /// Blocks until acquired. Reentrant: the same thread may call this repeatedly and must
    /// call [`Lock::unlock`] the same number of times.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(_) => {
                    state = self.released.wait(state).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Releases one level of acquisition. Fails with `Arg` if the calling thread does not hold
    /// the lock.
    pub fn unlock(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.owner {
            Some(owner) if owner == me => {
                state.depth -= 1;
                if state.depth == 0 {
                    state.owner = None;
                    self.released.notify_all();
                }
                Ok(())
            }
            _ => Err(ConcurrentError::Arg("unlock called without holding the lock".into())),
        }
    }

    /// Non-blocking try-acquire.
    pub fn try_lock(&self) -> bool {
        self.try_lock_for(Duration::ZERO)
    }

    /// Blocks up to `timeout`, returning whether the lock was acquired.
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return true;
                }
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return true;
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, timeout_result) = self
                        .released
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                    if timeout_result.timed_out() && state.owner.is_some() {
                        return false;
                    }
                }
            }
        }
    }

    /// Runs `f` while holding the lock, releasing it (one level) afterwards regardless of
    /// panics from `f` unwinding past this frame would still leave the lock held by a poisoned
    /// state; callers needing panic safety should use `lock`/`unlock` directly.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        let result = f();
        let _ = self.unlock();
        result
    }
}

impl Default for Lock {
    fn default() -> Self {
        Lock::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_same_thread() {
        let lock = Lock::new();
        lock.lock();
        lock.lock();
        assert!(lock.unlock().is_ok());
        assert!(lock.unlock().is_ok());
        assert!(lock.unlock().is_err());
    }

    #[test]
    fn try_lock_non_blocking_fails_when_held_by_other_thread() {
        let lock = Arc::new(Lock::new());
        lock.lock();
        let lock2 = lock.clone();
        let handle = thread::spawn(move || lock2.try_lock());
        assert!(!handle.join().unwrap());
        lock.unlock().unwrap();
    }

    #[test]
    fn try_lock_for_blocks_until_released() {
        let lock = Arc::new(Lock::new());
        lock.lock();
        let lock2 = lock.clone();
        let handle = thread::spawn(move || lock2.try_lock_for(Duration::from_millis(500)));
        thread::sleep(Duration::from_millis(50));
        lock.unlock().unwrap();
        assert!(handle.join().unwrap());
    }
}
