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

//! The one external clock collaborator the rest of the crate consumes: a monotonic nanosecond
//! counter, plus a "unique now" guarantee -- one of the two pieces of genuine global mutable
//! state in the runtime (the other being the per-thread actor-locals installed by the work loop,
//! see [`crate::actor::current_actor_locals`]).
//!
//! Two calls to `now_ns()` on different threads at (what the OS clock reports as) the same
//! instant still return strictly increasing values, which is what the Scheduler's
//! insertion-order tie-break and the cooperative-yield budget both implicitly rely on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();
static LAST: AtomicU64 = AtomicU64::new(0);

pub fn now_ns() -> u64 {
    let start = START.get_or_init(Instant::now);
    let raw = start.elapsed().as_nanos() as u64;
    loop {
        let last = LAST.load(Ordering::Relaxed);
        let next = if raw > last { raw } else { last + 1 };
        if LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
            return next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let a = now_ns();
        let b = now_ns();
        assert!(b > a);
    }
}
