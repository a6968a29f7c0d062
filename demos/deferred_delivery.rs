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
//! `send_later` plus `send_when_complete`: one actor schedules a delayed tick, a second actor
//! chains off the first actor's result once it lands.

use std::time::Duration;

use concurrent_rt::prelude::*;

fn main() {
    concurrent_rt::init_tracing("deferred_delivery");

    let pool = Pool::new(PoolConfig::new("deferred")).expect("valid pool config");

    let doubler = Actor::spawn(&pool, |msg: Value| Ok(Value::Int(2 * msg.as_int().unwrap_or(0))));
    let logger = Actor::spawn(&pool, |msg: Value| {
        println!("chained: {}", msg.as_str().unwrap_or("?"));
        Ok(msg)
    });

    let tick = doubler.send_later(Duration::from_millis(200), 21i64).expect("pool accepts the send");
    let chained = logger.send_when_complete(&tick, Value::str("tick done")).expect("pool accepts the send");

    chained.get(Some(Duration::from_secs(5))).expect("chained delivery completes");
    println!("doubler produced: {}", tick.get(Some(Duration::from_secs(5))).unwrap().as_int().unwrap_or(-1));

    pool.stop();
    pool.join(Some(Duration::from_secs(5))).expect("pool drains in time");
}
