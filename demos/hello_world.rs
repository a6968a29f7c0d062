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
//! The smallest possible actor: spawn it on a pool, send one message, block for the reply.

use std::time::Duration;

use concurrent_rt::prelude::*;

fn main() {
    concurrent_rt::init_tracing("hello_world");

    let pool = Pool::new(PoolConfig::new("hello")).expect("valid pool config");
    let greeter = Actor::spawn(&pool, |msg: Value| {
        let name = msg.as_str().unwrap_or("world").to_string();
        Ok(Value::str(format!("hello {name}!")))
    });

    let reply = greeter.send(Value::str("world")).expect("pool accepts the send");
    match reply.get(Some(Duration::from_secs(5))) {
        Ok(greeting) => println!("{}", greeting.as_str().unwrap_or_default()),
        Err(e) => eprintln!("greeter failed: {e}"),
    }

    pool.stop();
    pool.join(Some(Duration::from_secs(5))).expect("pool drains in time");
}
