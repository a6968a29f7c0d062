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
//! Encodes a typed map literal, then decodes the result back -- scenario S6 of the textual
//! value codec, run end to end.

use concurrent_rt::codec::{decode, encode, EncodeOptions};
use concurrent_rt::value::Value;

fn main() {
    concurrent_rt::init_tracing("value_codec");

    let map = Value::map(vec![(Value::str("a"), Value::Int(1)), (Value::str("b"), Value::Int(2))]);
    let text = encode(&map, &EncodeOptions::default()).expect("map is encodable");
    println!("encoded: {text}");

    let typed = format!("[sys::Str:sys::Int] {text}");
    let decoded = decode(&typed).expect("typed prefix form decodes");
    assert_eq!(decoded, map);
    println!("decoded back to the same map of size {}", match &decoded {
        Value::Map(entries) => entries.len(),
        _ => 0,
    });
}
