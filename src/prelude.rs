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

pub use crate::{
    actor::{Actor, Receive, ThreadState},
    atomic::{AtomicBool, AtomicInt, AtomicRef},
    clock::now_ns,
    codec::{decode, encode, encode_to, EncodeOptions},
    codec::token::{Token, TokenKind},
    codec::tokenizer::Tokenizer,
    codec::decoder::Decoder,
    concurrent_map::ConcurrentMap,
    errors::{ConcurrentError, Result},
    future::{Future, FutureStatus, WhenDoneTarget},
    lock::Lock,
    pool::{DeferredDelivery, Pool, PoolConfig, PoolWork},
    scheduler::{ScheduledWork, Scheduler},
    value::{ComplexValue, ToImmutable, TypeEntry, TypeRegistry, Unsafe, Value},
    init_tracing,
    trace, debug, info, warn, error,
};
