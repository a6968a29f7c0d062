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

//! crate-wide error taxonomy.
//!
//! One enum, matching every error *kind* named by the runtime (atomic cells, lock, map,
//! future, scheduler, pool, actor, codec). Call sites never construct `std::io::Error` or
//! poisoned-lock panics directly; they go through here so `Future::get` and friends have a
//! single error type to propagate.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConcurrentError>;

#[derive(Error, Debug, Clone)]
pub enum ConcurrentError {
    #[error("invalid argument: {0}")]
    Arg(String),

    #[error("value is not immutable: {0}")]
    NotImmutable(String),

    #[error("actor queue overflow")]
    QueueOverflow,

    #[error("future was cancelled")]
    Cancelled,

    #[error("future is not complete")]
    NotComplete,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("parse error at line {line}: {msg}")]
    Parse { line: u32, msg: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("pool is stopped")]
    PoolStopped,

    #[error("poisoned lock: {0}")]
    PoisonedLock(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for ConcurrentError {
    fn from(e: std::io::Error) -> Self {
        ConcurrentError::Io(e.to_string())
    }
}

pub fn poisoned_lock(op: impl ToString) -> ConcurrentError {
    ConcurrentError::PoisonedLock(op.to_string())
}

pub fn op_failed(msg: impl ToString) -> ConcurrentError {
    ConcurrentError::Other(msg.to_string())
}

pub fn parse_error(line: u32, msg: impl ToString) -> ConcurrentError {
    ConcurrentError::Parse { line, msg: msg.to_string() }
}
