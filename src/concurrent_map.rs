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

//! A thread-safe key/value map, matching `ConcurrentMap.py`.
//!
//! A single mutex guards a `Vec<(Value, Value)>` (insertion-ordered, mirroring the source's
//! dict-based map and this crate's `Value::Map` representation). `each`/`each_while` snapshot
//! the pairs under the lock and iterate *outside* it, so a callback that re-enters the map (or
//! sends to an actor that touches the same map) cannot deadlock against the map's own mutex.

use std::sync::Mutex;

use crate::errors::{ConcurrentError, Result};
use crate::value::{to_immutable, ToImmutable, Value};

pub struct ConcurrentMap {
    entries: Mutex<Vec<(Value, Value)>>,
}

impl ConcurrentMap {
    pub fn new() -> Self {
        ConcurrentMap { entries: Mutex::new(Vec::new()) }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<(Value, Value)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn size(&self) -> usize {
        self.guard().len()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.guard().iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.guard().iter().any(|(k, _)| k == key)
    }

    /// Sets `key` to `val`, validating `val` is immutable. Returns the previous value, if any.
    pub fn set(&self, key: impl ToImmutable, val: impl ToImmutable) -> Result<Option<Value>> {
        let key = key.to_immutable()?;
        let val = val.to_immutable()?;
        let mut entries = self.guard();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            Ok(Some(std::mem::replace(&mut slot.1, val)))
        } else {
            entries.push((key, val));
            Ok(None)
        }
    }

    pub fn get_and_set(&self, key: impl ToImmutable, val: impl ToImmutable) -> Result<Option<Value>> {
        self.set(key, val)
    }

    /// Like `set`, but fails with `Arg` if the key is already present.
    pub fn add(&self, key: impl ToImmutable, val: impl ToImmutable) -> Result<()> {
        let key = key.to_immutable()?;
        let val = val.to_immutable()?;
        let mut entries = self.guard();
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(ConcurrentError::Arg(format!("key already present: {key:?}")));
        }
        entries.push((key, val));
        Ok(())
    }

    pub fn get_or_add(&self, key: impl ToImmutable, default: impl ToImmutable) -> Result<Value> {
        let key = key.to_immutable()?;
        let mut entries = self.guard();
        if let Some((_, v)) = entries.iter().find(|(k, _)| *k == key) {
            return Ok(v.clone());
        }
        let default = to_immutable(default.to_immutable()?)?;
        entries.push((key.clone(), default.clone()));
        Ok(default)
    }

    pub fn set_all(&self, other: &ConcurrentMap) -> Result<()> {
        let snapshot = other.guard().clone();
        let mut entries = self.guard();
        for (k, v) in snapshot {
            if let Some(slot) = entries.iter_mut().find(|(ek, _)| *ek == k) {
                slot.1 = v;
            } else {
                entries.push((k, v));
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &Value) -> Option<Value> {
        let mut entries = self.guard();
        let idx = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(idx).1)
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.guard().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn vals(&self) -> Vec<Value> {
        self.guard().iter().map(|(_, v)| v.clone()).collect()
    }

    /// Snapshots all pairs under the lock, then invokes `f` for each outside the lock.
    pub fn each(&self, mut f: impl FnMut(&Value, &Value)) {
        let snapshot = self.guard().clone();
        for (k, v) in &snapshot {
            f(k, v);
        }
    }

    /// Like `each`, but `f` may stop iteration early by returning `false`.
    pub fn each_while(&self, mut f: impl FnMut(&Value, &Value) -> bool) {
        let snapshot = self.guard().clone();
        for (k, v) in &snapshot {
            if !f(k, v) {
                break;
            }
        }
    }
}

impl Default for ConcurrentMap {
    fn default() -> Self {
        ConcurrentMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate_key() {
        let m = ConcurrentMap::new();
        m.add("a", 1i64).unwrap();
        assert!(m.add("a", 2i64).is_err());
    }

    #[test]
    fn get_or_add_only_sets_once() {
        let m = ConcurrentMap::new();
        assert_eq!(m.get_or_add("k", 1i64).unwrap(), Value::Int(1));
        assert_eq!(m.get_or_add("k", 2i64).unwrap(), Value::Int(1));
    }

    #[test]
    fn each_snapshot_allows_reentrant_read() {
        let m = ConcurrentMap::new();
        m.set("a", 1i64).unwrap();
        m.set("b", 2i64).unwrap();
        let mut seen = Vec::new();
        m.each(|k, v| {
            // re-entering the map from inside the callback must not deadlock
            let _ = m.size();
            seen.push((k.clone(), v.clone()));
        });
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn each_while_stops_early() {
        let m = ConcurrentMap::new();
        for i in 0..5 {
            m.set(i.to_string(), i as i64).unwrap();
        }
        let mut count = 0;
        m.each_while(|_, _| {
            count += 1;
            count < 2
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn rejects_non_immutable_values() {
        use crate::value::ComplexValue;
        use std::sync::Arc;
        let m = ConcurrentMap::new();
        let bad = Value::Complex(Arc::new(ComplexValue { type_name: "demo::Mutable".into(), fields: vec![] }));
        assert!(m.set("k", bad).is_err());
    }
}
