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

//! Lock-backed atomic cells: `AtomicBool`, `AtomicInt`, `AtomicRef`.
//!
//! Only atomicity (linearizability per cell) is promised here, not lock-freedom, so these are
//! plain `Mutex`-guarded cells rather than `std::sync::atomic::*` -- `AtomicRef` in particular
//! needs to run the immutability check under the same lock as the store, which rules out the
//! lock-free primitives anyway.

use std::sync::Mutex;

use crate::errors::{poisoned_lock, Result};
use crate::value::{to_immutable, ToImmutable, Value};

/// A boolean cell with atomic get/set/getAndSet/compareAndSet.
#[derive(Debug)]
pub struct AtomicBool {
    val: Mutex<bool>,
}

impl AtomicBool {
    pub fn new(initial: bool) -> Self {
        AtomicBool { val: Mutex::new(initial) }
    }

    pub fn get(&self) -> bool {
        *self.val.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, v: bool) {
        *self.val.lock().unwrap_or_else(|e| e.into_inner()) = v;
    }

    pub fn get_and_set(&self, v: bool) -> bool {
        let mut guard = self.val.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, v)
    }

    pub fn compare_and_set(&self, expect: bool, update: bool) -> bool {
        let mut guard = self.val.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == expect {
            *guard = update;
            true
        } else {
            false
        }
    }
}

impl Default for AtomicBool {
    fn default() -> Self {
        AtomicBool::new(false)
    }
}

/// An integer cell with atomic get/set/getAndSet/compareAndSet plus increment/decrement/add
/// family (both value-returning and void forms), matching `AtomicInt.py`.
#[derive(Debug)]
pub struct AtomicInt {
    val: Mutex<i64>,
}

impl AtomicInt {
    pub fn new(initial: i64) -> Self {
        AtomicInt { val: Mutex::new(initial) }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, i64> {
        self.val.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> i64 {
        *self.guard()
    }

    pub fn set(&self, v: i64) {
        *self.guard() = v;
    }

    pub fn get_and_set(&self, v: i64) -> i64 {
        let mut guard = self.guard();
        std::mem::replace(&mut *guard, v)
    }

    pub fn compare_and_set(&self, expect: i64, update: i64) -> bool {
        let mut guard = self.guard();
        if *guard == expect {
            *guard = update;
            true
        } else {
            false
        }
    }

    pub fn get_and_increment(&self) -> i64 {
        self.get_and_add(1)
    }

    pub fn get_and_decrement(&self) -> i64 {
        self.get_and_add(-1)
    }

    pub fn get_and_add(&self, delta: i64) -> i64 {
        let mut guard = self.guard();
        let old = *guard;
        *guard = old.wrapping_add(delta);
        old
    }

    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    pub fn decrement_and_get(&self) -> i64 {
        self.add_and_get(-1)
    }

    pub fn add_and_get(&self, delta: i64) -> i64 {
        let mut guard = self.guard();
        *guard = guard.wrapping_add(delta);
        *guard
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn decrement(&self) {
        self.add(-1);
    }

    pub fn add(&self, delta: i64) {
        let mut guard = self.guard();
        *guard = guard.wrapping_add(delta);
    }
}

impl Default for AtomicInt {
    fn default() -> Self {
        AtomicInt::new(0)
    }
}

/// A reference cell holding an arbitrary immutable [`Value`]. Every store goes through
/// [`to_immutable`] and fails with `NotImmutable` if the value can't cross the boundary.
///
/// `compare_and_set` uses equality, then identity, as the fallback -- see DESIGN.md for why
/// this crate keeps both checks rather than picking just one. Identity here means "the same
/// `Value::Unsafe` cell" or "the same `Arc`-backed list/map/complex allocation"; primitive kinds
/// only ever compare equal by value.
pub struct AtomicRef {
    val: Mutex<Value>,
}

impl AtomicRef {
    pub fn new(initial: impl ToImmutable) -> Result<Self> {
        let v = initial.to_immutable()?;
        Ok(AtomicRef { val: Mutex::new(v) })
    }

    pub fn get(&self) -> Value {
        self.val.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, v: impl ToImmutable) -> Result<()> {
        let v = v.to_immutable()?;
        *self.val.lock().unwrap_or_else(|e| e.into_inner()) = v;
        Ok(())
    }

    pub fn get_and_set(&self, v: impl ToImmutable) -> Result<Value> {
        let v = v.to_immutable()?;
        let mut guard = self.val.lock().map_err(|_| poisoned_lock("AtomicRef::get_and_set"))?;
        Ok(std::mem::replace(&mut *guard, v))
    }

    pub fn compare_and_set(&self, expect: &Value, update: impl ToImmutable) -> Result<bool> {
        let update = update.to_immutable()?;
        let mut guard = self.val.lock().unwrap_or_else(|e| e.into_inner());
        if same_value(&guard, expect) {
            *guard = update;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Equality first, identity second -- mirrors `AtomicRef.py`'s
/// `self.__val is expect or self.__val == expect`.
fn same_value(held: &Value, expect: &Value) -> bool {
    held == expect || identity_eq(held, expect)
}

fn identity_eq(a: &Value, b: &Value) -> bool {
    use std::sync::Arc;
    match (a, b) {
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Arc::ptr_eq(x, y),
        (Value::Complex(x), Value::Complex(y)) => Arc::ptr_eq(x, y),
        (Value::Str(x), Value::Str(y)) => Arc::ptr_eq(x, y),
        (Value::Unsafe(x), Value::Unsafe(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_cas() {
        let b = AtomicBool::new(false);
        assert!(b.compare_and_set(false, true));
        assert!(!b.compare_and_set(false, true));
        assert!(b.get());
    }

    #[test]
    fn int_increment_family() {
        let i = AtomicInt::new(10);
        assert_eq!(i.get_and_increment(), 10);
        assert_eq!(i.get(), 11);
        assert_eq!(i.increment_and_get(), 12);
        assert_eq!(i.get_and_add(5), 12);
        assert_eq!(i.get(), 17);
    }

    #[test]
    fn ref_rejects_non_const_complex() {
        use crate::value::{ComplexValue, Value};
        use std::sync::Arc;
        let v = Value::Complex(Arc::new(ComplexValue {
            type_name: "demo::Mutable".into(),
            fields: vec![],
        }));
        assert!(AtomicRef::new(v).is_err());
    }

    #[test]
    fn ref_cas_by_equality() {
        let r = AtomicRef::new(1i64).unwrap();
        assert!(r.compare_and_set(&Value::Int(1), 2i64).unwrap());
        assert_eq!(r.get(), Value::Int(2));
        assert!(!r.compare_and_set(&Value::Int(1), 3i64).unwrap());
    }
}
