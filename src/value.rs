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

//! The runtime's value model.
//!
//! Per the design notes this reimplementation dispatches on a value *kind* (a closed sum type)
//! rather than reflecting over live Rust types: [`Value`] enumerates every shape a message,
//! future result, actor-local entry, or atomic-ref payload can take. Everything but
//! [`Value::Complex`] is immutable by construction (numbers, `Arc<str>` text, `Arc`-backed
//! collections); `Complex` values are checked against the process-wide [`TypeRegistry`], which
//! is this crate's stand-in for "the type is declared immutable".

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use crate::errors::{ConcurrentError, Result};

/// Smuggles an arbitrary `Send` value across an API that otherwise requires immutability.
/// The runtime never looks inside; two `Unsafe` wrappers are equal only if they share the
/// same backing cell (identity, not content equality -- content is opaque).
#[derive(Clone)]
pub struct Unsafe(Arc<Mutex<Box<dyn Any + Send>>>);

impl Unsafe {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Unsafe(Arc::new(Mutex::new(Box::new(value))))
    }

    /// Runs `f` against the wrapped value if it is (still) of type `T`. Returns `None` if the
    /// type doesn't match or the backing mutex is poisoned.
    pub fn with<T: Send + 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.0.lock().ok()?;
        guard.downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for Unsafe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsafe(..)")
    }
}

impl PartialEq for Unsafe {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A named, field-tagged aggregate -- the reimplementation's stand-in for "an instance of a
/// type", as produced by the codec's complex-object rule or constructed directly by a caller.
#[derive(Debug, Clone)]
pub struct ComplexValue {
    pub type_name: Arc<str>,
    pub fields: Vec<(Arc<str>, Value)>,
}

impl ComplexValue {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n.as_ref() == name).map(|(_, v)| v)
    }
}

impl PartialEq for ComplexValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.fields == other.fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Kept as canonical decimal text rather than a binary float -- decimal literals in the
    /// source format are exact and this crate has no arithmetic use for them.
    Decimal(Arc<str>),
    Duration(Duration),
    Str(Arc<str>),
    Uri(Arc<str>),
    List(Arc<Vec<Value>>),
    /// Preserves insertion order, matching the source format's map literal semantics.
    Map(Arc<Vec<(Value, Value)>>),
    Complex(Arc<ComplexValue>),
    Unsafe(Unsafe),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(items))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Arc::new(entries))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Describes how the codec and library callers construct instances of a named type.
///
/// This is the single seam realizing "a named type can be constructed and may be declared
/// immutable": a qualified type name maps to a constructor function taking the gathered
/// `(field, value)` pairs (from either an it-block or a `make`-then-set sequence -- both
/// collapse to this one call here) and a `const` flag consulted by [`is_immutable`].
pub struct TypeEntry {
    pub const_: bool,
    pub make: Arc<dyn Fn(Vec<(Arc<str>, Value)>) -> Result<Value> + Send + Sync>,
}

pub struct TypeRegistry {
    entries: RwLock<HashMap<String, TypeEntry>>,
}

impl TypeRegistry {
    fn new() -> Self {
        TypeRegistry { entries: RwLock::new(HashMap::new()) }
    }

    pub fn global() -> &'static TypeRegistry {
        static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(TypeRegistry::new)
    }

    /// Registers a constructor for `qname`. `const_` marks the type as immutable-eligible.
    pub fn register(
        &self,
        qname: impl Into<String>,
        const_: bool,
        make: impl Fn(Vec<(Arc<str>, Value)>) -> Result<Value> + Send + Sync + 'static,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(qname.into(), TypeEntry { const_, make: Arc::new(make) });
    }

    /// Registers a plain field-bag complex type: `make` just builds a `Value::Complex` with
    /// the supplied fields under `qname`, with no custom constructor logic.
    pub fn register_plain(&self, qname: impl Into<String>, const_: bool) {
        let qname = qname.into();
        let tag: Arc<str> = qname.clone().into();
        self.register(qname, const_, move |fields| {
            Ok(Value::Complex(Arc::new(ComplexValue { type_name: tag.clone(), fields })))
        });
    }

    pub fn is_const(&self, qname: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(qname).map(|e| e.const_).unwrap_or(false)
    }

    pub fn contains(&self, qname: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(qname)
    }

    pub fn make(&self, qname: &str, fields: Vec<(Arc<str>, Value)>) -> Result<Value> {
        let make_fn = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(qname) {
                Some(entry) => entry.make.clone(),
                None => return Err(ConcurrentError::Parse {
                    line: 0,
                    msg: format!("unknown type {qname}"),
                }),
            }
        };
        make_fn(fields)
    }
}

/// True for every known-immutable kind, and for `Complex` values whose type is registered as
/// `const`, recursing into list/map elements and complex fields.
pub fn is_immutable(v: &Value) -> bool {
    match v {
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Decimal(_)
        | Value::Duration(_)
        | Value::Str(_)
        | Value::Uri(_)
        | Value::Unsafe(_) => true,
        Value::List(items) => items.iter().all(is_immutable),
        Value::Map(entries) => entries.iter().all(|(k, v)| is_immutable(k) && is_immutable(v)),
        Value::Complex(c) => {
            TypeRegistry::global().is_const(&c.type_name) && c.fields.iter().all(|(_, v)| is_immutable(&v))
        }
    }
}

/// Deep-immutable coercion. For the closed `Value` kinds this is a cheap validation (everything
/// but `Complex` is immutable by construction); for `Complex` it actually enforces the registry
/// check, which is where `NotImmutable` can genuinely fire.
pub fn to_immutable(v: Value) -> Result<Value> {
    if is_immutable(&v) {
        Ok(v)
    } else {
        Err(ConcurrentError::NotImmutable(describe(&v)))
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Complex(c) => format!("complex value of non-const type {}", c.type_name),
        other => format!("{other:?}"),
    }
}

/// Conversion into the boundary-checked `Value` representation. Implemented for everything the
/// runtime accepts at a `send`/`complete`/atomic-ref/map-store boundary; mirrors
/// `toImmutable(value)` from the external-interfaces collaborator list.
pub trait ToImmutable {
    fn to_immutable(self) -> Result<Value>;
}

impl ToImmutable for Value {
    fn to_immutable(self) -> Result<Value> {
        to_immutable(self)
    }
}

macro_rules! impl_to_immutable_via_value {
    ($($t:ty => $ctor:expr),* $(,)?) => {
        $(
            impl ToImmutable for $t {
                fn to_immutable(self) -> Result<Value> {
                    let ctor: fn($t) -> Value = $ctor;
                    Ok(ctor(self))
                }
            }
        )*
    };
}

impl_to_immutable_via_value! {
    bool => Value::Bool,
    i64 => Value::Int,
    f64 => Value::Float,
    Duration => Value::Duration,
}

impl ToImmutable for String {
    fn to_immutable(self) -> Result<Value> {
        Ok(Value::Str(self.into()))
    }
}

impl ToImmutable for &str {
    fn to_immutable(self) -> Result<Value> {
        Ok(Value::Str(self.into()))
    }
}

impl<T: ToImmutable> ToImmutable for Vec<T> {
    fn to_immutable(self) -> Result<Value> {
        let mut items = Vec::with_capacity(self.len());
        for item in self {
            items.push(item.to_immutable()?);
        }
        Ok(Value::list(items))
    }
}

impl<T: ToImmutable> ToImmutable for Option<T> {
    fn to_immutable(self) -> Result<Value> {
        match self {
            Some(v) => v.to_immutable(),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_immutable() {
        assert!(is_immutable(&Value::Int(3)));
        assert!(is_immutable(&Value::str("hi")));
        assert!(is_immutable(&Value::list(vec![Value::Int(1), Value::Bool(true)])));
    }

    #[test]
    fn unregistered_complex_is_not_immutable() {
        let v = Value::Complex(Arc::new(ComplexValue {
            type_name: "demo::Point".into(),
            fields: vec![("x".into(), Value::Int(1))],
        }));
        assert!(!is_immutable(&v));
        assert!(to_immutable(v).is_err());
    }

    #[test]
    fn registered_const_complex_is_immutable() {
        TypeRegistry::global().register_plain("demo::ConstPoint", true);
        let v = Value::Complex(Arc::new(ComplexValue {
            type_name: "demo::ConstPoint".into(),
            fields: vec![("x".into(), Value::Int(1))],
        }));
        assert!(is_immutable(&v));
    }

    #[test]
    fn unsafe_wrapper_is_always_immutable_and_identity_equal() {
        let u1 = Unsafe::new(vec![1, 2, 3]);
        let u2 = u1.clone();
        let u3 = Unsafe::new(vec![1, 2, 3]);
        assert!(is_immutable(&Value::Unsafe(u1.clone())));
        assert_eq!(Value::Unsafe(u1.clone()), Value::Unsafe(u2));
        assert_ne!(Value::Unsafe(u1), Value::Unsafe(u3));
    }
}
