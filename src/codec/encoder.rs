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

//! Writes a [`Value`] back out to the textual grammar [`crate::codec::decoder`] reads, matching
//! `ObjEncoder.py`'s literal spellings.

use std::fmt::Write as _;

use crate::errors::{ConcurrentError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Indents nested complex/collection bodies two spaces per level instead of writing them
    /// on one line.
    pub indent: bool,
    /// Omits `Null` complex-object fields instead of emitting `name=null`.
    pub skip_defaults: bool,
    /// Replaces an [`Value::Unsafe`] (which cannot be represented textually) with `null` instead
    /// of failing the whole encode.
    pub skip_errors: bool,
}

pub fn encode(value: &Value, opts: &EncodeOptions) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value, opts, 0)?;
    Ok(out)
}

/// As [`encode`], but writes directly to a character stream rather than building a `String` in
/// memory first -- the literal reading of `ObjEncoder.py`'s constructor, which takes an
/// `OutStream`. A write failure on `writer` surfaces as `ConcurrentError::Io` rather than a
/// value-shape error.
pub fn encode_to(writer: &mut impl std::io::Write, value: &Value, opts: &EncodeOptions) -> Result<()> {
    let text = encode(value, opts)?;
    writer.write_all(text.as_bytes()).map_err(ConcurrentError::from)
}

fn indent(out: &mut String, opts: &EncodeOptions, depth: u32) {
    if opts.indent {
        out.push('\n');
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn write_value(out: &mut String, value: &Value, opts: &EncodeOptions, depth: u32) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Float(f) => write_float(out, *f),
        Value::Decimal(text) => {
            let _ = write!(out, "{text}d");
        }
        Value::Duration(d) => {
            let _ = write!(out, "{}ns", d.as_nanos());
        }
        Value::Str(s) => write_quoted(out, s, '"'),
        Value::Uri(u) => write_quoted(out, u, '`'),
        Value::List(items) => write_list(out, items, opts, depth)?,
        Value::Map(entries) => write_map(out, entries, opts, depth)?,
        Value::Complex(c) => write_complex(out, c, opts, depth)?,
        Value::Unsafe(_) => {
            if opts.skip_errors {
                out.push_str("null");
            } else {
                return Err(ConcurrentError::Arg("cannot serialize an Unsafe value".into()));
            }
        }
    }
    Ok(())
}

fn write_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("sys::Float(\"NaN\")");
    } else if f == f64::INFINITY {
        out.push_str("sys::Float(\"INF\")");
    } else if f == f64::NEG_INFINITY {
        out.push_str("sys::Float(\"-INF\")");
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        let _ = write!(out, "{f:.1}f");
    } else {
        let _ = write!(out, "{f}f");
    }
}

fn write_quoted(out: &mut String, s: &str, quote: char) {
    out.push(quote);
    for c in s.chars() {
        match c {
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_list(out: &mut String, items: &[Value], opts: &EncodeOptions, depth: u32) -> Result<()> {
    if items.is_empty() {
        out.push_str("[,]");
        return Ok(());
    }
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        indent(out, opts, depth + 1);
        write_value(out, item, opts, depth + 1)?;
    }
    indent(out, opts, depth);
    out.push(']');
    Ok(())
}

fn write_map(out: &mut String, entries: &[(Value, Value)], opts: &EncodeOptions, depth: u32) -> Result<()> {
    if entries.is_empty() {
        out.push_str("[:]");
        return Ok(());
    }
    out.push('[');
    for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        indent(out, opts, depth + 1);
        write_value(out, k, opts, depth + 1)?;
        out.push(':');
        write_value(out, v, opts, depth + 1)?;
    }
    indent(out, opts, depth);
    out.push(']');
    Ok(())
}

fn write_complex(out: &mut String, c: &crate::value::ComplexValue, opts: &EncodeOptions, depth: u32) -> Result<()> {
    out.push_str(&c.type_name);
    out.push_str(" {");
    let mut wrote_any = false;
    for (name, value) in &c.fields {
        if opts.skip_defaults && *value == Value::Null {
            continue;
        }
        wrote_any = true;
        indent(out, opts, depth + 1);
        out.push_str(name);
        out.push('=');
        write_value(out, value, opts, depth + 1)?;
        out.push(';');
    }
    if wrote_any {
        indent(out, opts, depth);
    }
    out.push('}');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::decode;
    use crate::value::TypeRegistry;
    use std::time::Duration;

    fn roundtrip(v: &Value) -> Value {
        let text = encode(v, &EncodeOptions::default()).unwrap();
        decode(&text).unwrap()
    }

    #[test]
    fn encodes_primitives() {
        assert_eq!(encode(&Value::Int(42), &EncodeOptions::default()).unwrap(), "42");
        assert_eq!(encode(&Value::Bool(true), &EncodeOptions::default()).unwrap(), "true");
        assert_eq!(encode(&Value::Null, &EncodeOptions::default()).unwrap(), "null");
        assert_eq!(encode(&Value::str("hi"), &EncodeOptions::default()).unwrap(), "\"hi\"");
    }

    #[test]
    fn round_trips_list_and_map() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(roundtrip(&list), list);
        let map = Value::map(vec![(Value::str("a"), Value::Int(1))]);
        assert_eq!(roundtrip(&map), map);
        assert_eq!(roundtrip(&Value::list(Vec::new())), Value::list(Vec::new()));
        assert_eq!(roundtrip(&Value::map(Vec::new())), Value::map(Vec::new()));
    }

    #[test]
    fn round_trips_duration() {
        let d = Value::Duration(Duration::from_millis(250));
        assert_eq!(roundtrip(&d), d);
    }

    #[test]
    fn round_trips_non_finite_floats() {
        assert!(matches!(roundtrip(&Value::Float(f64::NAN)), Value::Float(f) if f.is_nan()));
        assert_eq!(roundtrip(&Value::Float(f64::INFINITY)), Value::Float(f64::INFINITY));
        assert_eq!(roundtrip(&Value::Float(f64::NEG_INFINITY)), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn round_trips_registered_complex_type() {
        TypeRegistry::global().register_plain("demo::codec::Encoded", false);
        let v = Value::Complex(std::sync::Arc::new(crate::value::ComplexValue {
            type_name: "demo::codec::Encoded".into(),
            fields: vec![("x".into(), Value::Int(1)), ("y".into(), Value::str("z"))],
        }));
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn unsafe_value_fails_unless_skip_errors() {
        let v = Value::Unsafe(crate::value::Unsafe::new(7i32));
        assert!(encode(&v, &EncodeOptions::default()).is_err());
        let opts = EncodeOptions { skip_errors: true, ..Default::default() };
        assert_eq!(encode(&v, &opts).unwrap(), "null");
    }

    #[test]
    fn encode_to_writes_the_same_bytes_as_encode() {
        let v = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let mut buf = Vec::new();
        encode_to(&mut buf, &v, &EncodeOptions::default()).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), encode(&v, &EncodeOptions::default()).unwrap());
    }
}
