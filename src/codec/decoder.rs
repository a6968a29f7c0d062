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

//! Recursive-descent decoder producing a [`Value`] tree, matching `ObjDecoder.py`'s grammar: this
//! crate has no pod/type reflection system, so the decoder's complex-object path goes through
//! [`TypeRegistry`] rather than calling a live constructor method, and the `type(str)`/`type#slot`
//! forms are dropped except for the one built-in `sys::Float("NaN"|"INF"|"-INF")` spelling
//! `ObjEncoder.py` uses for non-finite floats.

use crate::codec::token::{Token, TokenKind};
use crate::codec::tokenizer::Tokenizer;
use crate::errors::{ConcurrentError, Result};
use crate::value::{TypeRegistry, Value};

enum UsingEntry {
    Pod(String),
    Type { qname: String, alias: String },
}

pub struct Decoder {
    tokenizer: Tokenizer,
    cur: Token,
    usings: Vec<UsingEntry>,
}

/// Parses `text` into a [`Value`]. Equivalent to `ObjDecoder.decode(s)`.
pub fn decode(text: &str) -> Result<Value> {
    Decoder::new(text)?.read_obj()
}

impl Decoder {
    fn new(text: &str) -> Result<Decoder> {
        let mut tokenizer = Tokenizer::new(text);
        let cur = tokenizer.next()?;
        Ok(Decoder { tokenizer, cur, usings: Vec::new() })
    }

    fn bump(&mut self) -> Result<()> {
        self.cur = self.tokenizer.next()?;
        Ok(())
    }

    fn err(&self, msg: impl Into<String>) -> ConcurrentError {
        crate::errors::parse_error(self.cur.line, msg.into())
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.cur.kind != kind {
            return Err(self.err(format!("{what}, not '{}'", self.cur.kind.describe())));
        }
        let tok = self.cur.clone();
        self.bump()?;
        Ok(tok)
    }

    fn expect_id(&mut self, what: &str) -> Result<String> {
        let tok = self.expect(TokenKind::Id, what)?;
        Ok(tok.text.unwrap())
    }

    fn read_obj(&mut self) -> Result<Value> {
        self.read_header()?;
        self.read_value()
    }

    fn read_header(&mut self) -> Result<()> {
        while self.cur.kind == TokenKind::Using {
            self.read_using()?;
        }
        Ok(())
    }

    fn read_using(&mut self) -> Result<()> {
        let line = self.cur.line;
        self.bump()?;
        let pod = self.expect_id("Expecting pod name")?;
        if self.cur.kind != TokenKind::DoubleColon {
            self.end_of_stmt(line)?;
            self.usings.push(UsingEntry::Pod(pod));
            return Ok(());
        }
        self.bump()?;
        let type_name = self.expect_id("Expecting type name")?;
        let mut alias = type_name.clone();
        if self.cur.kind == TokenKind::As {
            self.bump()?;
            alias = self.expect_id("Expecting using as name")?;
        }
        self.end_of_stmt(line)?;
        self.usings.push(UsingEntry::Type { qname: format!("{pod}::{type_name}"), alias });
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value> {
        if self.cur.kind.is_literal() {
            let v = self.cur.value.clone().expect("literal token carries a value");
            self.bump()?;
            return Ok(v);
        }

        if self.cur.kind == TokenKind::LBracket {
            // `[type]` prefix before the real list/map literal (e.g. `[sys::Str:sys::Int]
            // ["a":1]`): speculatively consume a bracketed type signature and, if it's
            // immediately followed by the real collection, discard it (this crate's untyped
            // `Value` has no slot to record it in) before falling through.
            self.try_skip_bracketed_type_sig()?;
            return self.read_collection();
        }
        if self.cur.kind == TokenKind::EmptyBrackets {
            return self.read_collection();
        }

        let line = self.cur.line;
        let raw_name = self.expect_id("Expected value or type name")?;
        let qname = if self.cur.kind == TokenKind::DoubleColon {
            self.bump()?;
            let type_name = self.expect_id("Expecting type name")?;
            format!("{raw_name}::{type_name}")
        } else {
            self.resolve_type_name(&raw_name)
        };

        if self.cur.kind == TokenKind::LParen {
            return self.read_simple(line, &qname);
        }
        if self.cur.kind == TokenKind::LBracket || self.cur.kind == TokenKind::EmptyBrackets {
            // `type[...]` typed-collection form (e.g. `sys::Int[1,2,3]`); the element type is
            // likewise discarded, matching the bracketed-prefix case above.
            return self.read_collection();
        }
        self.read_complex(line, &qname)
    }

    /// Attempts to consume a `[` type-path (`:` type-path)? `]` sequence that is immediately
    /// followed by another `[`/`[]` (the real collection literal). On success, leaves `self.cur`
    /// positioned at that following bracket and returns `true`. On any mismatch, restores every
    /// token it looked at so the caller can re-parse the original `[` as the actual literal.
    fn try_skip_bracketed_type_sig(&mut self) -> Result<bool> {
        let mut consumed = vec![self.cur.clone()];
        self.bump()?;
        loop {
            match self.cur.kind {
                TokenKind::Id | TokenKind::DoubleColon | TokenKind::Colon | TokenKind::Question => {
                    consumed.push(self.cur.clone());
                    self.bump()?;
                }
                TokenKind::RBracket => {
                    consumed.push(self.cur.clone());
                    self.bump()?;
                    break;
                }
                _ => {
                    consumed.push(self.cur.clone());
                    self.restore(consumed)?;
                    return Ok(false);
                }
            }
        }
        if self.cur.kind == TokenKind::LBracket || self.cur.kind == TokenKind::EmptyBrackets {
            return Ok(true);
        }
        consumed.push(self.cur.clone());
        self.restore(consumed)?;
        Ok(false)
    }

    /// Restores `tokens` (in the order they were originally read) so that `self.cur` becomes
    /// `tokens[0]` and the rest replay, in order, from subsequent `bump()` calls.
    fn restore(&mut self, mut tokens: Vec<Token>) -> Result<()> {
        let new_cur = tokens.remove(0);
        for t in tokens.into_iter().rev() {
            self.tokenizer.undo(t);
        }
        self.cur = new_cur;
        Ok(())
    }

    /// The one surviving `type(str)` form: `sys::Float("NaN"|"INF"|"-INF")`, matching
    /// `ObjEncoder.py`'s spelling for non-finite floats. Any other type-with-call-parens is a
    /// parse error -- the general `fromStr` mechanism has no reflection target in this crate.
    fn read_simple(&mut self, line: u32, qname: &str) -> Result<Value> {
        self.bump()?; // (
        let text_tok = self.expect(TokenKind::Str, "Expected string literal for simple")?;
        self.expect(TokenKind::RParen, "Expected ) in simple")?;
        let text = text_tok.value.and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
        if qname == "sys::Float" || qname == "Float" {
            return match text.as_str() {
                "NaN" => Ok(Value::Float(f64::NAN)),
                "INF" => Ok(Value::Float(f64::INFINITY)),
                "-INF" => Ok(Value::Float(f64::NEG_INFINITY)),
                other => other
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| crate::errors::parse_error(line, format!("Invalid Float(\"{other}\")"))),
            };
        }
        Err(crate::errors::parse_error(line, format!("Unsupported simple literal for type {qname}")))
    }

    fn read_complex(&mut self, line: u32, qname: &str) -> Result<Value> {
        let mut fields: Vec<(std::sync::Arc<str>, Value)> = Vec::new();

        if self.cur.kind == TokenKind::LBrace {
            self.bump()?;
            while self.cur.kind != TokenKind::RBrace {
                let field_line = self.cur.line;
                let name = self.expect_id("Expected field name")?;
                self.expect(TokenKind::Eq, &format!("Expected '=' after field {name}"))?;
                let value = self.read_value()?;
                fields.push((name.into(), value));

                if self.cur.kind == TokenKind::Comma {
                    self.bump()?;
                } else {
                    self.end_of_stmt(field_line)?;
                }
            }
            self.expect(TokenKind::RBrace, "Expected '}'")?;
        }

        TypeRegistry::global().make(qname, fields).map_err(|e| match e {
            ConcurrentError::Parse { msg, .. } => crate::errors::parse_error(line, msg),
            other => other,
        })
    }

    fn read_collection(&mut self) -> Result<Value> {
        if self.cur.kind == TokenKind::EmptyBrackets {
            self.bump()?;
            return Ok(Value::list(Vec::new()));
        }
        self.bump()?; // [

        if self.cur.kind == TokenKind::Comma {
            self.bump()?;
            self.expect(TokenKind::RBracket, "Expecting ']'")?;
            return Ok(Value::list(Vec::new()));
        }
        if self.cur.kind == TokenKind::Colon {
            self.bump()?;
            self.expect(TokenKind::RBracket, "Expecting ']'")?;
            return Ok(Value::map(Vec::new()));
        }

        let first = self.read_value()?;

        if self.cur.kind == TokenKind::Colon {
            self.bump()?;
            let first_val = self.read_value()?;
            let mut entries = vec![(first, first_val)];
            while self.cur.kind != TokenKind::RBracket {
                self.expect(TokenKind::Comma, "Expected ','")?;
                if self.cur.kind == TokenKind::RBracket {
                    break;
                }
                let k = self.read_value()?;
                self.expect(TokenKind::Colon, "Expected ':'")?;
                let v = self.read_value()?;
                entries.push((k, v));
            }
            self.expect(TokenKind::RBracket, "Expected ']'")?;
            Ok(Value::map(entries))
        } else {
            let mut items = vec![first];
            while self.cur.kind != TokenKind::RBracket {
                self.expect(TokenKind::Comma, "Expected ','")?;
                if self.cur.kind == TokenKind::RBracket {
                    break;
                }
                items.push(self.read_value()?);
            }
            self.expect(TokenKind::RBracket, "Expected ']'")?;
            Ok(Value::list(items))
        }
    }

    /// Bare (non-`::`) type names resolve against recorded `using` statements: an explicit
    /// `using pod::Type [as alias]` wins by alias, otherwise `using pod` is tried by probing the
    /// registry for `pod::name`. Falls back to the raw name, letting `TypeRegistry::make` report
    /// `unknown type`.
    fn resolve_type_name(&self, raw: &str) -> String {
        for using in &self.usings {
            if let UsingEntry::Type { qname, alias } = using {
                if alias == raw {
                    return qname.clone();
                }
            }
        }
        for using in &self.usings {
            if let UsingEntry::Pod(pod) = using {
                let candidate = format!("{pod}::{raw}");
                if TypeRegistry::global().contains(&candidate) {
                    return candidate;
                }
            }
        }
        raw.to_string()
    }

    fn end_of_stmt(&mut self, last_line: u32) -> Result<()> {
        if self.cur.kind == TokenKind::Eof {
            return Ok(());
        }
        if self.cur.kind == TokenKind::Semicolon {
            self.bump()?;
            return Ok(());
        }
        if last_line < self.cur.line {
            return Ok(());
        }
        if self.cur.kind == TokenKind::RBrace {
            return Ok(());
        }
        Err(self.err(format!("Expected end of statement; not '{}'", self.cur.kind.describe())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_literals() {
        assert_eq!(decode("42").unwrap(), Value::Int(42));
        assert_eq!(decode("true").unwrap(), Value::Bool(true));
        assert_eq!(decode("null").unwrap(), Value::Null);
        assert_eq!(decode("\"hi\"").unwrap(), Value::str("hi"));
    }

    #[test]
    fn decodes_list_and_map() {
        assert_eq!(decode("[1, 2, 3]").unwrap(), Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(decode("[,]").unwrap(), Value::list(Vec::new()));
        assert_eq!(decode("[:]").unwrap(), Value::map(Vec::new()));
        assert_eq!(
            decode("[\"a\":1, \"b\":2]").unwrap(),
            Value::map(vec![(Value::str("a"), Value::Int(1)), (Value::str("b"), Value::Int(2))])
        );
    }

    #[test]
    fn typed_map_prefix_is_discarded() {
        let v = decode("[sys::Str:sys::Int] [\"a\":1, \"b\":2]").unwrap();
        assert_eq!(v, Value::map(vec![(Value::str("a"), Value::Int(1)), (Value::str("b"), Value::Int(2))]));
    }

    #[test]
    fn typed_list_prefix_form_is_discarded() {
        assert_eq!(decode("sys::Int[1, 2, 3]").unwrap(), Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(decode("sys::Int[]").unwrap(), Value::list(Vec::new()));
    }

    #[test]
    fn standalone_empty_map_literal_is_not_mistaken_for_a_type_prefix() {
        assert_eq!(decode("[[:], 1]").unwrap(), Value::list(vec![Value::map(Vec::new()), Value::Int(1)]));
    }

    #[test]
    fn bracketed_type_elements_still_parse_as_ordinary_list_items() {
        TypeRegistry::global().register_plain("demo::codec::Tagged", false);
        let v = decode("[demo::codec::Tagged{x=1}, demo::codec::Tagged{x=2}]").unwrap();
        match v {
            Value::List(items) => {
                assert_eq!(items.len(), 2);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn decodes_registered_complex_type() {
        TypeRegistry::global().register_plain("demo::codec::Point", false);
        let v = decode("demo::codec::Point { x=1; y=2 }").unwrap();
        match v {
            Value::Complex(c) => {
                assert_eq!(c.type_name.as_ref(), "demo::codec::Point");
                assert_eq!(c.field("x"), Some(&Value::Int(1)));
                assert_eq!(c.field("y"), Some(&Value::Int(2)));
            }
            other => panic!("expected complex, got {other:?}"),
        }
    }

    #[test]
    fn using_alias_resolves_bare_type_name() {
        TypeRegistry::global().register_plain("demo::codec::Widget", false);
        let v = decode("using demo::codec::Widget as W\nW { name=\"a\" }").unwrap();
        assert!(matches!(v, Value::Complex(c) if c.type_name.as_ref() == "demo::codec::Widget"));
    }

    #[test]
    fn unknown_type_is_parse_error() {
        assert!(decode("demo::codec::NoSuchType {}").is_err());
    }

    #[test]
    fn float_simple_form_round_trips_non_finite() {
        assert!(matches!(decode("sys::Float(\"NaN\")").unwrap(), Value::Float(f) if f.is_nan()));
        assert_eq!(decode("sys::Float(\"INF\")").unwrap(), Value::Float(f64::INFINITY));
        assert_eq!(decode("sys::Float(\"-INF\")").unwrap(), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn end_of_statement_accepts_newline_before_brace() {
        TypeRegistry::global().register_plain("demo::codec::Newline", false);
        let v = decode("demo::codec::Newline { x=1\n}").unwrap();
        assert!(matches!(v, Value::Complex(c) if c.field("x") == Some(&Value::Int(1))));
    }
}
