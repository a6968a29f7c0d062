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

//! Character-level lexer for the textual value codec, matching `Tokenizer.py`.
//!
//! Operates over a `Vec<char>` (decode always starts from a complete in-memory `&str`, so there
//! is no streaming `InStream` to model) with one character of lookahead (`cur`/`peek`) just like
//! the source, plus the same single-token pushback the decoder's one-token dispatch needs.

use std::time::Duration;

use crate::codec::token::{Token, TokenKind};
use crate::errors::{ConcurrentError, Result};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharKind {
    Other,
    Space,
    Alpha,
    Digit,
}

fn classify(c: char) -> CharKind {
    match c {
        ' ' | '\n' | '\t' => CharKind::Space,
        'a'..='z' | 'A'..='Z' | '_' => CharKind::Alpha,
        '0'..='9' => CharKind::Digit,
        c if (c as u32) > 127 => CharKind::Alpha,
        _ => CharKind::Other,
    }
}

pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    cur: Option<char>,
    peek: Option<char>,
    line: u32,
    /// Stack of tokens to replay before resuming live lexing. The decoder's typed-collection
    /// lookahead (`[k:v] [...]`) needs to speculatively consume more than one token and restore
    /// them all on a failed match, so this is a stack rather than `Tokenizer.py`'s single-slot
    /// `reset`/`undo`.
    pushback: Vec<Token>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Tokenizer {
        // The codec never sees a standalone '\r': normalize CRLF/CR up front rather than
        // replicating `Tokenizer.py`'s char-by-char lookahead dance for it.
        let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
        let mut t = Tokenizer {
            chars: normalized.chars().collect(),
            pos: 0,
            cur: None,
            peek: None,
            line: 1,
            pushback: Vec::new(),
        };
        t.consume();
        t.consume();
        t
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Pushes `token` back onto the tokenizer; the next call to [`Tokenizer::next`] replays it
    /// instead of lexing. Callers restoring more than one token must push them in reverse order
    /// (last-consumed first) so they replay in their original order.
    pub fn undo(&mut self, token: Token) {
        self.pushback.push(token);
    }

    pub fn next(&mut self) -> Result<Token> {
        if let Some(t) = self.pushback.pop() {
            return Ok(t);
        }
        self.do_next()
    }

    fn raw_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn consume(&mut self) {
        if self.cur == Some('\n') {
            self.line += 1;
        }
        let c = self.raw_char();
        self.cur = self.peek;
        self.peek = c;
    }

    fn err(&self, msg: impl Into<String>) -> ConcurrentError {
        crate::errors::parse_error(self.line, msg.into())
    }

    fn do_next(&mut self) -> Result<Token> {
        loop {
            while self.cur.is_some_and(|c| classify(c) == CharKind::Space) {
                self.consume();
            }

            let c = match self.cur {
                None => return Ok(Token::simple(TokenKind::Eof, self.line)),
                Some(c) => c,
            };

            if classify(c) == CharKind::Alpha {
                return Ok(self.read_id());
            }
            if classify(c) == CharKind::Digit {
                return self.read_number(false);
            }

            match c {
                '+' => {
                    self.consume();
                    return self.read_number(false);
                }
                '-' => {
                    self.consume();
                    return self.read_number(true);
                }
                '"' => return self.read_str(),
                '\'' => return self.read_char_literal(),
                '`' => return self.read_uri(),
                '(' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::LParen, self.line));
                }
                ')' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::RParen, self.line));
                }
                ',' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Comma, self.line));
                }
                ';' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Semicolon, self.line));
                }
                '=' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Eq, self.line));
                }
                '{' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::LBrace, self.line));
                }
                '}' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::RBrace, self.line));
                }
                '#' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Pound, self.line));
                }
                '?' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Question, self.line));
                }
                '@' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::At, self.line));
                }
                '$' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::Dollar, self.line));
                }
                '.' => {
                    if self.peek.is_some_and(|p| classify(p) == CharKind::Digit) {
                        return self.read_number(false);
                    }
                    self.consume();
                    return Ok(Token::simple(TokenKind::Dot, self.line));
                }
                '[' => {
                    self.consume();
                    if self.cur == Some(']') {
                        self.consume();
                        return Ok(Token::simple(TokenKind::EmptyBrackets, self.line));
                    }
                    return Ok(Token::simple(TokenKind::LBracket, self.line));
                }
                ']' => {
                    self.consume();
                    return Ok(Token::simple(TokenKind::RBracket, self.line));
                }
                ':' => {
                    self.consume();
                    if self.cur == Some(':') {
                        self.consume();
                        return Ok(Token::simple(TokenKind::DoubleColon, self.line));
                    }
                    return Ok(Token::simple(TokenKind::Colon, self.line));
                }
                '/' => {
                    if self.peek == Some('/') {
                        self.skip_line_comment();
                        continue;
                    }
                    if self.peek == Some('*') {
                        self.skip_block_comment()?;
                        continue;
                    }
                    return Err(self.err(format!("Unexpected symbol: {c}")));
                }
                '*' => {
                    if self.peek == Some('*') {
                        self.skip_line_comment();
                        continue;
                    }
                    return Err(self.err(format!("Unexpected symbol: {c}")));
                }
                _ => return Err(self.err(format!("Unexpected symbol: {c}"))),
            }
        }
    }

    fn read_id(&mut self) -> Token {
        let line = self.line;
        let mut s = String::new();
        while let Some(c) = self.cur {
            if classify(c) == CharKind::Alpha || classify(c) == CharKind::Digit {
                s.push(c);
                self.consume();
            } else {
                break;
            }
        }
        match s.as_str() {
            "as" => Token::simple(TokenKind::As, line),
            "using" => Token::simple(TokenKind::Using, line),
            "true" => Token::literal(TokenKind::Bool, Value::Bool(true), line),
            "false" => Token::literal(TokenKind::Bool, Value::Bool(false), line),
            "null" => Token::literal(TokenKind::Null, Value::Null, line),
            _ => Token::id(s, line),
        }
    }

    fn digit_val(c: char) -> u32 {
        c.to_digit(10).unwrap()
    }

    fn read_number(&mut self, neg: bool) -> Result<Token> {
        let line = self.line;
        if self.cur == Some('0') && self.peek == Some('x') {
            return self.read_hex(line);
        }

        let mut whole: i128 = 0;
        let mut text: Option<String> = None;
        let mut whole_count = 0u32;

        while self.cur.is_some_and(|c| classify(c) == CharKind::Digit) {
            let c = self.cur.unwrap();
            match &mut text {
                Some(s) => s.push(c),
                None => {
                    whole = whole * 10 + Self::digit_val(c) as i128;
                    whole_count += 1;
                    if whole_count >= 18 {
                        let mut s = String::new();
                        if neg {
                            s.push('-');
                        }
                        s.push_str(&whole.to_string());
                        text = Some(s);
                    }
                }
            }
            self.consume();
            if self.cur == Some('_') {
                self.consume();
            }
        }

        let mut floating = false;
        if self.cur == Some('.') && self.peek.is_some_and(|p| classify(p) == CharKind::Digit) {
            floating = true;
            if text.is_none() {
                let mut s = String::new();
                if neg {
                    s.push('-');
                }
                s.push_str(&whole.to_string());
                text = Some(s);
            }
            text.as_mut().unwrap().push('.');
            self.consume();
            while self.cur.is_some_and(|c| classify(c) == CharKind::Digit) {
                text.as_mut().unwrap().push(self.cur.unwrap());
                self.consume();
                if self.cur == Some('_') {
                    self.consume();
                }
            }
        }

        if self.cur == Some('e') || self.cur == Some('E') {
            floating = true;
            if text.is_none() {
                let mut s = String::new();
                if neg {
                    s.push('-');
                }
                s.push_str(&whole.to_string());
                text = Some(s);
            }
            text.as_mut().unwrap().push('e');
            self.consume();
            if self.cur == Some('-') || self.cur == Some('+') {
                text.as_mut().unwrap().push(self.cur.unwrap());
                self.consume();
            }
            if !self.cur.is_some_and(|c| classify(c) == CharKind::Digit) {
                return Err(self.err("Expected exponent digits"));
            }
            while self.cur.is_some_and(|c| classify(c) == CharKind::Digit) {
                text.as_mut().unwrap().push(self.cur.unwrap());
                self.consume();
                if self.cur == Some('_') {
                    self.consume();
                }
            }
        }

        let mut dur_ns: i128 = -1;
        if self.cur.is_some_and(|c| ('d'..='s').contains(&c)) {
            if self.cur == Some('n') && self.peek == Some('s') {
                self.consume();
                self.consume();
                dur_ns = 1;
            } else if self.cur == Some('m') && self.peek == Some('s') {
                self.consume();
                self.consume();
                dur_ns = 1_000_000;
            } else if self.cur == Some('s') && self.peek == Some('e') {
                self.consume();
                self.consume();
                if self.cur != Some('c') {
                    return Err(self.err("Expected 'sec' in Duration literal"));
                }
                self.consume();
                dur_ns = 1_000_000_000;
            } else if self.cur == Some('m') && self.peek == Some('i') {
                self.consume();
                self.consume();
                if self.cur != Some('n') {
                    return Err(self.err("Expected 'min' in Duration literal"));
                }
                self.consume();
                dur_ns = 60_000_000_000;
            } else if self.cur == Some('h') && self.peek == Some('r') {
                self.consume();
                self.consume();
                dur_ns = 3_600_000_000_000;
            } else if self.cur == Some('d') && self.peek == Some('a') {
                self.consume();
                self.consume();
                if self.cur != Some('y') {
                    return Err(self.err("Expected 'day' in Duration literal"));
                }
                self.consume();
                dur_ns = 86_400_000_000_000;
            }
        }

        let mut float_suffix = false;
        let mut decimal_suffix = false;
        if self.cur == Some('f') || self.cur == Some('F') {
            self.consume();
            float_suffix = true;
        } else if self.cur == Some('d') || self.cur == Some('D') {
            self.consume();
            decimal_suffix = true;
        }

        if neg {
            whole = -whole;
        }

        let literal_text = text.clone().unwrap_or_else(|| whole.to_string());

        if float_suffix {
            let f: f64 = literal_text
                .parse()
                .map_err(|_| self.err(format!("Invalid numeric literal: {literal_text}")))?;
            return Ok(Token::literal(TokenKind::Float, Value::Float(f), line));
        }

        if decimal_suffix || floating {
            if dur_ns > 0 {
                let scaled: f64 = literal_text
                    .parse::<f64>()
                    .map_err(|_| self.err(format!("Invalid numeric literal: {literal_text}")))?;
                let ns = (scaled * dur_ns as f64).round() as i64;
                return Ok(Token::literal(TokenKind::Duration, Value::Duration(Duration::from_nanos(ns.max(0) as u64)), line));
            }
            return Ok(Token::literal(TokenKind::Decimal, Value::Decimal(literal_text.into()), line));
        }

        let n: i64 = literal_text
            .parse()
            .map_err(|_| self.err(format!("Invalid numeric literal: {literal_text}")))?;
        if dur_ns > 0 {
            return Ok(Token::literal(TokenKind::Duration, Value::Duration(Duration::from_nanos((n as i128 * dur_ns) as u64)), line));
        }
        Ok(Token::literal(TokenKind::Int, Value::Int(n), line))
    }

    fn read_hex(&mut self, line: u32) -> Result<Token> {
        self.consume(); // 0
        self.consume(); // x
        let first = self.hex_digit(self.cur);
        if first < 0 {
            return Err(self.err("Expecting hex number"));
        }
        let mut val: i64 = first as i64;
        self.consume();
        let mut nibbles = 1u32;
        loop {
            let nib = self.hex_digit(self.cur);
            if nib < 0 {
                if self.cur == Some('_') {
                    self.consume();
                    continue;
                }
                break;
            }
            nibbles += 1;
            if nibbles > 16 {
                return Err(self.err("Hex literal too big"));
            }
            val = (val << 4) + nib as i64;
            self.consume();
        }
        Ok(Token::literal(TokenKind::Int, Value::Int(val), line))
    }

    fn hex_digit(&self, c: Option<char>) -> i32 {
        match c {
            Some(c @ '0'..='9') => c as i32 - '0' as i32,
            Some(c @ 'a'..='f') => c as i32 - 'a' as i32 + 10,
            Some(c @ 'A'..='F') => c as i32 - 'A' as i32 + 10,
            _ => -1,
        }
    }

    fn read_str(&mut self) -> Result<Token> {
        let line = self.line;
        self.consume(); // opening quote
        let mut s = String::new();
        loop {
            match self.cur {
                Some('"') => {
                    self.consume();
                    break;
                }
                None => return Err(self.err("Unexpected end of string")),
                Some('$') => return Err(self.err("Interpolated strings unsupported")),
                Some('\\') => s.push(self.read_escape()?),
                Some(c) => {
                    s.push(c);
                    self.consume();
                }
            }
        }
        Ok(Token::literal(TokenKind::Str, Value::str(s), line))
    }

    fn read_char_literal(&mut self) -> Result<Token> {
        let line = self.line;
        self.consume(); // opening tick
        let c = if self.cur == Some('\\') {
            self.read_escape()?
        } else {
            let c = self.cur.ok_or_else(|| self.err("Unexpected end of char literal"))?;
            self.consume();
            c
        };
        if self.cur != Some('\'') {
            return Err(self.err("Expecting ' close of char literal"));
        }
        self.consume();
        Ok(Token::literal(TokenKind::Int, Value::Int(c as i64), line))
    }

    fn read_uri(&mut self) -> Result<Token> {
        let line = self.line;
        self.consume(); // opening backtick
        let mut s = String::new();
        loop {
            match self.cur {
                None => return Err(self.err("Unexpected end of uri")),
                Some('\\') => s.push(self.read_escape()?),
                Some('`') => {
                    self.consume();
                    break;
                }
                Some(c) => {
                    s.push(c);
                    self.consume();
                }
            }
        }
        Ok(Token::literal(TokenKind::Uri, Value::Uri(s.into()), line))
    }

    fn read_escape(&mut self) -> Result<char> {
        self.consume(); // backslash
        let c = self.cur.ok_or_else(|| self.err("Unexpected end of escape sequence"))?;
        match c {
            'b' => {
                self.consume();
                Ok('\u{8}')
            }
            'f' => {
                self.consume();
                Ok('\u{c}')
            }
            'n' => {
                self.consume();
                Ok('\n')
            }
            'r' => {
                self.consume();
                Ok('\r')
            }
            't' => {
                self.consume();
                Ok('\t')
            }
            '$' => {
                self.consume();
                Ok('$')
            }
            '"' => {
                self.consume();
                Ok('"')
            }
            '\'' => {
                self.consume();
                Ok('\'')
            }
            '`' => {
                self.consume();
                Ok('`')
            }
            '\\' => {
                self.consume();
                Ok('\\')
            }
            'u' => {
                self.consume();
                let mut val: u32 = 0;
                for _ in 0..4 {
                    let nib = self.hex_digit(self.cur);
                    if nib < 0 {
                        return Err(self.err("Invalid hex value for \\uxxxx"));
                    }
                    val = (val << 4) | nib as u32;
                    self.consume();
                }
                char::from_u32(val).ok_or_else(|| self.err("Invalid \\uxxxx codepoint"))
            }
            _ => Err(self.err("Invalid escape sequence")),
        }
    }

    fn skip_line_comment(&mut self) {
        self.consume();
        self.consume();
        loop {
            match self.cur {
                Some('\n') => {
                    self.consume();
                    break;
                }
                None => break,
                Some(_) => self.consume(),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        self.consume(); // /
        self.consume(); // *
        let mut depth = 1;
        loop {
            if self.cur == Some('*') && self.peek == Some('/') {
                self.consume();
                self.consume();
                depth -= 1;
                if depth <= 0 {
                    return Ok(());
                }
                continue;
            }
            if self.cur == Some('/') && self.peek == Some('*') {
                self.consume();
                self.consume();
                depth += 1;
                continue;
            }
            if self.cur.is_none() {
                return Err(self.err("Unterminated block comment"));
            }
            self.consume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut t = Tokenizer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = t.next().unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn symbols_and_brackets() {
        assert_eq!(
            kinds("{ } ( ) [ ] [] : :: . , ; = # ? @ $"),
            vec![
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::EmptyBrackets,
                TokenKind::Colon,
                TokenKind::DoubleColon,
                TokenKind::Dot,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Eq,
                TokenKind::Pound,
                TokenKind::Question,
                TokenKind::At,
                TokenKind::Dollar,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literal_forms() {
        let mut t = Tokenizer::new("42 -7 3.14 1.5f 2d 1_000 0xFF 5sec 10ms");
        let expect = [
            (TokenKind::Int, None),
            (TokenKind::Int, None),
            (TokenKind::Decimal, None),
            (TokenKind::Float, Some(1.5)),
            (TokenKind::Decimal, None),
            (TokenKind::Int, None),
            (TokenKind::Int, Some(255.0)),
            (TokenKind::Duration, None),
            (TokenKind::Duration, None),
        ];
        for (kind, f) in expect {
            let tok = t.next().unwrap();
            assert_eq!(tok.kind, kind);
            if let Some(expected) = f {
                if let Some(Value::Float(v)) = tok.value {
                    assert_eq!(v, expected);
                } else if let Some(Value::Int(v)) = tok.value {
                    assert_eq!(v as f64, expected);
                }
            }
        }
    }

    #[test]
    fn truncated_duration_suffix_is_parse_error() {
        let mut t = Tokenizer::new("1da");
        assert!(t.next().is_err());
    }

    #[test]
    fn string_escapes_round_trip() {
        let mut t = Tokenizer::new("\"a\\nb\\tc\\\"d\"");
        let tok = t.next().unwrap();
        assert_eq!(tok.value.unwrap().as_str().unwrap(), "a\nb\tc\"d");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("// line\n/* block */ true ** also line\n"), vec![TokenKind::Bool, TokenKind::Eof]);
    }

    #[test]
    fn pushback_replays_token() {
        let mut t = Tokenizer::new("true false");
        let first = t.next().unwrap();
        t.undo(first.clone());
        let replayed = t.next().unwrap();
        assert_eq!(replayed.kind, first.kind);
        let second = t.next().unwrap();
        assert_eq!(second.kind, TokenKind::Bool);
    }
}
