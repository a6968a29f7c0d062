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

//! Token catalogue for the textual value codec, matching `Token.py`'s integer constants one
//! for one (as a Rust enum rather than a set of `i32`s).

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Id,
    Bool,
    Str,
    Int,
    Float,
    Decimal,
    Duration,
    Uri,
    Null,
    Dot,
    Semicolon,
    Comma,
    Colon,
    DoubleColon,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    /// `[]`, tokenized as one unit the way `Token.py` does (`LRBRACKET`).
    EmptyBrackets,
    Eq,
    Pound,
    Question,
    At,
    Dollar,
    As,
    Using,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::Bool
                | TokenKind::Str
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::Decimal
                | TokenKind::Duration
                | TokenKind::Uri
                | TokenKind::Null
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of file",
            TokenKind::Id => "identifier",
            TokenKind::Bool => "Bool literal",
            TokenKind::Str => "String literal",
            TokenKind::Int => "Int literal",
            TokenKind::Float => "Float literal",
            TokenKind::Decimal => "Decimal literal",
            TokenKind::Duration => "Duration literal",
            TokenKind::Uri => "Uri literal",
            TokenKind::Null => "null",
            TokenKind::Dot => ".",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::DoubleColon => "::",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::EmptyBrackets => "[]",
            TokenKind::Eq => "=",
            TokenKind::Pound => "#",
            TokenKind::Question => "?",
            TokenKind::At => "@",
            TokenKind::Dollar => "$",
            TokenKind::As => "as",
            TokenKind::Using => "using",
        }
    }
}

/// One lexed token: its kind, the line it started on, and -- for `Id` or a literal kind -- the
/// payload. Literal payloads reuse [`Value`] directly rather than a separate literal type, since
/// every literal kind already has a matching `Value` variant.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub text: Option<String>,
    pub value: Option<Value>,
}

impl Token {
    pub fn simple(kind: TokenKind, line: u32) -> Token {
        Token { kind, line, text: None, value: None }
    }

    pub fn id(text: String, line: u32) -> Token {
        Token { kind: TokenKind::Id, line, text: Some(text), value: None }
    }

    pub fn literal(kind: TokenKind, value: Value, line: u32) -> Token {
        Token { kind, line, text: None, value: Some(value) }
    }
}
