// trl: Legacy DNA sequencer trace ingestion, validation, and normalization.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Tokenizer for rule condition expressions.

use crate::error::{Result, TrlError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Ne => "!=",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Not,
    Op(CmpOp),
    And,
    Or,
    Any,
    /// Double-quoted literal, quotes stripped.
    Str(String),
    /// Bare word: a field name.
    Word(String),
}

/// Single left-to-right scan over the condition text.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        let byte = bytes[idx];
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => idx += 1,
            b'(' => {
                tokens.push(Token::LParen);
                idx += 1;
            },
            b')' => {
                tokens.push(Token::RParen);
                idx += 1;
            },
            b'!' => {
                if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::Ne));
                    idx += 2;
                } else {
                    tokens.push(Token::Not);
                    idx += 1;
                }
            },
            b'<' => {
                if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::Le));
                    idx += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    idx += 1;
                }
            },
            b'>' => {
                if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    idx += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    idx += 1;
                }
            },
            b'=' => {
                if bytes.get(idx + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::Eq));
                    idx += 2;
                } else {
                    return Err(TrlError::Parse(format!(
                        "single = at position {idx} in condition {text:?}"
                    )));
                }
            },
            b'"' => {
                let end = bytes[idx + 1..]
                    .iter()
                    .position(|candidate| *candidate == b'"')
                    .ok_or_else(|| {
                        TrlError::Parse(format!("unterminated string literal in condition {text:?}"))
                    })?;
                let literal = &text[idx + 1..idx + 1 + end];
                tokens.push(Token::Str(literal.to_string()));
                idx += end + 2;
            },
            _ => {
                let start = idx;
                while idx < bytes.len() && !is_separator(bytes[idx]) {
                    idx += 1;
                }
                let word = &text[start..idx];
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "ANY" => Token::Any,
                    _ => Token::Word(word.to_string()),
                });
            },
        }
    }
    Ok(tokens)
}

fn is_separator(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'!' | b'<' | b'>' | b'=' | b'"')
}

/// Explicit cursor over the token stream for the recursive-descent parser.
pub struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    pub fn new(tokens: Vec<Token>) -> Self {
        TokenCursor { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token, which must equal `expected`.
    pub fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == *expected => Ok(()),
            other => Err(TrlError::Parse(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
