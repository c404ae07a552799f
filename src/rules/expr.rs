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

//! Rule condition expressions: recursive-descent parser and evaluator.
//!
//! Field names on either side of a comparison are checked against the
//! field catalog at parse time, so an unknown name fails the whole rule
//! file load before any row is looked at. Evaluation is pure and purely
//! lexical: both operands are uppercased and compared as strings, with no
//! numeric interpretation. Logical operators evaluate both sides.

use crate::error::{Result, TrlError};
use crate::fields::FieldCatalog;
use crate::manifest::ManifestRow;
use crate::rules::token::{tokenize, CmpOp, Token, TokenCursor};

/// Right-hand side of a comparison.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rhs {
    Field(String),
    Literal(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    /// Unconditionally true; legal only as the entire condition.
    Any,
    /// True when the named field is present with a non-empty value.
    Present(String),
    Cmp { field: String, op: CmpOp, rhs: Rhs },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Compiles a condition string against the catalog.
pub fn compile(text: &str, catalog: &FieldCatalog) -> Result<Expr> {
    let tokens = tokenize(text)?;
    if tokens == [Token::Any] {
        return Ok(Expr::Any);
    }
    if tokens.contains(&Token::Any) {
        return Err(TrlError::Parse(format!(
            "ANY must be the sole token of a condition, got {text:?}"
        )));
    }

    let mut cursor = TokenCursor::new(tokens);
    let expr = parse_chain(&mut cursor, catalog)?;
    if !cursor.at_end() {
        return Err(TrlError::Parse(format!(
            "trailing tokens after a complete condition in {text:?}"
        )));
    }
    Ok(expr)
}

/// Left-associative chain of AND/OR nodes.
fn parse_chain(cursor: &mut TokenCursor, catalog: &FieldCatalog) -> Result<Expr> {
    let mut node = read_expr(cursor, catalog)?;
    loop {
        match cursor.peek() {
            Some(Token::And) => {
                cursor.advance();
                let right = read_expr(cursor, catalog)?;
                node = Expr::And(Box::new(node), Box::new(right));
            },
            Some(Token::Or) => {
                cursor.advance();
                let right = read_expr(cursor, catalog)?;
                node = Expr::Or(Box::new(node), Box::new(right));
            },
            _ => return Ok(node),
        }
    }
}

/// Parenthesization and negation, then the atomic forms.
fn read_expr(cursor: &mut TokenCursor, catalog: &FieldCatalog) -> Result<Expr> {
    match cursor.peek() {
        Some(Token::LParen) => {
            cursor.advance();
            let inner = parse_chain(cursor, catalog)?;
            cursor.expect(&Token::RParen)?;
            Ok(inner)
        },
        Some(Token::Not) => {
            cursor.advance();
            let inner = read_expr(cursor, catalog)?;
            Ok(Expr::Not(Box::new(inner)))
        },
        _ => read_actual_expr(cursor, catalog),
    }
}

/// A bare field-presence check, or a `field OP value-or-field` comparison
/// distinguished by one token of lookahead.
fn read_actual_expr(cursor: &mut TokenCursor, catalog: &FieldCatalog) -> Result<Expr> {
    let field = match cursor.advance() {
        Some(Token::Word(name)) => name,
        other => {
            return Err(TrlError::Parse(format!("expected a field name, found {other:?}")));
        },
    };
    check_field(&field, catalog)?;

    let op = match cursor.peek() {
        Some(Token::Op(op)) => *op,
        _ => return Ok(Expr::Present(field)),
    };
    cursor.advance();

    let rhs = match cursor.advance() {
        Some(Token::Word(name)) => {
            check_field(&name, catalog)?;
            Rhs::Field(name)
        },
        Some(Token::Str(literal)) => Rhs::Literal(literal),
        other => {
            return Err(TrlError::Parse(format!(
                "expected a field name or string literal after {}, found {other:?}",
                op.symbol()
            )));
        },
    };
    Ok(Expr::Cmp { field, op, rhs })
}

fn check_field(name: &str, catalog: &FieldCatalog) -> Result<()> {
    if !catalog.contains(name) {
        return Err(TrlError::Parse(format!("unknown field {name} in rule condition")));
    }
    Ok(())
}

impl Expr {
    /// Evaluates the condition against one row. Pure; no short-circuiting.
    pub fn eval(&self, row: &ManifestRow) -> bool {
        match self {
            Expr::Any => true,
            Expr::Present(field) => row.get_non_empty(field).is_some(),
            Expr::Cmp { field, op, rhs } => {
                let left = row.get(field).unwrap_or("").to_ascii_uppercase();
                let right = match rhs {
                    Rhs::Field(name) => row.get(name).unwrap_or("").to_ascii_uppercase(),
                    Rhs::Literal(literal) => literal.to_ascii_uppercase(),
                };
                match op {
                    CmpOp::Lt => left < right,
                    CmpOp::Le => left <= right,
                    CmpOp::Eq => left == right,
                    CmpOp::Ge => left >= right,
                    CmpOp::Gt => left > right,
                    CmpOp::Ne => left != right,
                }
            },
            Expr::And(left, right) => {
                let left = left.eval(row);
                let right = right.eval(row);
                left && right
            },
            Expr::Or(left, right) => {
                let left = left.eval(row);
                let right = right.eval(row);
                left || right
            },
            Expr::Not(inner) => !inner.eval(row),
        }
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn row(pairs: &[(&str, &str)]) -> crate::manifest::ManifestRow {
        let mut row = crate::manifest::ManifestRow::default();
        for (key, value) in pairs {
            row.set(key, value);
        }
        row
    }

    #[test]
    fn any_compiles_standalone_only() {
        use super::{compile, Expr};
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();

        let got = compile("ANY", &catalog).unwrap();
        assert_eq!(got, Expr::Any);
        assert!(got.eval(&row(&[])));

        assert!(compile("ANY AND SPECIES_CODE", &catalog).is_err());
        assert!(compile("SPECIES_CODE OR ANY", &catalog).is_err());
    }

    #[test]
    fn comparison_is_case_insensitive() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile("SPECIES_CODE == \"foo\"", &catalog).unwrap();

        assert!(expr.eval(&row(&[("SPECIES_CODE", "FOO")])));
        assert!(expr.eval(&row(&[("SPECIES_CODE", "foo")])));
        assert!(!expr.eval(&row(&[("SPECIES_CODE", "bar")])));
    }

    #[test]
    fn field_to_field_comparison_reads_both_sides() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile("CENTER_NAME == CENTER_PROJECT", &catalog).unwrap();

        assert!(expr.eval(&row(&[("CENTER_NAME", "wugsc"), ("CENTER_PROJECT", "WUGSC")])));
        assert!(!expr.eval(&row(&[("CENTER_NAME", "wugsc"), ("CENTER_PROJECT", "other")])));
    }

    #[test]
    fn comparisons_are_lexical_not_numeric() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile("INSERT_SIZE < \"9\"", &catalog).unwrap();

        // Lexically "10" < "9" even though numerically it is not.
        assert!(expr.eval(&row(&[("INSERT_SIZE", "10")])));
    }

    #[test]
    fn logic_chain_is_left_associative() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile(
            "SPECIES_CODE == \"a\" OR SPECIES_CODE == \"b\" AND STRAIN == \"s\"",
            &catalog,
        )
        .unwrap();

        // ((a OR b) AND strain): the OR result alone is not enough.
        assert!(!expr.eval(&row(&[("SPECIES_CODE", "a"), ("STRAIN", "x")])));
        assert!(expr.eval(&row(&[("SPECIES_CODE", "b"), ("STRAIN", "s")])));
    }

    #[test]
    fn parentheses_and_negation() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile("! (SPECIES_CODE == \"454\") AND STRAIN", &catalog).unwrap();

        assert!(expr.eval(&row(&[("SPECIES_CODE", "mouse"), ("STRAIN", "c57")])));
        assert!(!expr.eval(&row(&[("SPECIES_CODE", "454"), ("STRAIN", "c57")])));
        assert!(!expr.eval(&row(&[("SPECIES_CODE", "mouse")])));
    }

    #[test]
    fn presence_check_requires_non_empty_value() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let expr = compile("STRAIN", &catalog).unwrap();

        assert!(expr.eval(&row(&[("STRAIN", "c57")])));
        assert!(!expr.eval(&row(&[("STRAIN", "")])));
        assert!(!expr.eval(&row(&[])));
    }

    #[test]
    fn unknown_field_fails_at_parse_time() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();

        assert!(compile("NO_SUCH_FIELD == \"x\"", &catalog).is_err());
        assert!(compile("SPECIES_CODE == NO_SUCH_FIELD", &catalog).is_err());
    }

    #[test]
    fn malformed_conditions_fail_to_parse() {
        use super::compile;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();

        assert!(compile("(SPECIES_CODE", &catalog).is_err());
        assert!(compile("SPECIES_CODE ==", &catalog).is_err());
        assert!(compile("== \"x\"", &catalog).is_err());
        assert!(compile("SPECIES_CODE \"x\"", &catalog).is_err());
    }
}
