// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison. Parentheses
//! group. Keywords and operators inside quoted strings are ignored.

use super::ast::{CompareOp, Expression, Literal};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionParseError {
    #[error("empty condition")]
    Empty,
    #[error("could not parse condition: {0}")]
    Comparison(String),
    #[error("could not parse literal: {0}")]
    Literal(String),
    #[error("unbalanced parentheses in: {0}")]
    Unbalanced(String),
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionParseError::Empty);
    }

    if let Some(inner) = strip_outer_parens(input)? {
        return parse(inner);
    }

    if let Some(pos) = find_top_level(input, " or ")? {
        let left = parse(&input[..pos])?;
        let right = parse(&input[pos + 4..])?;
        return Ok(Expression::Or(Box::new(left), Box::new(right)));
    }

    if let Some(pos) = find_top_level(input, " and ")? {
        let left = parse(&input[..pos])?;
        let right = parse(&input[pos + 5..])?;
        return Ok(Expression::And(Box::new(left), Box::new(right)));
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }

    match input {
        "true" => Ok(Expression::True),
        "false" => Ok(Expression::False),
        _ => parse_comparison(input),
    }
}

/// Returns the inside of `( ... )` when the parens wrap the whole input
fn strip_outer_parens(input: &str) -> Result<Option<&str>, ConditionParseError> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return Ok(None);
    }

    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 && i != input.len() - 1 {
                    // Closed before the end: `(a) and (b)`
                    return Ok(None);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ConditionParseError::Unbalanced(input.to_string()));
    }
    Ok(Some(&input[1..input.len() - 1]))
}

/// Byte offset of the first `needle` outside quotes and parentheses
fn find_top_level(input: &str, needle: &str) -> Result<Option<usize>, ConditionParseError> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err(ConditionParseError::Unbalanced(input.to_string()));
                }
            }
            (None, _) if depth == 0 && input[i..].starts_with(needle) => return Ok(Some(i)),
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ConditionParseError::Unbalanced(input.to_string()));
    }
    Ok(None)
}

fn parse_comparison(input: &str) -> Result<Expression, ConditionParseError> {
    // Two-character operators first so `>=` is not read as `>`
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (symbol, op) in operators {
        if let Some(pos) = find_top_level(input, symbol)? {
            let left = input[..pos].trim();
            if left.is_empty() {
                return Err(ConditionParseError::Comparison(input.to_string()));
            }
            let right = parse_literal(&input[pos + symbol.len()..])?;
            return Ok(Expression::Compare {
                left: left.to_string(),
                op,
                right,
            });
        }
    }

    Err(ConditionParseError::Comparison(input.to_string()))
}

fn parse_literal(input: &str) -> Result<Literal, ConditionParseError> {
    let input = input.trim();

    match input {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    let quoted = input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')));
    if quoted {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    input
        .parse::<f64>()
        .map(Literal::Number)
        .map_err(|_| ConditionParseError::Literal(input.to_string()))
}
