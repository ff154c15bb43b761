//! Named-parameter translation for drivers that only bind by position.
//!
//! Callers write `:name` placeholders. SQL Server wants `@P1`, `@P2`, ... in
//! bind order, so each distinct name gets the next number on first use and
//! every later use of the same name reuses it. String literals, quoted and
//! bracketed identifiers, and comments are copied untouched.

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start,
    is_named_placeholder_start,
};
use scanner::{State, scan_identifier};

use crate::error::SqlPoolError;
use crate::types::{QueryParams, RowValues};

/// SQL rewritten to `@Pn` placeholders plus the values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalQuery<'p> {
    pub sql: String,
    pub values: Vec<&'p RowValues>,
}

/// Rewrite `:name` placeholders to `@P1..@Pn`.
///
/// Parameters that the SQL never mentions are ignored.
///
/// # Errors
/// Returns [`SqlPoolError::ParameterError`] when the SQL names a parameter
/// that `params` does not supply.
pub fn named_to_positional<'p>(
    sql: &str,
    params: &'p QueryParams,
) -> Result<PositionalQuery<'p>, SqlPoolError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<&'p str> = Vec::new();
    let mut values: Vec<&'p RowValues> = Vec::new();
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                if b == b'\'' {
                    state = State::SingleQuoted;
                } else if b == b'"' {
                    state = State::DoubleQuoted;
                } else if b == b'[' {
                    state = State::Bracketed;
                } else if is_line_comment_start(bytes, idx) {
                    state = State::LineComment;
                    idx += 1;
                } else if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(1);
                    idx += 1;
                } else if is_named_placeholder_start(bytes, idx) {
                    let end = scan_identifier(bytes, idx + 1);
                    let name = &sql[idx + 1..end];
                    let (key, value) = params.get_key_value(name).ok_or_else(|| {
                        SqlPoolError::ParameterError(format!("no value supplied for :{name}"))
                    })?;
                    let position = match order.iter().position(|n| *n == key.as_str()) {
                        Some(existing) => existing + 1,
                        None => {
                            order.push(key.as_str());
                            values.push(value);
                            order.len()
                        }
                    };
                    out.push_str(&sql[copied..idx]);
                    out.push_str(&format!("@P{position}"));
                    copied = end;
                    idx = end;
                    continue;
                }
            }
            State::SingleQuoted | State::DoubleQuoted | State::Bracketed => {
                let close = match state {
                    State::SingleQuoted => b'\'',
                    State::DoubleQuoted => b'"',
                    _ => b']',
                };
                if b == close {
                    if bytes.get(idx + 1) == Some(&close) {
                        idx += 1; // escaped
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
    out.push_str(&sql[copied.min(sql.len())..]);

    Ok(PositionalQuery { sql: out, values })
}
