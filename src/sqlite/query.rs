use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::types::{QueryParams, RowValues};

/// Convert a single `RowValue` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns the rusqlite error if the column cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, SqlPoolError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Bind `params` by name and collect every row the statement produces.
///
/// DML statements run and yield an empty result set.
///
/// # Errors
/// Returns [`SqlPoolError::ParameterError`] for positional placeholders or a
/// name `params` does not supply; otherwise the rusqlite error.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    params: &QueryParams,
) -> Result<ResultSet, SqlPoolError> {
    bind_named(stmt, params)?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

fn bind_named(stmt: &mut Statement<'_>, params: &QueryParams) -> Result<(), SqlPoolError> {
    let names: Vec<Option<String>> = (1..=stmt.parameter_count())
        .map(|i| stmt.parameter_name(i).map(str::to_string))
        .collect();

    for (offset, name) in names.into_iter().enumerate() {
        let position = offset + 1;
        let name = name.ok_or_else(|| {
            SqlPoolError::ParameterError(format!(
                "positional placeholder at position {position}; use :name"
            ))
        })?;
        let key = name.trim_start_matches([':', '@', '$']);
        let value = params
            .get(key)
            .ok_or_else(|| SqlPoolError::ParameterError(format!("missing value for :{key}")))?;
        stmt.raw_bind_parameter(position, row_value_to_sqlite_value(value))?;
    }
    Ok(())
}
