use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{ColumnData, FromSql, Query};

use super::client::MssqlClient;
use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Run `query` and collect its first result set; any further result sets in
/// the batch are read and discarded.
///
/// Statements that return no rows (DML, DDL) yield an empty result set.
pub async fn build_result_set(
    client: &mut MssqlClient,
    query: Query<'_>,
) -> Result<ResultSet, SqlPoolError> {
    let mut stream = query.query(client).await?;

    let Some(columns) = stream.columns().await? else {
        // drain so the connection is ready for the next request
        stream.into_results().await?;
        return Ok(ResultSet::default());
    };
    let column_names: Vec<String> = columns.iter().map(|col| col.name().to_string()).collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    // Rows of later result sets in the batch would not match these columns.
    for row in stream.into_first_result().await? {
        let mut row_values = Vec::with_capacity(col_count);
        row_values.extend(row.into_iter().map(column_value));
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Convert one column of a SQL Server row.
#[must_use]
pub fn column_value(data: ColumnData<'static>) -> RowValues {
    match data {
        ColumnData::U8(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map_or(RowValues::Null, RowValues::Int),
        ColumnData::F32(v) => v.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map_or(RowValues::Null, RowValues::Float),
        ColumnData::Bit(v) => v.map_or(RowValues::Null, RowValues::Bool),
        ColumnData::String(v) => v.map_or(RowValues::Null, |s| RowValues::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(RowValues::Null, |g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.map_or(RowValues::Null, |b| RowValues::Blob(b.into_owned())),
        ColumnData::Numeric(v) => v.map_or(RowValues::Null, |n| RowValues::Float(f64::from(n))),
        other => temporal_value(&other),
    }
}

/// Dates and times, whichever of the SQL Server temporal types they arrive as.
fn temporal_value(data: &ColumnData<'static>) -> RowValues {
    if let Ok(value) = NaiveDateTime::from_sql(data) {
        return value.map_or(RowValues::Null, RowValues::Timestamp);
    }
    if let Ok(value) = NaiveDate::from_sql(data) {
        return value.map_or(RowValues::Null, |d| {
            RowValues::Timestamp(d.and_time(NaiveTime::MIN))
        });
    }
    if let Ok(value) = DateTime::<Utc>::from_sql(data) {
        return value.map_or(RowValues::Null, |dt| RowValues::Timestamp(dt.naive_utc()));
    }
    if let Ok(value) = NaiveTime::from_sql(data) {
        return value.map_or(RowValues::Null, |t| RowValues::Text(t.to_string()));
    }
    RowValues::Text(format!("{data:?}"))
}

/// Bind parameters directly to the query for SQL Server
/// Return a query builder with parameters already bound
pub fn bind_query_params<'a>(query: &'a str, params: &[&RowValues]) -> Query<'a> {
    let mut query_builder = Query::new(query);

    for param in params {
        match param {
            RowValues::Int(i) => query_builder.bind(*i),
            RowValues::Float(f) => query_builder.bind(*f),
            RowValues::Text(s) => query_builder.bind(s.clone()),
            RowValues::Bool(b) => query_builder.bind(*b),
            RowValues::Timestamp(dt) => query_builder.bind(*dt),
            RowValues::Null => query_builder.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query_builder.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query_builder.bind(bytes.clone()),
        }
    }

    query_builder
}
