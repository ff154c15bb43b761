use serde::Serialize;

use super::ResultSet;
use crate::error::SqlPoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
}

/// The JSON body handed back to whoever asked for a query: either the
/// records and their count, or the error message with no results.
#[derive(Debug, Clone, Serialize)]
pub struct QueryDocument {
    pub status: QueryStatus,
    pub error: Option<String>,
    pub results: Option<ResultSet>,
    pub row_count: usize,
}

impl QueryDocument {
    #[must_use]
    pub fn success(results: ResultSet) -> Self {
        Self {
            status: QueryStatus::Success,
            error: None,
            row_count: results.len(),
            results: Some(results),
        }
    }

    /// Only the error's display text is exposed, never driver internals.
    #[must_use]
    pub fn failure(error: &SqlPoolError) -> Self {
        Self {
            status: QueryStatus::Error,
            error: Some(error.to_string()),
            results: None,
            row_count: 0,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

impl From<Result<ResultSet, SqlPoolError>> for QueryDocument {
    fn from(result: Result<ResultSet, SqlPoolError>) -> Self {
        match result {
            Ok(rs) => QueryDocument::success(rs),
            Err(err) => QueryDocument::failure(&err),
        }
    }
}
