use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlPoolError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pool initialization error: {0}")]
    PoolInitError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    /// A single failed attempt at running `query`; `message` is the driver's message.
    #[error("Query execution failed: {message}")]
    QueryExecutionError { query: String, message: String },

    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl SqlPoolError {
    /// Wrap any lower-level failure as the caller-visible error for `query`.
    #[must_use]
    pub fn query_failed(query: impl Into<String>, source: &SqlPoolError) -> Self {
        let message = match source {
            // Already normalized by a nested call; keep the driver's message only.
            SqlPoolError::QueryExecutionError { message, .. } => message.clone(),
            other => other.to_string(),
        };
        SqlPoolError::QueryExecutionError {
            query: query.into(),
            message,
        }
    }

    /// The query text attached to a [`SqlPoolError::QueryExecutionError`].
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            SqlPoolError::QueryExecutionError { query, .. } => Some(query),
            _ => None,
        }
    }
}
