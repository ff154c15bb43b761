use std::sync::Arc;

use tracing::{debug, error};

use crate::dispatch::WorkerPool;
use crate::error::SqlPoolError;
use crate::pool::SlotPool;
use crate::results::ResultSet;
use crate::rewrite::Rewriter;
use crate::types::QueryParams;

/// Runs one query: rewrite, lease a connection, run the blocking driver call
/// on a worker, release.
///
/// Failures are never retried here; each call is a single attempt.
#[derive(Debug)]
pub struct QueryExecutor {
    pool: Arc<SlotPool>,
    workers: Arc<WorkerPool>,
    rewriter: Rewriter,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(pool: Arc<SlotPool>, rewriter: Rewriter) -> Self {
        let workers = pool.workers().clone();
        Self {
            pool,
            workers,
            rewriter,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    #[must_use]
    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    /// Execute `query` with optional named parameters (`:name`).
    ///
    /// The connection goes back to the pool as soon as the driver call ends,
    /// whatever its outcome. If this future is dropped mid-call, the call runs
    /// to completion on its worker and the connection is released there.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::QueryExecutionError`] carrying the query text as
    /// the caller wrote it and the underlying error message.
    pub async fn execute(
        &self,
        query: &str,
        params: Option<&QueryParams>,
    ) -> Result<ResultSet, SqlPoolError> {
        let sql = self.rewriter.apply(query).into_owned();
        let params = params.cloned().unwrap_or_default();

        match self.run(sql.clone(), params).await {
            Ok(result_set) => Ok(result_set),
            Err(err) => {
                error!(query, sent = %sql, error = %err, "query execution failed");
                Err(SqlPoolError::query_failed(query, &err))
            }
        }
    }

    async fn run(&self, sql: String, params: QueryParams) -> Result<ResultSet, SqlPoolError> {
        let lease = self.pool.acquire().await?;
        debug!(slot = %lease.index(), "dispatching query");
        self.workers
            .run(move || {
                let mut lease = lease;
                let result = lease
                    .connection()
                    .and_then(|conn| conn.query(&sql, &params));
                drop(lease);
                result
            })
            .await?
    }
}
