use std::sync::Arc;

use tracing::info;

use crate::config::{ConnectionArgs, EngineConfig, PoolConfig};
use crate::dispatch::WorkerPool;
use crate::driver::Connector;
use crate::engine::Engine;
use crate::error::SqlPoolError;
use crate::executor::QueryExecutor;
use crate::pool::{PoolStats, SlotPool, WarmUpReport};
use crate::results::ResultSet;
use crate::rewrite::Rewriter;
use crate::types::{Dialect, QueryParams};

/// Engine, worker pool, slot pool and executor wired together.
///
/// Build one per process at start-up and clone it into every task that needs
/// the database; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    executor: Arc<QueryExecutor>,
}

impl Database {
    /// Validate the settings, start the workers and open the pool.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] for invalid settings and
    /// [`SqlPoolError::PoolInitError`] when no connection could be opened.
    pub async fn connect(
        engine_config: EngineConfig,
        pool_config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SqlPoolError> {
        pool_config.validate()?;
        let dialect = engine_config.dialect;
        let engine = Engine::create(engine_config, connector)?;
        let workers = Arc::new(WorkerPool::new(pool_config.workers)?);

        // Opening connections blocks, so it happens on a worker.
        let pool_workers = workers.clone();
        let pool = workers
            .run(move || SlotPool::initialize(engine, pool_workers, pool_config))
            .await??;

        let executor = QueryExecutor::new(Arc::new(pool), Rewriter::for_dialect(dialect));
        info!(dialect = ?dialect, "database ready");
        Ok(Self {
            executor: Arc::new(executor),
        })
    }

    /// Connect with settings from the command line or the environment, using
    /// the built-in driver for the configured dialect.
    ///
    /// # Errors
    /// See [`Database::connect`]; also fails if the dialect's driver was not compiled in.
    pub async fn from_args(args: ConnectionArgs) -> Result<Self, SqlPoolError> {
        let (engine_config, pool_config) = args.into_settings();
        let connector = connector_for(engine_config.dialect)?;
        Self::connect(engine_config, pool_config, connector).await
    }

    /// Run `query`; see [`QueryExecutor::execute`].
    ///
    /// # Errors
    /// Returns [`SqlPoolError::QueryExecutionError`] on any failure.
    pub async fn execute_query(
        &self,
        query: &str,
        params: Option<&QueryParams>,
    ) -> Result<ResultSet, SqlPoolError> {
        self.executor.execute(query, params).await
    }

    /// Probe every pooled connection once.
    pub async fn warm_up(&self) -> WarmUpReport {
        self.executor.pool().warm_up().await
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.executor.pool().stats()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SlotPool> {
        self.executor.pool()
    }

    #[must_use]
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}

/// The built-in driver for `dialect`.
///
/// # Errors
/// Returns [`SqlPoolError::ConfigError`] if the crate was built without that driver.
pub fn connector_for(dialect: Dialect) -> Result<Arc<dyn Connector>, SqlPoolError> {
    match dialect {
        #[cfg(feature = "mssql")]
        Dialect::Mssql => Ok(Arc::new(crate::mssql::MssqlConnector)),
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => Ok(Arc::new(crate::sqlite::SqliteConnector)),
        #[allow(unreachable_patterns)]
        other => Err(SqlPoolError::ConfigError(format!(
            "{other:?} support is not compiled in"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeConnector;

    #[tokio::test]
    async fn connect_opens_every_slot_and_runs_queries() {
        let connector = FakeConnector::new();
        let db = Database::connect(
            EngineConfig::mssql("db", "Loans", "sa", "pw"),
            PoolConfig::default(),
            Arc::new(connector.clone()),
        )
        .await
        .unwrap();
        assert_eq!(connector.state().opened(), 5);

        let rs = db.execute_query("SELECT 1", None).await.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(db.stats().busy, 0);
    }

    #[tokio::test]
    async fn invalid_pool_config_is_rejected_before_connecting() {
        let connector = FakeConnector::new();
        let err = Database::connect(
            EngineConfig::mssql("db", "Loans", "sa", "pw"),
            PoolConfig::default().with_size(0),
            Arc::new(connector.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SqlPoolError::ConfigError(_)));
        assert_eq!(connector.state().opened(), 0);
    }

    #[tokio::test]
    async fn no_connection_at_all_is_fatal() {
        let connector = FakeConnector::new();
        connector.state().fail_next_connects(5);
        let err = Database::connect(
            EngineConfig::mssql("db", "Loans", "sa", "pw"),
            PoolConfig::default(),
            Arc::new(connector),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SqlPoolError::PoolInitError(_)));
    }
}
