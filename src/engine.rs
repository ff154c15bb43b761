use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::{Connection, Connector};
use crate::error::SqlPoolError;
use crate::types::Dialect;

/// Immutable driver configuration plus the connector that opens connections.
///
/// Creating an engine does no I/O; connections are only opened by
/// [`Engine::connect`].
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    connector: Arc<dyn Connector>,
}

impl Engine {
    /// Validate `config` and bind it to `connector`.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] when the host (SQL Server only) or
    /// database name is missing. Missing credentials only log a warning; the
    /// driver reports its own authentication error on first connect.
    pub fn create(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SqlPoolError> {
        if config.dialect == Dialect::Mssql && is_blank(config.host.as_deref()) {
            return Err(SqlPoolError::ConfigError("database host is not set".into()));
        }
        if is_blank(config.database.as_deref()) {
            return Err(SqlPoolError::ConfigError("database name is not set".into()));
        }
        if config.dialect == Dialect::Mssql {
            if is_blank(config.user.as_deref()) {
                warn!("database user is not set");
            }
            if is_blank(config.password.as_deref()) {
                warn!("database password is not set");
            }
        }

        info!(database = %config.target(), dialect = ?config.dialect, "database engine created");
        Ok(Self {
            config: Arc::new(config),
            connector,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a connection and apply every session statement to it.
    ///
    /// Blocks the calling thread.
    ///
    /// # Errors
    /// Returns the connector's error, or the error of the first failing session
    /// statement (the half-configured connection is closed).
    pub fn connect(&self) -> Result<Box<dyn Connection>, SqlPoolError> {
        let mut conn = self.connector.connect(&self.config)?;
        for statement in &self.config.session_statements {
            if let Err(err) = conn.batch(statement) {
                conn.close();
                return Err(err);
            }
        }
        debug!(database = %self.config.target(), "connection opened");
        Ok(conn)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
