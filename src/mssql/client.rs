use tiberius::{AuthMethod, Client, Config as TiberiusConfig, SqlBrowser};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::query::{bind_query_params, build_result_set};
use crate::config::EngineConfig;
use crate::driver::{Connection, Connector};
use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::translation::named_to_positional;
use crate::types::QueryParams;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Opens tiberius connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl Connector for MssqlConnector {
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn Connection>, SqlPoolError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                SqlPoolError::ConnectionError(format!("failed to build driver runtime: {e}"))
            })?;
        let tiberius_config = build_tiberius_config(config);
        let timeout = config.connect_timeout;
        let named = config.instance_name.is_some();
        let client = runtime
            .block_on(async move {
                tokio::time::timeout(timeout, open_client(tiberius_config, named)).await
            })
            .map_err(|_| {
                SqlPoolError::ConnectionError(format!(
                    "timed out connecting to {} after {timeout:?}",
                    config.target()
                ))
            })??;
        Ok(Box::new(MssqlConnection {
            runtime,
            client,
            broken: false,
        }))
    }
}

fn build_tiberius_config(config: &EngineConfig) -> TiberiusConfig {
    let mut tiberius_config = TiberiusConfig::new();
    if let Some(host) = &config.host {
        tiberius_config.host(host);
    }
    if let Some(database) = &config.database {
        tiberius_config.database(database);
    }
    tiberius_config.port(config.port.unwrap_or(1433));
    tiberius_config.authentication(AuthMethod::sql_server(
        config.user.as_deref().unwrap_or_default(),
        config.password.as_deref().unwrap_or_default(),
    ));
    if let Some(instance) = &config.instance_name {
        tiberius_config.instance_name(instance);
    }
    if config.trust_cert {
        tiberius_config.trust_cert();
    }
    tiberius_config
}

async fn open_client(config: TiberiusConfig, named: bool) -> Result<MssqlClient, SqlPoolError> {
    let tcp = if named {
        // Ask the SQL Browser service which port the instance listens on.
        TcpStream::connect_named(&config).await?
    } else {
        TcpStream::connect(config.get_addr()).await.map_err(|e| {
            SqlPoolError::ConnectionError(format!("TCP connection error: {e}"))
        })?
    };
    tcp.set_nodelay(true)
        .map_err(|e| SqlPoolError::ConnectionError(format!("TCP connection error: {e}")))?;

    Client::connect(config, tcp.compat_write()).await.map_err(|e| {
        SqlPoolError::ConnectionError(format!("SQL Server connection error: {e}"))
    })
}

/// A tiberius client plus the runtime that drives it.
pub struct MssqlConnection {
    runtime: Runtime,
    client: MssqlClient,
    broken: bool,
}

impl MssqlConnection {
    fn track<T>(&mut self, result: Result<T, SqlPoolError>) -> Result<T, SqlPoolError> {
        if let Err(SqlPoolError::MssqlError(
            tiberius::error::Error::Io { .. } | tiberius::error::Error::Protocol(_),
        )) = &result
        {
            self.broken = true;
        }
        result
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl Connection for MssqlConnection {
    fn query(&mut self, sql: &str, params: &QueryParams) -> Result<ResultSet, SqlPoolError> {
        let positional = named_to_positional(sql, params)?;
        let query = bind_query_params(&positional.sql, &positional.values);
        let result = self
            .runtime
            .block_on(build_result_set(&mut self.client, query));
        self.track(result)
    }

    /// Sent as a plain SQL batch so `SET` options stick to the session.
    fn batch(&mut self, sql: &str) -> Result<(), SqlPoolError> {
        let client = &mut self.client;
        let result = self.runtime.block_on(async {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<(), SqlPoolError>(())
        });
        self.track(result)
    }

    fn is_closed(&self) -> bool {
        self.broken
    }

    fn close(self: Box<Self>) {
        let MssqlConnection {
            runtime, client, ..
        } = *self;
        let _ = runtime.block_on(client.close());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiberius_config_uses_engine_settings() {
        let config = EngineConfig::mssql("10.0.0.5", "GoldLoan", "sa", "pw").with_port(Some(1700));
        let tiberius_config = build_tiberius_config(&config);
        assert_eq!(tiberius_config.get_addr(), "10.0.0.5:1700");
    }
}
