use std::fmt;
use std::time::Duration;

use clap::{Args, Parser};

use crate::error::SqlPoolError;
use crate::types::Dialect;

pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_MAX_SCAN_PASSES: u32 = 10;
pub const DEFAULT_SCAN_PAUSE: Duration = Duration::from_millis(200);
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECYCLE: Duration = Duration::from_secs(3600);

/// Driver-level settings held by an [`Engine`](crate::engine::Engine).
#[derive(Clone)]
pub struct EngineConfig {
    pub dialect: Dialect,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Database name; for `SQLite` this is the file path.
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub instance_name: Option<String>,
    pub connect_timeout: Duration,
    /// Pooled connections older than this are reopened on checkout.
    pub recycle: Duration,
    /// Probe each pooled connection on checkout.
    pub pre_ping: bool,
    /// Run on every new connection before it is exposed to callers.
    pub session_statements: Vec<String>,
    pub trust_cert: bool,
}

impl EngineConfig {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            host: None,
            port: dialect.default_port(),
            database: None,
            user: None,
            password: None,
            instance_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recycle: DEFAULT_RECYCLE,
            pre_ping: true,
            session_statements: dialect.default_session_statements(),
            trust_cert: true,
        }
    }

    /// SQL Server settings with the usual defaults.
    #[must_use]
    pub fn mssql(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(Dialect::Mssql);
        config.host = Some(host.into());
        config.database = Some(database.into());
        config.user = Some(user.into());
        config.password = Some(password.into());
        config
    }

    /// `SQLite` settings for the database file at `path`.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        let mut config = Self::new(Dialect::Sqlite);
        config.database = Some(path.into());
        config
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_recycle(mut self, recycle: Duration) -> Self {
        self.recycle = recycle;
        self
    }

    #[must_use]
    pub fn with_pre_ping(mut self, pre_ping: bool) -> Self {
        self.pre_ping = pre_ping;
        self
    }

    #[must_use]
    pub fn with_session_statements(mut self, statements: Vec<String>) -> Self {
        self.session_statements = statements;
        self
    }

    #[must_use]
    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }

    /// `host[:port]/database` for log lines.
    #[must_use]
    pub fn target(&self) -> String {
        let database = self.database.as_deref().unwrap_or("?");
        match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{host}:{port}/{database}"),
            (Some(host), None) => format!("{host}/{database}"),
            (None, _) => database.to_string(),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("instance_name", &self.instance_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("recycle", &self.recycle)
            .field("pre_ping", &self.pre_ping)
            .field("session_statements", &self.session_statements)
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

/// Sizing and retry settings for the slot pool and its worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of persistent slots.
    pub size: usize,
    /// Full scans of the slots before falling back to an overflow connection.
    pub max_scan_passes: u32,
    /// Pause between scans.
    pub scan_pause: Duration,
    /// Worker threads available for blocking driver calls.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            max_scan_passes: DEFAULT_MAX_SCAN_PASSES,
            scan_pause: DEFAULT_SCAN_PAUSE,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_scan(mut self, max_scan_passes: u32, scan_pause: Duration) -> Self {
        self.max_scan_passes = max_scan_passes;
        self.scan_pause = scan_pause;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] for a zero-sized pool or worker
    /// pool, or zero scan passes (every checkout would skip the slots).
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        if self.size == 0 {
            return Err(SqlPoolError::ConfigError(
                "pool size must be at least 1".into(),
            ));
        }
        if self.max_scan_passes == 0 {
            return Err(SqlPoolError::ConfigError(
                "pool scan passes must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(SqlPoolError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Connection settings read from the command line or the environment.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Database backend
    #[arg(long, env = "DB_DIALECT", value_enum, default_value = "mssql")]
    pub dialect: Dialect,

    /// Server host name or address
    #[arg(long, env = "DB_HOST")]
    pub host: Option<String>,

    /// Server port (defaults to 1433 for SQL Server)
    #[arg(long, env = "DB_PORT")]
    pub port: Option<u16>,

    /// Database name, or the database file for SQLite
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,

    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Named SQL Server instance
    #[arg(long, env = "DB_INSTANCE")]
    pub instance: Option<String>,

    #[arg(long, env = "DB_CONNECT_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    pub connect_timeout: Duration,

    /// Reopen pooled connections older than this
    #[arg(long, env = "DB_POOL_RECYCLE", value_parser = humantime::parse_duration, default_value = "1h")]
    pub recycle: Duration,

    /// Probe pooled connections on checkout
    #[arg(long, env = "DB_PRE_PING", default_value_t = true, action = clap::ArgAction::Set)]
    pub pre_ping: bool,

    #[arg(long, env = "DB_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    #[arg(long, env = "DB_POOL_SCAN_PASSES", default_value_t = DEFAULT_MAX_SCAN_PASSES)]
    pub scan_passes: u32,

    #[arg(long, env = "DB_POOL_SCAN_PAUSE", value_parser = humantime::parse_duration, default_value = "200ms")]
    pub scan_pause: Duration,

    #[arg(long, env = "DB_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

#[derive(Parser)]
#[command(no_binary_name = true)]
struct EnvOnly {
    #[command(flatten)]
    args: ConnectionArgs,
}

impl ConnectionArgs {
    /// Read every setting from the environment alone.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, SqlPoolError> {
        EnvOnly::try_parse_from(std::iter::empty::<String>())
            .map(|parsed| parsed.args)
            .map_err(|e| SqlPoolError::ConfigError(e.to_string()))
    }

    /// Split into engine and pool settings.
    #[must_use]
    pub fn into_settings(self) -> (EngineConfig, PoolConfig) {
        let mut engine = EngineConfig::new(self.dialect);
        engine.host = self.host;
        if self.port.is_some() {
            engine.port = self.port;
        }
        engine.database = self.database;
        engine.user = self.user;
        engine.password = self.password;
        engine.instance_name = self.instance;
        engine.connect_timeout = self.connect_timeout;
        engine.recycle = self.recycle;
        engine.pre_ping = self.pre_ping;

        let pool = PoolConfig {
            size: self.pool_size,
            max_scan_passes: self.scan_passes,
            scan_pause: self.scan_pause,
            workers: self.workers,
        };
        (engine, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: ConnectionArgs,
    }

    #[test]
    fn cli_defaults_match_pool_defaults() {
        let cli = Cli::try_parse_from(["test", "--host", "db.local", "--database", "Loans"]).unwrap();
        let (engine, pool) = cli.args.into_settings();
        assert_eq!(pool, PoolConfig::default());
        assert_eq!(engine.port, Some(1433));
        assert_eq!(engine.connect_timeout, Duration::from_secs(30));
        assert_eq!(engine.recycle, Duration::from_secs(3600));
        assert!(engine.pre_ping);
        assert_eq!(engine.session_statements, vec!["SET DATEFORMAT ymd".to_string()]);
        assert_eq!(engine.target(), "db.local:1433/Loans");
    }

    #[test]
    fn humantime_durations_and_overrides() {
        let cli = Cli::try_parse_from([
            "test",
            "--dialect",
            "sqlite",
            "--database",
            "/tmp/x.db",
            "--scan-pause",
            "50ms",
            "--pool-size",
            "2",
            "--pre-ping",
            "false",
        ])
        .unwrap();
        let (engine, pool) = cli.args.into_settings();
        assert_eq!(engine.dialect, Dialect::Sqlite);
        assert!(engine.session_statements.is_empty());
        assert_eq!(engine.port, None);
        assert!(!engine.pre_ping);
        assert_eq!(pool.scan_pause, Duration::from_millis(50));
        assert_eq!(pool.size, 2);
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(PoolConfig::default().with_size(0).validate().is_err());
        assert!(PoolConfig::default().with_workers(0).validate().is_err());
        let no_scans = PoolConfig::default().with_scan(0, Duration::from_millis(200));
        assert!(matches!(no_scans.validate(), Err(SqlPoolError::ConfigError(_))));
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let config = EngineConfig::mssql("h", "d", "sa", "hunter2");
        let text = format!("{config:?}");
        assert!(!text.contains("hunter2"));
        assert!(text.contains("<redacted>"));
    }
}
