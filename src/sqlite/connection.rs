use rusqlite::Connection as RusqliteConnection;
use tracing::debug;

use super::query::build_result_set;
use crate::config::EngineConfig;
use crate::driver::{Connection, Connector};
use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::types::QueryParams;

/// Opens SQLite database files; the engine's database name is the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn Connection>, SqlPoolError> {
        let path = config
            .database
            .as_deref()
            .ok_or_else(|| SqlPoolError::ConfigError("database file is not set".into()))?;
        let conn = RusqliteConnection::open(path).map_err(|e| {
            SqlPoolError::ConnectionError(format!("failed to open {path}: {e}"))
        })?;
        // Writers from other slots wait this long for the file lock.
        conn.busy_timeout(config.connect_timeout)?;
        debug!(path, "sqlite database opened");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

#[derive(Debug)]
pub struct SqliteConnection {
    conn: RusqliteConnection,
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &QueryParams) -> Result<ResultSet, SqlPoolError> {
        let mut stmt = self.conn.prepare(sql)?;
        build_result_set(&mut stmt, params)
    }

    fn batch(&mut self, sql: &str) -> Result<(), SqlPoolError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn close(self: Box<Self>) {
        let _ = self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    fn open(dir: &tempfile::TempDir) -> Box<dyn Connection> {
        let path = dir.path().join("loans.db");
        SqliteConnector
            .connect(&EngineConfig::sqlite(path.to_string_lossy()))
            .unwrap()
    }

    #[test]
    fn binds_named_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open(&dir);
        conn.batch(
            "CREATE TABLE loans (id INTEGER, amount REAL, branch TEXT);
             INSERT INTO loans VALUES (1, 1500.5, 'north'), (2, 900.0, 'south');",
        )
        .unwrap();

        let mut params = QueryParams::new();
        params.insert("branch".into(), RowValues::Text("north".into()));
        let rs = conn
            .query("SELECT id, amount FROM loans WHERE branch = :branch", &params)
            .unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.results[0].get("id"), Some(&RowValues::Int(1)));
        assert_eq!(rs.results[0].get("amount"), Some(&RowValues::Float(1500.5)));
        conn.close();
    }

    #[test]
    fn missing_and_positional_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open(&dir);
        let err = conn
            .query("SELECT :absent", &QueryParams::new())
            .unwrap_err();
        assert!(matches!(err, SqlPoolError::ParameterError(_)));
        let err = conn.query("SELECT ?", &QueryParams::new()).unwrap_err();
        assert!(matches!(err, SqlPoolError::ParameterError(_)));
    }
}
