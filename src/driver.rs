//! The seam between the pool and a concrete database driver.
//!
//! Every method here blocks the calling thread. The pool only ever calls them
//! from the worker pool, never from the async caller.

use std::fmt;

use crate::config::EngineConfig;
use crate::error::SqlPoolError;
use crate::results::ResultSet;
use crate::types::QueryParams;

/// A single open, blocking database connection.
pub trait Connection: Send {
    /// Run `sql` with named `params` and collect every row.
    ///
    /// # Errors
    /// Returns the driver's error for syntax, constraint or connectivity failures.
    fn query(&mut self, sql: &str, params: &QueryParams) -> Result<ResultSet, SqlPoolError>;

    /// Run one or more statements that produce no rows.
    ///
    /// # Errors
    /// Returns the driver's error if any statement fails.
    fn batch(&mut self, sql: &str) -> Result<(), SqlPoolError>;

    /// Whether the connection is already known to be unusable. Must not do I/O.
    fn is_closed(&self) -> bool;

    /// Round-trip liveness probe.
    ///
    /// # Errors
    /// Returns the driver's error when the server cannot be reached.
    fn ping(&mut self) -> Result<(), SqlPoolError> {
        self.query("SELECT 1", &QueryParams::new()).map(|_| ())
    }

    /// Close the connection, ignoring failures from an already dead peer.
    fn close(self: Box<Self>);
}

/// Opens connections for an engine.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a fresh connection using `config`.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConnectionError`] (or a driver error) when the
    /// connection cannot be established.
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn Connection>, SqlPoolError>;
}
