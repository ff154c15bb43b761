//! Convenient imports for common functionality.

pub use crate::config::{ConnectionArgs, EngineConfig, PoolConfig};
pub use crate::database::{Database, connector_for};
pub use crate::driver::{Connection, Connector};
pub use crate::error::SqlPoolError;
pub use crate::pool::{PoolStats, SlotIndex, SlotProbe, WarmUpReport};
pub use crate::results::{DbRow, QueryDocument, QueryStatus, ResultSet};
pub use crate::rewrite::{RewriteRule, Rewriter};
pub use crate::types::{Dialect, QueryParams, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlConnector;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnector;
