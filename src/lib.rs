//! Shared database access for services that talk to a single SQL database.
//!
//! A fixed set of connection slots, each with its own try-lock, is scanned in
//! index order on every checkout. Blocking driver calls run on a bounded set of
//! worker threads so async callers never block their runtime. Dead connections
//! are reopened in place, and when every slot stays busy a temporary overflow
//! connection is used instead of queueing.
//!
//! ```no_run
//! use sql_slot_pool::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlPoolError> {
//! let db = Database::from_args(ConnectionArgs::from_env()?).await?;
//! db.warm_up().await;
//! let rows = db
//!     .execute_query("SELECT FORMAT([PaidOn], 'yyyy-MM') AS month FROM Payments", None)
//!     .await?;
//! println!("{}", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod rewrite;
pub mod translation;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConnectionArgs, EngineConfig, PoolConfig};
pub use database::{Database, connector_for};
pub use error::SqlPoolError;
pub use results::{DbRow, QueryDocument, QueryStatus, ResultSet};
pub use types::{Dialect, QueryParams, RowValues};
