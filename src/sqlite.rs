//! SQLite backend on rusqlite.
//!
//! rusqlite is already blocking, so a connection is used as is. Parameters
//! bind by name, so queries skip the positional translation SQL Server needs.

mod connection;
mod query;

pub use connection::{SqliteConnection, SqliteConnector};
pub use query::{build_result_set, row_value_to_sqlite_value, sqlite_extract_value};
