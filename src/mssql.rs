//! SQL Server backend on tiberius.
//!
//! tiberius is async; each connection owns a private current-thread runtime
//! and drives the client with `block_on`, which turns it into the blocking
//! driver the pool expects. Connections must therefore only be used from the
//! worker threads, never from inside another runtime.

mod client;
mod query;

pub use client::{MssqlClient, MssqlConnection, MssqlConnector};
pub use query::{bind_query_params, build_result_set, column_value};
