#![cfg(feature = "mssql")]

use sql_slot_pool::{ConnectionArgs, Database, Dialect, RowValues, SqlPoolError};

/// Runs against a live SQL Server only when `DB_HOST` (and friends) point at one.
async fn live_database() -> Result<Option<Database>, SqlPoolError> {
    let args = ConnectionArgs::from_env()?;
    if args.dialect != Dialect::Mssql || args.host.is_none() {
        return Ok(None);
    }
    Database::from_args(args).await.map(Some)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_returns_only_its_first_result_set() -> Result<(), SqlPoolError> {
    let Some(db) = live_database().await? else {
        return Ok(());
    };

    let rs = db
        .execute_query("SELECT 1 AS a; SELECT 2 AS b, 3 AS c", None)
        .await?;

    assert_eq!(rs.len(), 1);
    assert_eq!(
        rs.get_column_names().map(|names| names.as_slice()),
        Some(&["a".to_string()][..])
    );
    assert_eq!(rs.results[0].get("a"), Some(&RowValues::Int(1)));
    assert_eq!(rs.results[0].get("b"), None);

    // the connection is still usable after the discarded result set
    let rs = db.execute_query("SELECT 4 AS d", None).await?;
    assert_eq!(rs.results[0].get("d"), Some(&RowValues::Int(4)));
    Ok(())
}
