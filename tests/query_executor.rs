use std::sync::Arc;

use sql_slot_pool::test_utils::{FAIL_MARKER, FakeConnector};
use sql_slot_pool::{
    Database, EngineConfig, PoolConfig, QueryDocument, QueryParams, QueryStatus, RowValues,
    SqlPoolError,
};

async fn fake_database(
    connector: &FakeConnector,
    engine: EngineConfig,
) -> Result<Database, SqlPoolError> {
    Database::connect(engine, PoolConfig::default(), Arc::new(connector.clone())).await
}

#[tokio::test]
async fn month_format_is_rewritten_before_reaching_the_driver() -> Result<(), SqlPoolError> {
    let connector = FakeConnector::new();
    let db = fake_database(
        &connector,
        EngineConfig::mssql("db.local", "GoldLoan", "sa", "pw"),
    )
    .await?;

    let sql = "SELECT FORMAT([LoanDisbursementDate], 'yyyy-MM') AS month, COUNT(*) AS loans \
               FROM Loans GROUP BY FORMAT([LoanDisbursementDate], 'yyyy-MM')";
    db.execute_query(sql, None).await?;

    let (_, ran) = connector.state().queries().pop().expect("query recorded");
    assert_eq!(
        ran,
        "SELECT CONVERT(varchar(7), [LoanDisbursementDate], 120) AS month, COUNT(*) AS loans \
         FROM Loans GROUP BY CONVERT(varchar(7), [LoanDisbursementDate], 120)"
    );
    Ok(())
}

#[tokio::test]
async fn sqlite_dialect_passes_queries_through() -> Result<(), SqlPoolError> {
    let connector = FakeConnector::new();
    let db = fake_database(&connector, EngineConfig::sqlite("loans.db")).await?;

    let sql = "SELECT FORMAT([d], 'yyyy-MM') FROM t";
    db.execute_query(sql, None).await?;
    let (_, ran) = connector.state().queries().pop().expect("query recorded");
    assert_eq!(ran, sql);
    Ok(())
}

#[tokio::test]
async fn driver_errors_carry_the_query_text() -> Result<(), SqlPoolError> {
    let connector = FakeConnector::new();
    let db = fake_database(
        &connector,
        EngineConfig::mssql("db.local", "GoldLoan", "sa", "pw"),
    )
    .await?;

    let sql = format!("SELECT {FAIL_MARKER} FROM Loans");
    let err = db.execute_query(&sql, None).await.unwrap_err();
    assert_eq!(err.query(), Some(sql.as_str()));
    assert!(err.to_string().starts_with("Query execution failed: "));
    assert!(err.to_string().contains("Incorrect syntax"));

    let document = QueryDocument::from(Err::<sql_slot_pool::ResultSet, _>(err));
    assert_eq!(document.status, QueryStatus::Error);
    assert!(document.results.is_none());
    assert_eq!(document.row_count, 0);
    Ok(())
}

#[tokio::test]
async fn named_parameters_reach_the_driver() -> Result<(), SqlPoolError> {
    let connector = FakeConnector::new();
    let db = fake_database(
        &connector,
        EngineConfig::mssql("db.local", "GoldLoan", "sa", "pw"),
    )
    .await?;

    let mut params = QueryParams::new();
    params.insert("branch".into(), RowValues::Text("north".into()));
    params.insert("min_amount".into(), RowValues::Int(1000));
    let rs = db
        .execute_query(
            "SELECT * FROM Loans WHERE Branch = :branch AND Amount >= :min_amount",
            Some(&params),
        )
        .await?;

    let row = &rs.results[0];
    assert_eq!(row.get("branch"), Some(&RowValues::Text("north".into())));
    assert_eq!(row.get("min_amount"), Some(&RowValues::Int(1000)));

    let document = QueryDocument::success(rs);
    let json = serde_json::to_value(&document).expect("serializable");
    assert_eq!(json["status"], "success");
    assert_eq!(json["row_count"], 1);
    assert_eq!(json["results"][0]["branch"], "north");
    Ok(())
}

#[tokio::test]
async fn error_reports_the_query_as_written_not_as_rewritten() -> Result<(), SqlPoolError> {
    let connector = FakeConnector::new();
    let db = fake_database(
        &connector,
        EngineConfig::mssql("db.local", "GoldLoan", "sa", "pw"),
    )
    .await?;

    let sql = format!("SELECT FORMAT([PaidOn], 'yyyy-MM'), {FAIL_MARKER} FROM Payments");
    let err = db.execute_query(&sql, None).await.unwrap_err();
    assert_eq!(err.query(), Some(sql.as_str()));
    let (_, ran) = connector.state().queries().pop().expect("query recorded");
    assert!(ran.starts_with("SELECT CONVERT(varchar(7), [PaidOn], 120)"));
    Ok(())
}
