use std::sync::Arc;

use futures::future::join_all;
use querylens_common::models::Row;
use querylens_connectors::{DiagnosticConnection, MemoryConnection};
use querylens_error::{ErrorCode, QueryLensError};

fn scripted() -> MemoryConnection {
    MemoryConnection::new()
        .respond(
            "ProductVersion",
            vec![Row::new().with("product_version", "15.0.2000.5")],
        )
        .respond(
            "sys.dm_exec_requests",
            vec![
                Row::new().with("blocking_spid", 51).with("blocked_spid", 64),
                Row::new().with("blocking_spid", 51).with("blocked_spid", 70),
            ],
        )
        .fail(
            "sys.query_store_wait_stats",
            QueryLensError::query_failed("Query Store is disabled"),
        )
}

#[tokio::test]
async fn test_concurrent_callers_share_one_connection() {
    let conn: Arc<dyn DiagnosticConnection> = Arc::new(scripted());

    let tasks = (0..8).map(|i| {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let sql = if i % 2 == 0 {
                "SELECT SERVERPROPERTY('ProductVersion')"
            } else {
                "SELECT * FROM sys.dm_exec_requests"
            };
            conn.query(sql).await
        })
    });

    let results = join_all(tasks).await;
    let sizes: Vec<usize> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![1, 2, 1, 2, 1, 2, 1, 2]);
}

#[tokio::test]
async fn test_failing_script_keeps_failing() {
    let conn = scripted();
    for _ in 0..3 {
        let err = conn
            .query("SELECT * FROM sys.query_store_wait_stats")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::QueryFailed);
    }
    assert_eq!(conn.count_matching("query_store_wait_stats"), 3);
    assert_eq!(conn.kind(), "memory");
}
