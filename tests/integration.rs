//! Integration tests for pgline
//!
//! These tests require a running Postgres instance.
//!
//! Run with: cargo test --test integration -- --ignored

use pgline::protocol::{DescribeTarget, TransactionStatus};
use pgline::sink::Recorder;
use pgline::{ConnectionConfig, ExtendedQuery, ResultCollector, Session};
use std::sync::Arc;

/// Helper to connect to the test database
async fn connect_test_db(recorder: Option<&Recorder>) -> pgline::Result<Session> {
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string());
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("POSTGRES_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);
    let db = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "postgres".to_string());

    let config = ConnectionConfig::builder(db, user).password(password).build();
    let sink = recorder.map(|r| Box::new(r.clone()) as Box<dyn pgline::EventSink>);
    Session::connect(&host, port, &config, sink).await
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_connect_and_query() {
    let session = connect_test_db(None).await.expect("connect");

    assert!(session.properties().server_version().is_some());
    assert!(session.cancel_token().is_some());

    let results = session
        .simple_query("SELECT 0")
        .await
        .expect("send")
        .await
        .expect("query");
    assert_eq!(results[0].rows[0][0].as_deref(), Some(&b"0"[..]));

    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_select_zero_events() {
    let recorder = Recorder::new();
    let session = connect_test_db(Some(&recorder)).await.expect("connect");
    recorder.clear();

    session
        .simple_query("SELECT 0")
        .await
        .expect("send")
        .await
        .expect("query");

    assert_eq!(
        recorder.lines(),
        vec![
            "-> QUERY: SELECT 0",
            "<- ROW_DESCRIPTION: 1 column(s)",
            "<- ROW_DESCRIPTION [#0]: '?column?' : int4 {4 bytes, text}",
            "<- DATA_ROW: 1 cell(s)",
            "<- DATA_ROW [#0]: 30",
            "<- COMMAND_COMPLETE: SELECT 1",
            "<- READY_FOR_QUERY: IDLE",
        ]
    );
    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_pipelined_queries_from_many_tasks() {
    let session = Arc::new(connect_test_db(None).await.expect("connect"));

    let mut tasks = Vec::new();
    for i in 0..50 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            let pending = session.simple_query(&format!("SELECT {}", i)).await?;
            Ok::<_, pgline::Error>((i, pending.await?))
        }));
    }

    for task in tasks {
        let (i, results) = task.await.expect("join").expect("query");
        let cell = results[0].rows[0][0].clone().expect("not null");
        assert_eq!(cell, i.to_string().as_bytes());
    }

    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_transaction_status_tracking() {
    let session = connect_test_db(None).await.expect("connect");

    session.simple_query("BEGIN").await.expect("send").await.expect("begin");
    assert_eq!(
        session.transaction_status(),
        Some(TransactionStatus::InTransaction)
    );

    let results = session
        .simple_query("SELECT 1/0")
        .await
        .expect("send")
        .await
        .expect("query");
    assert_eq!(results[0].error.as_ref().and_then(|e| e.code()), Some("22012"));
    assert_eq!(session.transaction_status(), Some(TransactionStatus::Failed));

    session.simple_query("ROLLBACK").await.expect("send").await.expect("rollback");
    assert_eq!(session.transaction_status(), Some(TransactionStatus::Idle));

    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_extended_query_with_parameters() {
    let session = connect_test_db(None).await.expect("connect");

    let query = ExtendedQuery::new("SELECT $1::int4 + 1, $2::text IS NULL")
        .param_types(vec![23, 25])
        .param("41")
        .null_param();
    let results = session
        .extended_query(&query)
        .await
        .expect("send")
        .await
        .expect("query");

    assert_eq!(results[0].columns.len(), 2);
    assert_eq!(results[0].rows[0][0].as_deref(), Some(&b"42"[..]));
    assert_eq!(results[0].rows[0][1].as_deref(), Some(&b"t"[..]));

    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_prepared_statement_describe() {
    let session = connect_test_db(None).await.expect("connect");

    session
        .send_parse("add_one", "SELECT $1::int8 + 1", &[])
        .await
        .expect("parse");
    session
        .send_describe(DescribeTarget::Statement, "add_one")
        .await
        .expect("describe");
    session.send_sync().await.expect("sync");

    let types = session
        .receive(|inbound| {
            Box::pin(async move {
                let mut collector = ResultCollector::new();
                inbound.receive_until_ready(&mut collector).await?;
                Ok::<_, pgline::Error>(collector.parameter_types().map(<[u32]>::to_vec))
            })
        })
        .await
        .expect("queue")
        .await
        .expect("receive");
    assert_eq!(types, Some(vec![20]));

    let results = session
        .extended_query(&ExtendedQuery::prepared("add_one").param("9"))
        .await
        .expect("send")
        .await
        .expect("query");
    assert_eq!(results[0].rows[0][0].as_deref(), Some(&b"10"[..]));

    session.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires Postgres running
async fn test_cancel_running_query() {
    let session = connect_test_db(None).await.expect("connect");
    let token = session.cancel_token().expect("backend key");

    let pending = session.simple_query("SELECT pg_sleep(30)").await.expect("send");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    token.cancel_tcp(&host, 5432).await.expect("cancel");

    let results = pending.await.expect("query");
    assert_eq!(results[0].error.as_ref().and_then(|e| e.code()), Some("57014"));

    session.close().await.expect("close");
}
