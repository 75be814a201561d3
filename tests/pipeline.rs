//! Pipelined requests against an in-memory fake server

use pgline::protocol::{DescribeTarget, TransactionStatus};
use pgline::sink::Recorder;
use pgline::{handshake, ConnectionConfig, Error, ExtendedQuery, Session};
use std::sync::Arc;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

fn backend(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn cstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

fn row_description(name: &str, type_oid: u32, type_size: i16) -> Vec<u8> {
    let mut payload = 1i16.to_be_bytes().to_vec();
    payload.extend(cstr(name));
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&0i16.to_be_bytes());
    payload.extend_from_slice(&type_oid.to_be_bytes());
    payload.extend_from_slice(&type_size.to_be_bytes());
    payload.extend_from_slice(&(-1i32).to_be_bytes());
    payload.extend_from_slice(&0i16.to_be_bytes());
    backend(b'T', &payload)
}

fn data_row(cell: &[u8]) -> Vec<u8> {
    let mut payload = 1i16.to_be_bytes().to_vec();
    payload.extend_from_slice(&(cell.len() as i32).to_be_bytes());
    payload.extend_from_slice(cell);
    backend(b'D', &payload)
}

fn command_complete(tag: &str) -> Vec<u8> {
    backend(b'C', &cstr(tag))
}

fn ready() -> Vec<u8> {
    backend(b'Z', b"I")
}

/// Read one tagged frontend message
async fn read_message(server: &mut DuplexStream) -> (u8, Vec<u8>) {
    let tag = server.read_u8().await.expect("tag");
    let len = server.read_i32().await.expect("length") as usize;
    let mut payload = vec![0; len - 4];
    server.read_exact(&mut payload).await.expect("payload");
    (tag, payload)
}

/// Complete a trust-authenticated startup on the server side
async fn accept(server: &mut DuplexStream) {
    let len = server.read_i32().await.expect("startup length") as usize;
    let mut payload = vec![0; len - 4];
    server.read_exact(&mut payload).await.expect("startup payload");

    let mut reply = backend(b'R', &0i32.to_be_bytes());
    reply.extend(backend(b'K', &[0, 0, 0, 7, 1, 2, 3, 4]));
    reply.extend(ready());
    server.write_all(&reply).await.expect("startup reply");
}

async fn connect(recorder: Option<&Recorder>) -> (Session, DuplexStream) {
    let (client, mut server) = duplex(64 * 1024);
    let config = ConnectionConfig::builder("postgres", "postgres")
        .receive_queue_capacity(3)
        .build();

    let sink = recorder.map(|r| Box::new(r.clone()) as Box<dyn pgline::EventSink>);
    let (session, ()) = tokio::join!(
        async move { handshake(client, &config, sink).await.expect("handshake") },
        accept(&mut server)
    );
    (session, server)
}

#[tokio::test]
async fn test_simple_query_select_zero() {
    let recorder = Recorder::new();
    let (session, mut server) = connect(Some(&recorder)).await;
    recorder.clear();

    let pending = session.simple_query("SELECT 0").await.unwrap();

    let (tag, payload) = read_message(&mut server).await;
    assert_eq!(tag, b'Q');
    assert_eq!(payload, cstr("SELECT 0"));
    let mut reply = row_description("?column?", 23, 4);
    reply.extend(data_row(b"0"));
    reply.extend(command_complete("SELECT 1"));
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    let results = pending.await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].columns[0].name, "?column?");
    assert_eq!(results[0].rows, vec![vec![Some(bytes::Bytes::from_static(b"0"))]]);
    assert_eq!(results[0].rows_affected(), Some(1));

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
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_queries_get_their_own_responses() {
    let (session, mut server) = connect(None).await;
    let session = Arc::new(session);

    // Echo each query's number back as its only row
    let server_task = tokio::spawn(async move {
        for _ in 0..10 {
            let (tag, payload) = read_message(&mut server).await;
            assert_eq!(tag, b'Q');
            let sql = String::from_utf8(payload[..payload.len() - 1].to_vec()).unwrap();
            let n = sql.trim_start_matches("SELECT ");

            let mut reply = row_description("n", 23, 4);
            reply.extend(data_row(n.as_bytes()));
            reply.extend(command_complete("SELECT 1"));
            reply.extend(ready());
            server.write_all(&reply).await.unwrap();
        }
        server
    });

    let mut tasks = Vec::new();
    for i in 0..10 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            let pending = session.simple_query(&format!("SELECT {}", i)).await?;
            let results = pending.await?;
            Ok::<_, Error>((i, results))
        }));
    }

    for task in tasks {
        let (i, results) = task.await.unwrap().unwrap();
        let cell = results[0].rows[0][0].clone().unwrap();
        assert_eq!(cell, i.to_string().as_bytes());
    }

    let _server = server_task.await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_close_fails_outstanding_requests() {
    let (session, mut server) = connect(None).await;

    let first = session.simple_query("SELECT pg_sleep(10)").await.unwrap();
    let second = session.simple_query("SELECT 2").await.unwrap();

    session.close().await.unwrap();

    assert!(matches!(first.await, Err(Error::ReceiveCancelled)));
    assert!(matches!(second.await, Err(Error::ReceiveCancelled)));

    // Both queries then Terminate reached the server
    assert_eq!(read_message(&mut server).await.0, b'Q');
    assert_eq!(read_message(&mut server).await.0, b'Q');
    assert_eq!(read_message(&mut server).await.0, b'X');
}

#[tokio::test]
async fn test_framing_error_ends_session() {
    let (session, mut server) = connect(None).await;

    let pending = session
        .request(&[pgline::protocol::FrontendMessage::Sync], |inbound| {
            Box::pin(async move { inbound.receive_message().await })
        })
        .await
        .unwrap();
    read_message(&mut server).await;

    // ParseComplete carries no payload; the extra byte is a framing violation
    server.write_all(&[b'1', 0, 0, 0, 5, 0]).await.unwrap();
    assert!(pending.await.unwrap_err().is_framing());

    match session.simple_query("SELECT 1").await {
        Err(err) => assert!(matches!(err, Error::ConnectionClosed)),
        Ok(pending) => assert!(matches!(pending.await, Err(Error::ReceiveCancelled))),
    }
}

#[tokio::test]
async fn test_server_error_is_recorded_and_session_continues() {
    let (session, mut server) = connect(None).await;

    let failing = session.simple_query("SELEC 1").await.unwrap();
    let next = session.simple_query("SELECT 1").await.unwrap();

    read_message(&mut server).await;
    let mut payload = Vec::new();
    for (tag, value) in [(b'S', "ERROR"), (b'C', "42601"), (b'M', "syntax error")] {
        payload.push(tag);
        payload.extend(cstr(value));
    }
    payload.push(0);
    let mut reply = backend(b'E', &payload);
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    read_message(&mut server).await;
    let mut reply = command_complete("SELECT 0");
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    let failed = failing.await.unwrap();
    assert!(failed[0].is_error());
    assert_eq!(failed[0].error.as_ref().and_then(|e| e.code()), Some("42601"));

    let ok = next.await.unwrap();
    assert_eq!(ok[0].tag.as_deref(), Some("SELECT 0"));
    assert_eq!(session.transaction_status(), Some(TransactionStatus::Idle));
}

#[tokio::test]
async fn test_extended_query() {
    let recorder = Recorder::new();
    let (session, mut server) = connect(Some(&recorder)).await;
    recorder.clear();

    let query = ExtendedQuery::new("SELECT $1::int4 + 1")
        .param_types(vec![23])
        .param("41");
    let pending = session.extended_query(&query).await.unwrap();

    let mut tags = Vec::new();
    for _ in 0..5 {
        tags.push(read_message(&mut server).await.0);
    }
    assert_eq!(tags, b"PBDES");

    let mut reply = backend(b'1', &[]);
    reply.extend(backend(b'2', &[]));
    reply.extend(row_description("?column?", 23, 4));
    reply.extend(data_row(b"42"));
    reply.extend(command_complete("SELECT 1"));
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    let results = pending.await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rows[0][0].as_deref(), Some(&b"42"[..]));

    let lines = recorder.lines();
    assert_eq!(
        &lines[..5],
        &[
            "-> PARSE '' (int4), Query: SELECT $1::int4 + 1",
            "-> BIND PORTAL '' from STATEMENT ''",
            "-> DESCRIBE PORTAL ''",
            "-> EXECUTE ''",
            "-> SYNC",
        ]
    );
    assert_eq!(lines[5], "<- PARSE_COMPLETE (…)");
    assert_eq!(lines[6], "<- BIND_COMPLETE (…)");
}

#[tokio::test]
async fn test_manual_send_then_receive() {
    let (session, mut server) = connect(None).await;

    session.send_parse("s1", "SELECT 1", &[]).await.unwrap();
    session.send_sync().await.unwrap();
    let pending = session
        .receive(|inbound| {
            Box::pin(async move {
                let mut collector = pgline::ResultCollector::new();
                inbound.receive_until_ready(&mut collector).await
            })
        })
        .await
        .unwrap();

    assert_eq!(read_message(&mut server).await.0, b'P');
    assert_eq!(read_message(&mut server).await.0, b'S');
    let mut reply = backend(b'1', &[]);
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    assert_eq!(pending.await.unwrap(), 2);
}

#[tokio::test]
async fn test_collect_keeps_parameter_types_and_status() {
    let (session, mut server) = connect(None).await;

    let query = ExtendedQuery::new("SELECT $1::int4")
        .statement("s1")
        .param("7")
        .describe(Some(DescribeTarget::Statement));
    let pending = session.collect(&query.messages()).await.unwrap();

    let mut tags = Vec::new();
    for _ in 0..5 {
        tags.push(read_message(&mut server).await.0);
    }
    assert_eq!(tags, b"PBDES");

    let mut parameters = 1i16.to_be_bytes().to_vec();
    parameters.extend_from_slice(&23u32.to_be_bytes());
    let mut reply = backend(b'1', &[]);
    reply.extend(backend(b'2', &[]));
    reply.extend(backend(b't', &parameters));
    reply.extend(row_description("int4", 23, 4));
    reply.extend(data_row(b"7"));
    reply.extend(command_complete("SELECT 1"));
    reply.extend(ready());
    server.write_all(&reply).await.unwrap();

    let collector = pending.await.unwrap();
    assert_eq!(collector.parameter_types(), Some(&[23][..]));
    assert_eq!(collector.transaction_status(), Some(TransactionStatus::Idle));
    assert!(collector.first_error().is_none());

    let results = collector.finish();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rows[0][0].as_deref(), Some(&b"7"[..]));
}
