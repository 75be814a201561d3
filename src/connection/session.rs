//! Authenticated session

use super::cancel::CancelToken;
use super::config::ConnectionConfig;
use super::extended::ExtendedQuery;
use super::handshake::handshake;
use super::inbound::{bind, run_reader, BoxedRead, Inbound, Job, Pending};
use super::outbound::{run_writer, BoxedWrite, Command};
use super::properties::ConnectionProperties;
use super::transport::Transport;
use crate::protocol::{
    encode_into, DescribeTarget, Format, FrameReader, FrontendMessage, TransactionStatus,
};
use crate::sink::{EventSink, QueryResult, ResultCollector, SharedSink};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// An authenticated connection accepting pipelined requests
///
/// All methods take `&self`; share the session (for example through an
/// `Arc`) to issue requests from several tasks. One background task writes
/// every request and another reads every response, in the same order.
///
/// Dropping a request future early never corrupts the stream: a request
/// handed to the writer is written whole and its response is still consumed.
pub struct Session {
    outbound: mpsc::UnboundedSender<Command>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    properties: Arc<RwLock<ConnectionProperties>>,
}

impl Session {
    /// Connect over TCP and run the handshake
    pub async fn connect(
        host: &str,
        port: u16,
        config: &ConnectionConfig,
        sink: Option<Box<dyn EventSink>>,
    ) -> Result<Self> {
        let transport = Transport::connect_tcp_timeout(host, port, config.connect_timeout).await?;
        tracing::debug!(host, port, "connected");
        handshake(transport, config, sink).await
    }

    /// Connect over a Unix socket and run the handshake
    pub async fn connect_unix(
        path: &Path,
        config: &ConnectionConfig,
        sink: Option<Box<dyn EventSink>>,
    ) -> Result<Self> {
        let transport = Transport::connect_unix(path).await?;
        handshake(transport, config, sink).await
    }

    /// Start the reader and writer tasks over an authenticated stream
    pub(crate) fn start(
        frames: FrameReader<BoxedRead>,
        writer: BoxedWrite,
        properties: ConnectionProperties,
        sink: SharedSink,
        queue_capacity: usize,
    ) -> Self {
        let properties = Arc::new(RwLock::new(properties));
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(queue_capacity);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let inbound = Inbound::new(frames, Arc::clone(&properties), sink.clone());
        let reader = tokio::spawn(
            run_reader(inbound, jobs_rx, shutdown_rx).instrument(tracing::debug_span!("reader")),
        );
        let writer = tokio::spawn(
            run_writer(writer, commands_rx, jobs_tx, sink)
                .instrument(tracing::debug_span!("writer")),
        );

        Self {
            outbound: commands_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            tasks: Mutex::new(vec![reader, writer]),
            closed: AtomicBool::new(false),
            properties,
        }
    }

    /// Send a simple query
    pub async fn send_query(&self, sql: &str) -> Result<()> {
        self.send(&[FrontendMessage::Query(sql.to_string())]).await
    }

    /// Send Parse
    pub async fn send_parse(&self, statement: &str, sql: &str, param_types: &[u32]) -> Result<()> {
        self.send(&[FrontendMessage::Parse {
            name: statement.to_string(),
            query: sql.to_string(),
            param_types: param_types.to_vec(),
        }])
        .await
    }

    /// Send Bind
    ///
    /// Empty format slices mean "all text".
    pub async fn send_bind(
        &self,
        portal: &str,
        statement: &str,
        values: &[Option<Bytes>],
        param_formats: &[Format],
        result_formats: &[Format],
    ) -> Result<()> {
        self.send(&[FrontendMessage::Bind {
            portal: portal.to_string(),
            statement: statement.to_string(),
            param_formats: param_formats.to_vec(),
            values: values.to_vec(),
            result_formats: result_formats.to_vec(),
        }])
        .await
    }

    /// Send Describe
    pub async fn send_describe(&self, target: DescribeTarget, name: &str) -> Result<()> {
        self.send(&[FrontendMessage::Describe {
            target,
            name: name.to_string(),
        }])
        .await
    }

    /// Send Execute; `max_rows` 0 means no limit
    pub async fn send_execute(&self, portal: &str, max_rows: i32) -> Result<()> {
        self.send(&[FrontendMessage::Execute {
            portal: portal.to_string(),
            max_rows,
        }])
        .await
    }

    /// Send Close
    pub async fn send_close(&self, target: DescribeTarget, name: &str) -> Result<()> {
        self.send(&[FrontendMessage::Close {
            target,
            name: name.to_string(),
        }])
        .await
    }

    /// Send Flush
    pub async fn send_flush(&self) -> Result<()> {
        self.send(&[FrontendMessage::Flush]).await
    }

    /// Send Sync
    pub async fn send_sync(&self) -> Result<()> {
        self.send(&[FrontendMessage::Sync]).await
    }

    /// Write `messages` back to back in one write
    pub async fn send(&self, messages: &[FrontendMessage]) -> Result<()> {
        let buf = encode_all(messages)?;
        self.submit(buf, messages, None).await
    }

    /// Write `messages` and queue `decode` for their response, atomically
    ///
    /// The writer task queues `decode` only after the whole request is
    /// written, so the order of queued decode functions always matches the
    /// order of requests on the wire. Waits while the receive queue is full.
    ///
    /// If this future is dropped after the request was handed over, the
    /// request is still written and `decode` still runs; its result is
    /// discarded.
    pub async fn request<T, F>(&self, messages: &[FrontendMessage], decode: F) -> Result<Pending<T>>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Inbound) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let buf = encode_all(messages)?;
        let (job, pending) = bind(decode);
        self.submit(buf, messages, Some(job)).await?;
        Ok(pending)
    }

    /// Queue `decode` against the inbound stream without writing anything
    ///
    /// Use after the matching `send_*` calls. Ordering against other tasks'
    /// requests is the caller's concern.
    pub async fn receive<T, F>(&self, decode: F) -> Result<Pending<T>>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Inbound) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        self.request(&[], decode).await
    }

    /// Run a simple query; resolves to one result per statement
    ///
    /// A statement that fails is reported in its [`QueryResult::error`]; the
    /// request still runs until `ReadyForQuery`. Use [`collect`](Self::collect)
    /// to keep notices and the closing transaction status as well.
    pub async fn simple_query(&self, sql: &str) -> Result<Pending<Vec<QueryResult>>> {
        self.request(&[FrontendMessage::Query(sql.to_string())], collect_results)
            .await
    }

    /// Run an extended query (Parse/Bind/Describe/Execute/Sync)
    ///
    /// Parameter types from a statement Describe are only available through
    /// [`collect`](Self::collect).
    pub async fn extended_query(&self, query: &ExtendedQuery) -> Result<Pending<Vec<QueryResult>>> {
        self.request(&query.messages(), collect_results).await
    }

    /// Write `messages` and read until `ReadyForQuery` into a [`ResultCollector`]
    ///
    /// The collector keeps everything the cycle reported: results, notices,
    /// parameter types and the closing transaction status.
    pub async fn collect(&self, messages: &[FrontendMessage]) -> Result<Pending<ResultCollector>> {
        self.request(messages, run_collector).await
    }

    /// Snapshot of the connection properties
    pub fn properties(&self) -> ConnectionProperties {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A server parameter reported through `ParameterStatus`
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .parameter(name)
            .map(str::to_string)
    }

    /// Status from the most recent `ReadyForQuery` the reader has seen
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .transaction_status
    }

    /// Key for cancelling this session's running query
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .backend_key
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the reader, send Terminate and release the stream
    ///
    /// Receive requests that have not completed fail with
    /// [`Error::ReceiveCancelled`]; await them first to keep their results.
    /// Requests still waiting for queue space fail with
    /// [`Error::ConnectionClosed`] and are never written. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        async {
            // The reader goes first so a writer waiting for queue space is released
            let shutdown = self
                .shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(shutdown) = shutdown {
                let _ = shutdown.send(());
            }

            let (done, terminated) = oneshot::channel();
            let result = match self.outbound.send(Command::Close { done }) {
                Ok(()) => terminated.await.unwrap_or(Ok(())),
                // Writer already gone
                Err(_) => Ok(()),
            };

            let tasks = std::mem::take(
                &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for task in tasks {
                if let Err(err) = task.await {
                    tracing::warn!("session task ended abnormally: {}", err);
                }
            }

            tracing::debug!("session closed");
            result
        }
        .instrument(tracing::debug_span!("close"))
        .await
    }

    /// Hand an encoded request to the writer task and wait for it to be written
    ///
    /// Awaiting the reply is the only suspension point, so dropping this
    /// future never leaves a partial write behind.
    async fn submit(
        &self,
        buf: BytesMut,
        messages: &[FrontendMessage],
        job: Option<Job>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let (done, written) = oneshot::channel();
        self.outbound
            .send(Command::Write {
                buf,
                messages: messages.to_vec(),
                job,
                done,
            })
            .map_err(|_| Error::ConnectionClosed)?;
        written.await.map_err(|_| Error::ConnectionClosed)?
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("properties", &self.properties())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn encode_all(messages: &[FrontendMessage]) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    for msg in messages {
        encode_into(&mut buf, msg)?;
    }
    Ok(buf)
}

fn run_collector(inbound: &mut Inbound) -> BoxFuture<'_, Result<ResultCollector>> {
    Box::pin(async move {
        let mut collector = ResultCollector::new();
        inbound.receive_until_ready(&mut collector).await?;
        Ok::<_, Error>(collector)
    })
}

fn collect_results(inbound: &mut Inbound) -> BoxFuture<'_, Result<Vec<QueryResult>>> {
    Box::pin(async move { Ok::<_, Error>(run_collector(inbound).await?.finish()) })
}
