//! Single-reader side of a session
//!
//! Decode functions submitted through [`Session`](super::Session) run one at a
//! time, in submission order, on a dedicated task that owns the inbound half
//! of the stream. Each submission is paired with a one-shot slot that its
//! [`Pending`] future resolves from.

use super::properties::ConnectionProperties;
use crate::protocol::{decode_backend, BackendMessage, BackendTag, FrameReader, Payload};
use crate::sink::{report_received, EventSink, SharedSink};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};

pub(crate) type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;

/// A queued decode function, already bound to its result slot
pub(crate) type Job = Box<dyn for<'a> FnOnce(&'a mut Inbound) -> BoxFuture<'a, ()> + Send>;

/// Exclusive access to the inbound stream, handed to one decode function at a time
pub struct Inbound {
    frames: FrameReader<BoxedRead>,
    properties: Arc<RwLock<ConnectionProperties>>,
    sink: SharedSink,
    broken: bool,
}

impl Inbound {
    pub(crate) fn new(
        frames: FrameReader<BoxedRead>,
        properties: Arc<RwLock<ConnectionProperties>>,
        sink: SharedSink,
    ) -> Self {
        Self {
            frames,
            properties,
            sink,
            broken: false,
        }
    }

    /// Read and decode the next backend message
    ///
    /// The message is reported to the connection's sink and folded into the
    /// connection properties before it is returned. An `ErrorResponse` is
    /// returned as a message, not raised: the caller decides what it means.
    pub async fn receive_message(&mut self) -> Result<BackendMessage> {
        let (tag, msg) = self
            .read_packet(|tag, payload| Ok((tag, decode_backend(tag, payload)?)))
            .await?;
        crate::metrics::counters::packet_received(tag.name());

        if let BackendMessage::NoticeResponse(notice) = &msg {
            tracing::debug!(severity = %notice.severity, "notice: {}", notice.message);
        }
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(&msg);
        self.sink.received(&msg);
        Ok(msg)
    }

    /// Read messages until `ReadyForQuery`, reporting each one to `observer` too
    ///
    /// Returns the number of messages read.
    pub async fn receive_until_ready(&mut self, observer: &mut dyn EventSink) -> Result<usize> {
        let mut count = 0;
        loop {
            let msg = self.receive_message().await?;
            count += 1;
            report_received(observer, &msg);
            if msg.is_ready_for_query() {
                return Ok(count);
            }
        }
    }

    /// Read one raw packet and hand its payload to `body`
    ///
    /// Nothing is reported or recorded; `body` must consume the whole payload.
    pub async fn read_packet<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(BackendTag, &mut Payload) -> Result<T>,
    {
        if self.broken {
            return Err(Error::ConnectionClosed);
        }
        let result = self.frames.read_packet(false, body).await;
        if let Err(err) = &result {
            // Position in the stream is no longer trustworthy
            if !matches!(err, Error::Server(_)) {
                self.broken = true;
            }
        }
        result
    }

    /// Snapshot of the connection properties
    pub fn properties(&self) -> ConnectionProperties {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A read failed; no further decode function will run
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbound")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

/// Bind a decode function to a fresh result slot
pub(crate) fn bind<T, F>(decode: F) -> (Job, Pending<T>)
where
    T: Send + 'static,
    F: for<'a> FnOnce(&'a mut Inbound) -> BoxFuture<'a, Result<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = job(move |inbound| {
        Box::pin(async move {
            let result = decode(inbound).await;
            // The caller may have dropped its Pending; the result is discarded then
            let _ = tx.send(result);
        })
    });
    (job, Pending { rx })
}

fn job<F>(f: F) -> Job
where
    F: for<'a> FnOnce(&'a mut Inbound) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// The reader task
///
/// Runs queued jobs in order until the queue closes, the shutdown signal
/// fires (or its sender is dropped), or a read breaks the stream. Jobs still
/// queued at that point are dropped, which fails their [`Pending`] with
/// [`Error::ReceiveCancelled`].
pub(crate) async fn run_reader(
    mut inbound: Inbound,
    mut jobs: mpsc::Receiver<Job>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut cancelled: u64 = 0;

    loop {
        let job = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                // Dropping the running job fails its Pending
                cancelled += 1;
                break;
            }
            _ = job(&mut inbound) => {}
        }

        if inbound.is_broken() {
            tracing::warn!("inbound stream unusable, reader stopping");
            break;
        }
    }

    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        drop(job);
        cancelled += 1;
    }
    if cancelled > 0 {
        tracing::debug!(cancelled, "failed queued receive requests");
        crate::metrics::counters::receive_cancelled(cancelled);
    }
}

/// Result of a queued decode function
///
/// Resolves once the reader has run the function. If the session closes or
/// the stream breaks before that, resolves to [`Error::ReceiveCancelled`].
#[derive(Debug)]
#[must_use = "dropping a Pending discards the response it was queued for"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ReceiveCancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransactionStatus;
    use crate::sink::{Recorder, ResultCollector};

    fn inbound_from(bytes: &'static [u8], recorder: &Recorder) -> Inbound {
        let reader: BoxedRead = Box::new(bytes);
        Inbound::new(
            FrameReader::new(reader),
            Arc::new(RwLock::new(ConnectionProperties::default())),
            SharedSink::new(Some(Box::new(recorder.clone()))),
        )
    }

    const SELECT_ZERO: &[u8] = &[
        b'T', 0, 0, 0, 33, 0, 1, b'?', b'c', b'o', b'l', b'u', b'm', b'n', b'?', 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 23, 0, 4, 0xff, 0xff, 0xff, 0xff, 0, 0, // RowDescription
        b'D', 0, 0, 0, 11, 0, 1, 0, 0, 0, 1, b'0', // DataRow
        b'C', 0, 0, 0, 13, b'S', b'E', b'L', b'E', b'C', b'T', b' ', b'1', 0, // CommandComplete
        b'Z', 0, 0, 0, 5, b'I', // ReadyForQuery
    ];

    #[tokio::test]
    async fn test_receive_until_ready() {
        let recorder = Recorder::new();
        let mut inbound = inbound_from(SELECT_ZERO, &recorder);
        let mut collector = ResultCollector::new();

        let count = inbound.receive_until_ready(&mut collector).await.unwrap();

        assert_eq!(count, 4);
        assert_eq!(
            inbound.properties().transaction_status,
            Some(TransactionStatus::Idle)
        );
        assert_eq!(
            recorder.lines(),
            vec![
                "<- ROW_DESCRIPTION: 1 column(s)",
                "<- ROW_DESCRIPTION [#0]: '?column?' : int4 {4 bytes, text}",
                "<- DATA_ROW: 1 cell(s)",
                "<- DATA_ROW [#0]: 30",
                "<- COMMAND_COMPLETE: SELECT 1",
                "<- READY_FOR_QUERY: IDLE",
            ]
        );
        let results = collector.finish();
        assert_eq!(results[0].tag.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_framing_error_breaks_inbound() {
        let recorder = Recorder::new();
        // ParseComplete with a stray payload byte
        let mut inbound = inbound_from(&[b'1', 0, 0, 0, 5, 0, b'Z', 0, 0, 0, 5, b'I'], &recorder);

        assert!(inbound.receive_message().await.unwrap_err().is_framing());
        assert!(inbound.is_broken());
        assert!(matches!(
            inbound.receive_message().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_job_cancels_pending() {
        let (job, pending) = bind(|inbound| Box::pin(async move { inbound.receive_message().await }));
        drop(job);
        assert!(matches!(pending.await, Err(Error::ReceiveCancelled)));
    }

    #[tokio::test]
    async fn test_reader_runs_jobs_in_order() {
        let recorder = Recorder::new();
        let inbound = inbound_from(&[b'1', 0, 0, 0, 4, b'2', 0, 0, 0, 4], &recorder);
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut pendings = Vec::new();
        for _ in 0..3 {
            let (job, pending) =
                bind(|inbound| Box::pin(async move { inbound.receive_message().await }));
            tx.send(job).await.unwrap();
            pendings.push(pending);
        }
        drop(tx);

        run_reader(inbound, rx, shutdown_rx).await;

        let mut results = Vec::new();
        for pending in pendings {
            results.push(pending.await);
        }
        assert_eq!(results[0].as_ref().unwrap(), &BackendMessage::ParseComplete);
        assert_eq!(results[1].as_ref().unwrap(), &BackendMessage::BindComplete);
        // Third read hits EOF
        assert!(matches!(results[2], Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_jobs() {
        let recorder = Recorder::new();
        let inbound = inbound_from(&[], &recorder);
        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let (job, pending) = bind(|inbound| Box::pin(async move { inbound.receive_message().await }));
        tx.send(job).await.unwrap();
        shutdown_tx.send(()).unwrap();

        run_reader(inbound, rx, shutdown_rx).await;
        assert!(matches!(pending.await, Err(Error::ReceiveCancelled)));
    }
}
